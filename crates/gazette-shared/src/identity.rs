//! Ed25519 author identity: key generation, base64 marshalling, and
//! article signing/verification over the canonical signable content.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

use crate::article::Article;
use crate::constants::{PUBKEY_SIZE, SECRET_KEY_SIZE, SIGNATURE_SIZE};
use crate::error::{DomainError, Result};

#[derive(Clone)]
pub struct Identity {
    signing_key: SigningKey,
}

impl Identity {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_secret_bytes(secret: &[u8; SECRET_KEY_SIZE]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(secret),
        }
    }

    /// Parse a base64-encoded 32-byte secret key.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = BASE64.decode(encoded).map_err(|_| DomainError::InvalidKey)?;
        let secret: [u8; SECRET_KEY_SIZE] =
            bytes.try_into().map_err(|_| DomainError::InvalidKey)?;
        Ok(Self::from_secret_bytes(&secret))
    }

    pub fn secret_bytes(&self) -> &[u8; SECRET_KEY_SIZE] {
        self.signing_key.as_bytes()
    }

    pub fn secret_base64(&self) -> String {
        BASE64.encode(self.signing_key.as_bytes())
    }

    pub fn public_key_bytes(&self) -> [u8; PUBKEY_SIZE] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn public_key_base64(&self) -> String {
        BASE64.encode(self.public_key_bytes())
    }

    /// Stable author identifier: the libp2p PeerId derived from the user's
    /// public key, so author identity is itself overlay-addressable.
    pub fn user_id(&self) -> String {
        let key = libp2p_identity::ed25519::PublicKey::try_from_bytes(&self.public_key_bytes())
            .expect("verifying key is always 32 valid bytes");
        libp2p_identity::PublicKey::from(key).to_peer_id().to_string()
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    pub fn sign_base64(&self, message: &[u8]) -> String {
        BASE64.encode(self.sign(message).to_bytes())
    }
}

/// Parse a base64-encoded Ed25519 public key.
pub fn public_key_from_base64(encoded: &str) -> Result<VerifyingKey> {
    let bytes = BASE64.decode(encoded).map_err(|_| DomainError::InvalidKey)?;
    let arr: [u8; PUBKEY_SIZE] = bytes.try_into().map_err(|_| DomainError::InvalidKey)?;
    VerifyingKey::from_bytes(&arr).map_err(|_| DomainError::InvalidKey)
}

/// Verify a base64 signature over `message` against a base64 public key.
pub fn verify_base64(pubkey: &str, message: &[u8], signature: &str) -> Result<()> {
    let key = public_key_from_base64(pubkey)?;
    let sig_bytes = BASE64
        .decode(signature)
        .map_err(|_| DomainError::InvalidSignature)?;
    let sig_arr: [u8; SIGNATURE_SIZE] = sig_bytes
        .try_into()
        .map_err(|_| DomainError::InvalidSignature)?;
    let sig = Signature::from_bytes(&sig_arr);
    key.verify(message, &sig)
        .map_err(|_| DomainError::InvalidSignature)
}

/// Sign an article in place: computes the canonical signable bytes and
/// attaches the base64 signature. Also stamps `author_pubkey`.
pub fn sign_article(article: &mut Article, identity: &Identity) -> Result<()> {
    article.author_pubkey = identity.public_key_base64();
    let bytes = article.signable_bytes()?;
    article.signature = identity.sign_base64(&bytes);
    Ok(())
}

/// Verify an article's author signature over its canonical content.
///
/// Fails with `InvalidKey` on a malformed `author_pubkey` and with
/// `InvalidSignature` on a mismatch.
pub fn verify_article(article: &Article) -> Result<()> {
    let bytes = article.signable_bytes()?;
    verify_base64(&article.author_pubkey, &bytes, &article.signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn signed_article(identity: &Identity) -> Article {
        let now = Utc::now();
        let mut article = Article {
            id: Uuid::new_v4(),
            cid: String::new(),
            title: "Signed".into(),
            body: "Body".into(),
            author: "alice".into(),
            author_pubkey: String::new(),
            origin: String::new(),
            signature: String::new(),
            timestamp: now,
            tags: vec![],
            category: "news".into(),
            version: 1,
            created_at: now,
            updated_at: now,
        };
        sign_article(&mut article, identity).unwrap();
        article
    }

    #[test]
    fn sign_verify_round_trip() {
        let id = Identity::generate();
        let article = signed_article(&id);
        assert!(verify_article(&article).is_ok());
    }

    #[test]
    fn tampered_body_fails_verification() {
        let id = Identity::generate();
        let mut article = signed_article(&id);
        article.body = "tampered".into();
        assert!(matches!(
            verify_article(&article),
            Err(DomainError::InvalidSignature)
        ));
    }

    #[test]
    fn wrong_key_fails_verification() {
        let id = Identity::generate();
        let other = Identity::generate();
        let mut article = signed_article(&id);
        article.author_pubkey = other.public_key_base64();
        assert!(matches!(
            verify_article(&article),
            Err(DomainError::InvalidSignature)
        ));
    }

    #[test]
    fn malformed_key_is_invalid_key() {
        let id = Identity::generate();
        let mut article = signed_article(&id);
        article.author_pubkey = "not-base64!!".into();
        assert!(matches!(
            verify_article(&article),
            Err(DomainError::InvalidKey)
        ));
    }

    #[test]
    fn secret_base64_round_trip() {
        let id = Identity::generate();
        let restored = Identity::from_base64(&id.secret_base64()).unwrap();
        assert_eq!(id.public_key_bytes(), restored.public_key_bytes());
        assert_eq!(id.user_id(), restored.user_id());
    }

    #[test]
    fn user_id_is_a_peer_id() {
        let id = Identity::generate();
        let user_id = id.user_id();
        assert!(user_id.parse::<libp2p_identity::PeerId>().is_ok());
    }
}
