//! Encrypted-at-rest storage for user private keys.
//!
//! Layout of the stored form, base64-encoded:
//!
//! ```text
//! version (1) || salt (16) || nonce (12) || AES-256-GCM ciphertext+tag
//! ```
//!
//! The encryption key is derived with PBKDF2-HMAC-SHA256 (100k iterations)
//! from caller-supplied secret material. A leading byte other than the v1
//! marker is rejected before any decryption is attempted, which locks out
//! the legacy unencrypted key format.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use sha2::Sha256;

use crate::constants::{
    KEYSTORE_FORMAT_V1, KEYSTORE_KEY_SIZE, KEYSTORE_NONCE_SIZE, KEYSTORE_PBKDF2_ITERATIONS,
    KEYSTORE_SALT_SIZE, SECRET_KEY_SIZE,
};
use crate::error::{DomainError, Result};

fn derive_key(secret: &[u8], salt: &[u8]) -> [u8; KEYSTORE_KEY_SIZE] {
    let mut key = [0u8; KEYSTORE_KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(secret, salt, KEYSTORE_PBKDF2_ITERATIONS, &mut key);
    key
}

/// Encrypt a 32-byte Ed25519 secret key with a password (or any other
/// secret material, e.g. the stored password-hash bytes).
pub fn encrypt_private_key(private_key: &[u8; SECRET_KEY_SIZE], secret: &[u8]) -> Result<String> {
    let mut salt = [0u8; KEYSTORE_SALT_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    let mut nonce_bytes = [0u8; KEYSTORE_NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let key = derive_key(secret, &salt);
    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| DomainError::InvalidKey)?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), private_key.as_slice())
        .map_err(|_| DomainError::InvalidKey)?;

    let mut combined =
        Vec::with_capacity(1 + KEYSTORE_SALT_SIZE + KEYSTORE_NONCE_SIZE + ciphertext.len());
    combined.push(KEYSTORE_FORMAT_V1);
    combined.extend_from_slice(&salt);
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&ciphertext);

    Ok(BASE64.encode(combined))
}

/// Decrypt a private key produced by [`encrypt_private_key`].
///
/// Fails with `UnsupportedKeyFormat` on an unknown version byte and with
/// `BadPassword` when the GCM authentication tag does not verify.
pub fn decrypt_private_key(encrypted: &str, secret: &[u8]) -> Result<[u8; SECRET_KEY_SIZE]> {
    let combined = BASE64
        .decode(encrypted)
        .map_err(|_| DomainError::UnsupportedKeyFormat)?;

    // tag is 16 bytes
    let min_len = 1 + KEYSTORE_SALT_SIZE + KEYSTORE_NONCE_SIZE + SECRET_KEY_SIZE + 16;
    if combined.len() < min_len {
        return Err(DomainError::UnsupportedKeyFormat);
    }
    if combined[0] != KEYSTORE_FORMAT_V1 {
        return Err(DomainError::UnsupportedKeyFormat);
    }

    let salt = &combined[1..1 + KEYSTORE_SALT_SIZE];
    let nonce_start = 1 + KEYSTORE_SALT_SIZE;
    let ct_start = nonce_start + KEYSTORE_NONCE_SIZE;
    let nonce = &combined[nonce_start..ct_start];
    let ciphertext = &combined[ct_start..];

    let key = derive_key(secret, salt);
    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| DomainError::InvalidKey)?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| DomainError::BadPassword)?;

    plaintext
        .try_into()
        .map_err(|_| DomainError::UnsupportedKeyFormat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_with_correct_password() {
        let key = [7u8; SECRET_KEY_SIZE];
        let encrypted = encrypt_private_key(&key, b"hunter2").unwrap();
        let decrypted = decrypt_private_key(&encrypted, b"hunter2").unwrap();
        assert_eq!(key, decrypted);
    }

    #[test]
    fn wrong_password_is_bad_password() {
        let key = [7u8; SECRET_KEY_SIZE];
        let encrypted = encrypt_private_key(&key, b"hunter2").unwrap();
        assert!(matches!(
            decrypt_private_key(&encrypted, b"letmein"),
            Err(DomainError::BadPassword)
        ));
    }

    #[test]
    fn unknown_version_byte_rejected() {
        let key = [7u8; SECRET_KEY_SIZE];
        let encrypted = encrypt_private_key(&key, b"hunter2").unwrap();
        let mut raw = BASE64.decode(&encrypted).unwrap();
        raw[0] = 0x00;
        let forged = BASE64.encode(raw);
        assert!(matches!(
            decrypt_private_key(&forged, b"hunter2"),
            Err(DomainError::UnsupportedKeyFormat)
        ));
    }

    #[test]
    fn plaintext_base64_key_rejected() {
        // A bare base64 key (the legacy placeholder format) is too short to
        // carry the v1 envelope and must not be accepted.
        let legacy = BASE64.encode([7u8; SECRET_KEY_SIZE]);
        assert!(matches!(
            decrypt_private_key(&legacy, b"hunter2"),
            Err(DomainError::UnsupportedKeyFormat)
        ));
    }

    #[test]
    fn distinct_salts_per_encryption() {
        let key = [7u8; SECRET_KEY_SIZE];
        let a = encrypt_private_key(&key, b"pw").unwrap();
        let b = encrypt_private_key(&key, b"pw").unwrap();
        assert_ne!(a, b);
    }
}
