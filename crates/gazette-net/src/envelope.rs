//! Gossip message envelopes.
//!
//! Every envelope carries the publisher's PeerId and an Ed25519 signature
//! over the canonical JSON of `{type, payload, timestamp, peer_id}`, in
//! addition to the article-internal author signature. Receivers verify the
//! envelope before any handler runs; the signing key is recovered from the
//! (inline) PeerId itself, so no key exchange is needed.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use libp2p::identity::{Keypair, PublicKey};
use libp2p::PeerId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use gazette_shared::{Article, Feed};

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("envelope signature verification failed")]
    BadSignature,

    #[error("unknown or non-inline peer id")]
    UnknownPeer,

    #[error("signing failed")]
    SigningFailed,

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    New,
    Update,
    Delete,
}

/// Article announcement riding `gazette/articles/v1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleEnvelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub article: Option<Article>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub article_id: Option<Uuid>,
    /// Unix seconds.
    pub timestamp: i64,
    pub peer_id: String,
    pub signature: String,
}

#[derive(Serialize)]
struct SignableArticleEnvelope<'a> {
    #[serde(rename = "type")]
    kind: EnvelopeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    article: Option<&'a Article>,
    #[serde(skip_serializing_if = "Option::is_none")]
    article_id: Option<Uuid>,
    timestamp: i64,
    peer_id: &'a str,
}

impl ArticleEnvelope {
    pub fn new_article(article: Article) -> Self {
        let id = article.id;
        Self::unsigned(EnvelopeKind::New, Some(article), Some(id))
    }

    pub fn updated_article(article: Article) -> Self {
        let id = article.id;
        Self::unsigned(EnvelopeKind::Update, Some(article), Some(id))
    }

    pub fn deleted_article(article_id: Uuid) -> Self {
        Self::unsigned(EnvelopeKind::Delete, None, Some(article_id))
    }

    fn unsigned(kind: EnvelopeKind, article: Option<Article>, article_id: Option<Uuid>) -> Self {
        Self {
            kind,
            article,
            article_id,
            timestamp: Utc::now().timestamp(),
            peer_id: String::new(),
            signature: String::new(),
        }
    }

    fn signable_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        Ok(serde_json::to_vec(&SignableArticleEnvelope {
            kind: self.kind,
            article: self.article.as_ref(),
            article_id: self.article_id,
            timestamp: self.timestamp,
            peer_id: &self.peer_id,
        })?)
    }

    /// Stamp `peer_id` and sign the envelope with the node keypair.
    pub fn sign(&mut self, keypair: &Keypair) -> Result<(), EnvelopeError> {
        self.peer_id = keypair.public().to_peer_id().to_string();
        let bytes = self.signable_bytes()?;
        let sig = keypair.sign(&bytes).map_err(|_| EnvelopeError::SigningFailed)?;
        self.signature = BASE64.encode(sig);
        Ok(())
    }

    /// Verify the envelope signature against the publisher's PeerId.
    pub fn verify(&self) -> Result<(), EnvelopeError> {
        let peer_id: PeerId = self
            .peer_id
            .parse()
            .map_err(|_| EnvelopeError::UnknownPeer)?;
        let key = peer_public_key(&peer_id).ok_or(EnvelopeError::UnknownPeer)?;
        let sig = BASE64
            .decode(&self.signature)
            .map_err(|_| EnvelopeError::BadSignature)?;
        let bytes = self.signable_bytes()?;
        if key.verify(&bytes, &sig) {
            Ok(())
        } else {
            Err(EnvelopeError::BadSignature)
        }
    }
}

/// Feed announcement riding `gazette/feeds/v1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedEnvelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    pub feed: Feed,
    pub timestamp: i64,
    pub peer_id: String,
    pub signature: String,
}

#[derive(Serialize)]
struct SignableFeedEnvelope<'a> {
    #[serde(rename = "type")]
    kind: EnvelopeKind,
    feed: &'a Feed,
    timestamp: i64,
    peer_id: &'a str,
}

impl FeedEnvelope {
    pub fn new(kind: EnvelopeKind, feed: Feed) -> Self {
        Self {
            kind,
            feed,
            timestamp: Utc::now().timestamp(),
            peer_id: String::new(),
            signature: String::new(),
        }
    }

    fn signable_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        Ok(serde_json::to_vec(&SignableFeedEnvelope {
            kind: self.kind,
            feed: &self.feed,
            timestamp: self.timestamp,
            peer_id: &self.peer_id,
        })?)
    }

    pub fn sign(&mut self, keypair: &Keypair) -> Result<(), EnvelopeError> {
        self.peer_id = keypair.public().to_peer_id().to_string();
        let bytes = self.signable_bytes()?;
        let sig = keypair.sign(&bytes).map_err(|_| EnvelopeError::SigningFailed)?;
        self.signature = BASE64.encode(sig);
        Ok(())
    }

    pub fn verify(&self) -> Result<(), EnvelopeError> {
        let peer_id: PeerId = self
            .peer_id
            .parse()
            .map_err(|_| EnvelopeError::UnknownPeer)?;
        let key = peer_public_key(&peer_id).ok_or(EnvelopeError::UnknownPeer)?;
        let sig = BASE64
            .decode(&self.signature)
            .map_err(|_| EnvelopeError::BadSignature)?;
        let bytes = self.signable_bytes()?;
        if key.verify(&bytes, &sig) {
            Ok(())
        } else {
            Err(EnvelopeError::BadSignature)
        }
    }
}

/// Content vote riding `gazette/votes/v1`. The envelope format is fixed;
/// no core component consumes votes yet (reserved topic).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteMessage {
    pub article_id: Uuid,
    pub voter: String,
    /// +1 or -1.
    pub vote: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    pub timestamp: i64,
    pub signature: String,
}

/// Moderation action riding `gazette/moderation/v1`. Reserved, like votes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationMessage {
    pub article_id: Uuid,
    /// "report", "flag" or "vote_remove".
    pub action: String,
    pub reason: String,
    pub reporter: String,
    pub timestamp: i64,
    pub signature: String,
}

/// Recover the Ed25519 public key embedded in an inline PeerId.
///
/// Ed25519 peer ids use the identity multihash over the protobuf-encoded
/// public key, so the key can be read straight back out of the id.
pub fn peer_public_key(peer_id: &PeerId) -> Option<PublicKey> {
    let multihash = multihash::Multihash::<64>::from_bytes(&peer_id.to_bytes()).ok()?;
    if multihash.code() != 0x00 {
        return None;
    }
    PublicKey::try_decode_protobuf(multihash.digest()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn article() -> Article {
        let now = Utc::now();
        Article {
            id: Uuid::new_v4(),
            cid: "b3abc".into(),
            title: "Title".into(),
            body: "Body".into(),
            author: "alice".into(),
            author_pubkey: "pk".into(),
            origin: "node".into(),
            signature: "sig".into(),
            timestamp: now,
            tags: vec![],
            category: "news".into(),
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn sign_verify_round_trip() {
        let keypair = Keypair::generate_ed25519();
        let mut envelope = ArticleEnvelope::new_article(article());
        envelope.sign(&keypair).unwrap();
        assert!(envelope.verify().is_ok());
        assert_eq!(envelope.peer_id, keypair.public().to_peer_id().to_string());
    }

    #[test]
    fn tampered_envelope_rejected() {
        let keypair = Keypair::generate_ed25519();
        let mut envelope = ArticleEnvelope::new_article(article());
        envelope.sign(&keypair).unwrap();
        envelope.timestamp += 1;
        assert!(matches!(envelope.verify(), Err(EnvelopeError::BadSignature)));
    }

    #[test]
    fn foreign_peer_id_rejected() {
        let keypair = Keypair::generate_ed25519();
        let other = Keypair::generate_ed25519();
        let mut envelope = ArticleEnvelope::new_article(article());
        envelope.sign(&keypair).unwrap();
        envelope.peer_id = other.public().to_peer_id().to_string();
        assert!(envelope.verify().is_err());
    }

    #[test]
    fn delete_envelope_carries_only_id() {
        let keypair = Keypair::generate_ed25519();
        let id = Uuid::new_v4();
        let mut envelope = ArticleEnvelope::deleted_article(id);
        envelope.sign(&keypair).unwrap();

        let json = serde_json::to_string(&envelope).unwrap();
        assert!(!json.contains("\"article\":"));
        assert!(json.contains("\"article_id\""));
        assert!(json.contains("\"type\":\"delete\""));

        let back: ArticleEnvelope = serde_json::from_str(&json).unwrap();
        assert!(back.verify().is_ok());
        assert_eq!(back.article_id, Some(id));
    }

    #[test]
    fn feed_envelope_round_trip() {
        let keypair = Keypair::generate_ed25519();
        let now = Utc::now();
        let feed = Feed {
            id: Uuid::new_v4(),
            name: "global".into(),
            pointer_key: "feed-global".into(),
            pointer_address: "/ptr/feed-global".into(),
            last_cid: "b3manifest".into(),
            last_sync: Some(now),
            sync_interval_minutes: 5,
            created_at: now,
            updated_at: now,
        };
        let mut envelope = FeedEnvelope::new(EnvelopeKind::Update, feed);
        envelope.sign(&keypair).unwrap();
        let json = serde_json::to_vec(&envelope).unwrap();
        let back: FeedEnvelope = serde_json::from_slice(&json).unwrap();
        assert!(back.verify().is_ok());
    }

    #[test]
    fn public_key_recoverable_from_ed25519_peer_id() {
        let keypair = Keypair::generate_ed25519();
        let peer_id = keypair.public().to_peer_id();
        let key = peer_public_key(&peer_id).expect("inline key");
        assert_eq!(key.to_peer_id(), peer_id);
    }
}
