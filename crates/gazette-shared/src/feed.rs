//! Feeds: named mutable pointers resolving to a signed manifest of recent
//! article CIDs, republished by a background task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::MAX_FEED_NAME_LEN;
use crate::error::{DomainError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Feed {
    pub id: Uuid,
    /// Unique feed name, e.g. "global" or "tech".
    pub name: String,
    /// Mutable-pointer key name in the blob store.
    pub pointer_key: String,
    /// Latest published pointer address.
    #[serde(default)]
    pub pointer_address: String,
    /// CID of the last published manifest.
    #[serde(default)]
    pub last_cid: String,
    pub last_sync: Option<DateTime<Utc>>,
    /// Minutes between manifest republications (>= 1).
    pub sync_interval_minutes: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Feed {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.chars().count() > MAX_FEED_NAME_LEN {
            return Err(DomainError::InvalidFeed(format!(
                "name must be 1..={MAX_FEED_NAME_LEN} characters"
            )));
        }
        if self.sync_interval_minutes < 1 {
            return Err(DomainError::InvalidFeed(
                "sync interval must be at least one minute".into(),
            ));
        }
        Ok(())
    }

    /// Whether the feed is due for a manifest republication at `now`.
    pub fn due_for_sync(&self, now: DateTime<Utc>) -> bool {
        match self.last_sync {
            None => true,
            Some(last) => now - last >= chrono::Duration::minutes(self.sync_interval_minutes),
        }
    }
}

/// The manifest published to the blob store and addressed by the feed's
/// mutable pointer. Stored by CID itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedManifest {
    pub version: String,
    /// Article CIDs, descending timestamp.
    pub articles: Vec<String>,
    pub last_updated: DateTime<Utc>,
    pub total_count: usize,
    /// Base64 Ed25519 node signature over the manifest with this field empty.
    #[serde(default)]
    pub signature: String,
}

impl FeedManifest {
    /// Canonical bytes covered by the manifest signature: the manifest
    /// serialized with an empty signature field.
    pub fn signable_bytes(&self) -> Result<Vec<u8>> {
        let unsigned = FeedManifest {
            signature: String::new(),
            ..self.clone()
        };
        Ok(serde_json::to_vec(&unsigned)?)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedCreateRequest {
    pub name: String,
    pub sync_interval_minutes: i64,
}
