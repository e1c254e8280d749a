//! Article domain model: the unit of publication.
//!
//! An article is authored once, signed by its author, content-addressed in
//! the blob store, and replicated to other nodes. Replicas never mutate an
//! article; an update is a new article with the same `id` and a higher
//! `version`, re-signed by the author.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{ALLOWED_CATEGORIES, MAX_TAGS, MAX_TAG_LEN, MAX_TITLE_LEN};
use crate::error::{DomainError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Article {
    pub id: Uuid,
    /// Content identifier of the canonical blob (empty until stored).
    #[serde(default)]
    pub cid: String,
    pub title: String,
    pub body: String,
    pub author: String,
    /// Base64 Ed25519 public key of the author, used for verification.
    pub author_pubkey: String,
    /// Opaque identifier of the producing node; diagnostics only.
    #[serde(default)]
    pub origin: String,
    /// Base64 Ed25519 signature over the canonical signable content.
    #[serde(default)]
    pub signature: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Canonical content covered by the author signature.
///
/// Field set and order are fixed; any change breaks every existing
/// signature on the network.
#[derive(Debug, Serialize)]
struct SignableContent<'a> {
    title: &'a str,
    body: &'a str,
    author: &'a str,
    timestamp: &'a DateTime<Utc>,
    tags: &'a [String],
    category: &'a str,
}

impl Article {
    /// Deterministic byte serialization used for signing and verification.
    pub fn signable_bytes(&self) -> Result<Vec<u8>> {
        let content = SignableContent {
            title: &self.title,
            body: &self.body,
            author: &self.author,
            timestamp: &self.timestamp,
            tags: &self.tags,
            category: &self.category,
        };
        Ok(serde_json::to_vec(&content)?)
    }

    /// Validate user-supplied fields (title, body, author, tags, category).
    pub fn validate(&self) -> Result<()> {
        if self.title.is_empty() {
            return Err(DomainError::invalid_article("title", "title is required"));
        }
        if self.title.chars().count() > MAX_TITLE_LEN {
            return Err(DomainError::invalid_article(
                "title",
                format!("title must be at most {MAX_TITLE_LEN} characters"),
            ));
        }
        if self.body.is_empty() {
            return Err(DomainError::invalid_article("body", "body is required"));
        }
        if self.author.is_empty() {
            return Err(DomainError::invalid_article("author", "author is required"));
        }
        if self.tags.len() > MAX_TAGS {
            return Err(DomainError::invalid_article(
                "tags",
                format!("maximum {MAX_TAGS} tags allowed"),
            ));
        }
        for tag in &self.tags {
            if tag.is_empty() {
                return Err(DomainError::invalid_article("tags", "empty tags are not allowed"));
            }
            if tag.chars().count() > MAX_TAG_LEN {
                return Err(DomainError::invalid_article(
                    "tags",
                    format!("each tag must be at most {MAX_TAG_LEN} characters"),
                ));
            }
        }
        if !self.category.is_empty() && !ALLOWED_CATEGORIES.contains(&self.category.as_str()) {
            return Err(DomainError::invalid_article("category", "invalid category"));
        }
        Ok(())
    }

    /// Tie-break for replicas holding the same `id`: the article with the
    /// later version wins; ties go to the later timestamp, then the
    /// lexicographically larger CID.
    pub fn beats(&self, other: &Article) -> bool {
        if self.version != other.version {
            return self.version > other.version;
        }
        if self.timestamp != other.timestamp {
            return self.timestamp > other.timestamp;
        }
        self.cid > other.cid
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(data: &[u8]) -> Result<Article> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArticleCreateRequest {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArticleUpdateRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub category: Option<String>,
}

/// Filter for listing articles.
#[derive(Debug, Clone, Default)]
pub struct ArticleListFilter {
    pub author: Option<String>,
    pub category: Option<String>,
    pub tag: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: u32,
    pub limit: u32,
}

impl ArticleListFilter {
    /// Clamp paging to sane defaults (page >= 1, 1 <= limit <= 100).
    pub fn normalized(mut self) -> Self {
        if self.page < 1 {
            self.page = 1;
        }
        if self.limit < 1 {
            self.limit = 20;
        }
        if self.limit > 100 {
            self.limit = 100;
        }
        self
    }

    pub fn offset(&self) -> u32 {
        (self.page - 1) * self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Article {
        let now = Utc::now();
        Article {
            id: Uuid::new_v4(),
            cid: String::new(),
            title: "Hello".into(),
            body: "Hi".into(),
            author: "alice".into(),
            author_pubkey: String::new(),
            origin: String::new(),
            signature: String::new(),
            timestamp: now,
            tags: vec!["p2p".into()],
            category: "technology".into(),
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn valid_article_passes() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn empty_body_rejected() {
        let mut a = sample();
        a.body = String::new();
        assert!(a.validate().is_err());
    }

    #[test]
    fn long_title_rejected() {
        let mut a = sample();
        a.title = "x".repeat(MAX_TITLE_LEN + 1);
        assert!(a.validate().is_err());
    }

    #[test]
    fn too_many_tags_rejected() {
        let mut a = sample();
        a.tags = (0..MAX_TAGS + 1).map(|i| format!("t{i}")).collect();
        assert!(a.validate().is_err());
    }

    #[test]
    fn long_tag_rejected() {
        let mut a = sample();
        a.tags = vec!["y".repeat(MAX_TAG_LEN + 1)];
        assert!(a.validate().is_err());
    }

    #[test]
    fn empty_tag_rejected() {
        let mut a = sample();
        a.tags = vec![String::new()];
        assert!(a.validate().is_err());
    }

    #[test]
    fn unknown_category_rejected() {
        let mut a = sample();
        a.category = "astrology".into();
        assert!(a.validate().is_err());
    }

    #[test]
    fn empty_category_allowed() {
        let mut a = sample();
        a.category = String::new();
        assert!(a.validate().is_ok());
    }

    #[test]
    fn signable_bytes_fixed_field_order() {
        let a = sample();
        let bytes = a.signable_bytes().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let title_pos = text.find("\"title\"").unwrap();
        let body_pos = text.find("\"body\"").unwrap();
        let author_pos = text.find("\"author\"").unwrap();
        let ts_pos = text.find("\"timestamp\"").unwrap();
        let tags_pos = text.find("\"tags\"").unwrap();
        let cat_pos = text.find("\"category\"").unwrap();
        assert!(title_pos < body_pos);
        assert!(body_pos < author_pos);
        assert!(author_pos < ts_pos);
        assert!(ts_pos < tags_pos);
        assert!(tags_pos < cat_pos);
    }

    #[test]
    fn version_wins_tie_break() {
        let mut a = sample();
        let mut b = a.clone();
        b.version = 2;
        assert!(b.beats(&a));
        assert!(!a.beats(&b));

        // Same version: later timestamp wins.
        b.version = a.version;
        b.timestamp = a.timestamp + chrono::Duration::seconds(5);
        assert!(b.beats(&a));

        // Same version and timestamp: larger CID wins.
        b.timestamp = a.timestamp;
        a.cid = "b3aaaa".into();
        b.cid = "b3bbbb".into();
        assert!(b.beats(&a));
    }

    #[test]
    fn json_round_trip() {
        let a = sample();
        let bytes = a.to_json().unwrap();
        let back = Article::from_json(&bytes).unwrap();
        assert_eq!(a, back);
    }
}
