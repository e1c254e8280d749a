//! Repository capability traits and the backend factory.
//!
//! Exactly the operations the article pipeline needs, behind small traits
//! so the two backends (journaled SQLite, sled with secondary indexes) are
//! interchangeable at startup via a `mode` config value.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use gazette_shared::{Article, ArticleListFilter, Feed, User};

use crate::database::Database;
use crate::error::{Result, StoreError};

pub trait ArticleRepository: Send + Sync {
    /// Insert or overwrite by `id`. Idempotent: replaying the same article
    /// leaves the store unchanged.
    fn upsert(&self, article: &Article) -> Result<()>;
    fn get_by_id(&self, id: Uuid) -> Result<Article>;
    fn get_by_cid(&self, cid: &str) -> Result<Article>;
    fn exists(&self, id: Uuid) -> Result<bool>;
    /// Returns true when a row was actually removed.
    fn delete(&self, id: Uuid) -> Result<bool>;
    /// Filtered, paginated listing; newest first. Returns (page, total).
    fn list(&self, filter: &ArticleListFilter) -> Result<(Vec<Article>, u64)>;
    /// Most recent articles, descending timestamp.
    fn list_recent(&self, limit: usize) -> Result<Vec<Article>>;
    /// Articles strictly newer than `since`, descending timestamp.
    fn list_recent_since(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<Article>>;
    fn list_by_author(&self, author: &str, page: u32, limit: u32) -> Result<(Vec<Article>, u64)>;
}

pub trait UserRepository: Send + Sync {
    /// Fails with `Conflict` on a duplicate username or id.
    fn create(&self, user: &User) -> Result<()>;
    fn get_by_id(&self, id: &str) -> Result<User>;
    fn get_by_username(&self, username: &str) -> Result<User>;
}

pub trait FeedRepository: Send + Sync {
    /// Fails with `Conflict` on a duplicate name.
    fn create(&self, feed: &Feed) -> Result<()>;
    fn get_by_name(&self, name: &str) -> Result<Feed>;
    fn list(&self) -> Result<Vec<Feed>>;
    fn update(&self, feed: &Feed) -> Result<()>;
    fn delete(&self, id: Uuid) -> Result<bool>;
    /// Feeds whose sync interval has elapsed at `now`.
    fn list_due_for_sync(&self, now: DateTime<Utc>) -> Result<Vec<Feed>>;
}

/// Which persistence backend to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// Single-file relational store with a WAL journal.
    Sqlite,
    /// Embedded key-value store with secondary indexes.
    Kv,
}

impl std::str::FromStr for StoreMode {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sqlite" => Ok(StoreMode::Sqlite),
            "kv" => Ok(StoreMode::Kv),
            other => Err(StoreError::UnknownMode(other.to_string())),
        }
    }
}

/// The opened repository set, backend-agnostic.
#[derive(Clone)]
pub struct Stores {
    pub articles: Arc<dyn ArticleRepository>,
    pub users: Arc<dyn UserRepository>,
    pub feeds: Arc<dyn FeedRepository>,
}

/// Open all repositories on the chosen backend under `data_dir`.
pub fn open_stores(mode: StoreMode, data_dir: &Path) -> Result<Stores> {
    match mode {
        StoreMode::Sqlite => {
            let db = Arc::new(Database::open_at(&data_dir.join("gazette.db"))?);
            Ok(Stores {
                articles: Arc::new(crate::sqlite::SqliteArticleRepo::new(db.clone())),
                users: Arc::new(crate::sqlite::SqliteUserRepo::new(db.clone())),
                feeds: Arc::new(crate::sqlite::SqliteFeedRepo::new(db)),
            })
        }
        StoreMode::Kv => {
            let db = Arc::new(crate::kv::KvDatabase::open(&data_dir.join("gazette.kv"))?);
            Ok(Stores {
                articles: Arc::new(crate::kv::KvArticleRepo::new(db.clone())?),
                users: Arc::new(crate::kv::KvUserRepo::new(db.clone())?),
                feeds: Arc::new(crate::kv::KvFeedRepo::new(db)?),
            })
        }
    }
}
