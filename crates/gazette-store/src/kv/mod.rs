//! Embedded key-value repositories (sled) with secondary indexes.
//!
//! Every article write touches the primary tree and three index trees
//! inside a single sled transaction, so indexes can never drift from the
//! data.

mod articles;
mod feeds;
mod users;

pub use articles::KvArticleRepo;
pub use feeds::KvFeedRepo;
pub use users::KvUserRepo;

use std::path::Path;

use crate::error::Result;

pub struct KvDatabase {
    db: sled::Db,
}

impl KvDatabase {
    pub fn open(path: &Path) -> Result<Self> {
        let db = sled::open(path)?;
        tracing::info!(path = %path.display(), "opened kv store");
        Ok(Self { db })
    }

    pub fn tree(&self, name: &str) -> Result<sled::Tree> {
        Ok(self.db.open_tree(name)?)
    }
}

/// Big-endian nanosecond timestamp, used as the sortable index prefix.
pub(crate) fn ts_key(ts: chrono::DateTime<chrono::Utc>) -> [u8; 8] {
    (ts.timestamp_nanos_opt().unwrap_or(i64::MAX) as u64).to_be_bytes()
}
