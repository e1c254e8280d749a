use std::sync::Arc;

use chrono::{DateTime, Utc};
use sled::transaction::ConflictableTransactionResult;
use sled::Transactional;
use uuid::Uuid;

use gazette_shared::Feed;

use crate::error::{Result, StoreError};
use crate::kv::KvDatabase;
use crate::repo::FeedRepository;

pub struct KvFeedRepo {
    feeds: sled::Tree,
    by_name: sled::Tree,
}

impl KvFeedRepo {
    pub fn new(db: Arc<KvDatabase>) -> Result<Self> {
        Ok(Self {
            feeds: db.tree("feeds")?,
            by_name: db.tree("feeds_name")?,
        })
    }

    fn load(&self, id_key: &[u8]) -> Result<Feed> {
        let raw = self.feeds.get(id_key)?.ok_or(StoreError::NotFound)?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

impl FeedRepository for KvFeedRepo {
    fn create(&self, feed: &Feed) -> Result<()> {
        if self.by_name.contains_key(feed.name.as_bytes())? {
            return Err(StoreError::Conflict("feed"));
        }
        let id_key = feed.id.to_string().into_bytes();
        let data = serde_json::to_vec(feed)?;

        (&self.feeds, &self.by_name)
            .transaction(|(feeds, by_name)| -> ConflictableTransactionResult<(), ()> {
                feeds.insert(id_key.as_slice(), data.as_slice())?;
                by_name.insert(feed.name.as_bytes(), id_key.as_slice())?;
                Ok(())
            })
            .map_err(map_txn_err)?;
        Ok(())
    }

    fn get_by_name(&self, name: &str) -> Result<Feed> {
        let id_key = self
            .by_name
            .get(name.as_bytes())?
            .ok_or(StoreError::NotFound)?;
        self.load(&id_key)
    }

    fn list(&self) -> Result<Vec<Feed>> {
        let mut feeds = Vec::new();
        for entry in self.feeds.iter() {
            let (_, raw) = entry?;
            feeds.push(serde_json::from_slice(&raw)?);
        }
        feeds.sort_by(|a: &Feed, b: &Feed| a.name.cmp(&b.name));
        Ok(feeds)
    }

    fn update(&self, feed: &Feed) -> Result<()> {
        let id_key = feed.id.to_string().into_bytes();
        if !self.feeds.contains_key(&id_key)? {
            return Err(StoreError::NotFound);
        }
        let data = serde_json::to_vec(feed)?;
        self.feeds.insert(id_key, data)?;
        Ok(())
    }

    fn delete(&self, id: Uuid) -> Result<bool> {
        let id_key = id.to_string().into_bytes();
        let feed = match self.feeds.get(&id_key)? {
            Some(raw) => serde_json::from_slice::<Feed>(&raw)?,
            None => return Ok(false),
        };

        (&self.feeds, &self.by_name)
            .transaction(|(feeds, by_name)| -> ConflictableTransactionResult<(), ()> {
                feeds.remove(id_key.as_slice())?;
                by_name.remove(feed.name.as_bytes())?;
                Ok(())
            })
            .map_err(map_txn_err)?;
        Ok(true)
    }

    fn list_due_for_sync(&self, now: DateTime<Utc>) -> Result<Vec<Feed>> {
        Ok(self.list()?.into_iter().filter(|f| f.due_for_sync(now)).collect())
    }
}

fn map_txn_err(err: sled::transaction::TransactionError<()>) -> StoreError {
    match err {
        sled::transaction::TransactionError::Storage(e) => StoreError::Sled(e),
        sled::transaction::TransactionError::Abort(()) => StoreError::Conflict("feed"),
    }
}
