//! Feed publishing: a background task that periodically snapshots the most
//! recent articles into a signed manifest, uploads it, and repoints the
//! feed's mutable pointer at the new CID.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use libp2p::identity::Keypair;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use gazette_shared::constants::{FEED_MANIFEST_MAX_ARTICLES, FEED_MANIFEST_VERSION};
use gazette_shared::{DomainError, Feed, FeedCreateRequest, FeedManifest};
use gazette_store::{ArticleRepository, BlobStore, FeedRepository};

use crate::error::Result;
use crate::gossip::Broadcaster;

pub struct FeedService {
    feeds: Arc<dyn FeedRepository>,
    articles: Arc<dyn ArticleRepository>,
    blobs: BlobStore,
    keypair: Keypair,
    broadcaster: Option<Broadcaster>,
}

impl FeedService {
    pub fn new(
        feeds: Arc<dyn FeedRepository>,
        articles: Arc<dyn ArticleRepository>,
        blobs: BlobStore,
        keypair: Keypair,
        broadcaster: Option<Broadcaster>,
    ) -> Self {
        Self {
            feeds,
            articles,
            blobs,
            keypair,
            broadcaster,
        }
    }

    pub fn create(&self, req: &FeedCreateRequest) -> Result<Feed> {
        let now = Utc::now();
        let feed = Feed {
            id: Uuid::new_v4(),
            name: req.name.clone(),
            pointer_key: format!("feed-{}", req.name),
            pointer_address: String::new(),
            last_cid: String::new(),
            last_sync: None,
            sync_interval_minutes: req.sync_interval_minutes,
            created_at: now,
            updated_at: now,
        };
        feed.validate()?;
        self.feeds.create(&feed)?;
        info!(feed = %feed.name, "feed created");
        Ok(feed)
    }

    pub fn get_by_name(&self, name: &str) -> Result<Feed> {
        Ok(self.feeds.get_by_name(name)?)
    }

    pub fn list(&self) -> Result<Vec<Feed>> {
        Ok(self.feeds.list()?)
    }

    /// Resolve a feed's pointer and fetch the manifest it addresses.
    pub async fn resolve_manifest(&self, name: &str) -> Result<FeedManifest> {
        let feed = self.feeds.get_by_name(name)?;
        let cid = self.blobs.resolve_pointer(&feed.pointer_key).await?;
        let data = self.blobs.cat(&cid).await?;
        Ok(serde_json::from_slice(&data).map_err(DomainError::from)?)
    }

    /// Publish one feed: recent articles → signed manifest → blob store →
    /// mutable pointer, then unpin the previous manifest.
    pub async fn sync_feed(&self, feed: &Feed) -> Result<Feed> {
        debug!(feed = %feed.name, "syncing feed");

        let articles = self.articles.list_recent(FEED_MANIFEST_MAX_ARTICLES)?;
        let cids: Vec<String> = articles
            .into_iter()
            .map(|a| a.cid)
            .filter(|cid| !cid.is_empty())
            .collect();

        let mut manifest = FeedManifest {
            version: FEED_MANIFEST_VERSION.to_string(),
            total_count: cids.len(),
            articles: cids,
            last_updated: Utc::now(),
            signature: String::new(),
        };
        let signable = manifest.signable_bytes()?;
        let signature = self
            .keypair
            .sign(&signable)
            .map_err(|_| DomainError::InvalidKey)?;
        manifest.signature = BASE64.encode(signature);

        let manifest_json = serde_json::to_vec(&manifest).map_err(DomainError::from)?;
        let manifest_cid = self.blobs.add(&manifest_json).await?;
        let pointer_address = self
            .blobs
            .publish_pointer(&feed.pointer_key, &manifest_cid)
            .await?;

        if !feed.last_cid.is_empty() && feed.last_cid != manifest_cid {
            self.blobs.unpin(&feed.last_cid).await;
        }

        let mut updated = feed.clone();
        updated.last_cid = manifest_cid.clone();
        updated.last_sync = Some(Utc::now());
        updated.pointer_address = pointer_address;
        updated.updated_at = Utc::now();
        self.feeds.update(&updated)?;

        if let Some(ref broadcaster) = self.broadcaster {
            if let Err(e) = broadcaster.feed_updated(&updated).await {
                warn!(feed = %updated.name, error = %e, "feed broadcast failed");
            }
        }

        info!(
            feed = %updated.name,
            manifest_cid = %manifest_cid,
            articles = manifest.total_count,
            "feed published"
        );
        Ok(updated)
    }

    pub async fn trigger_sync(&self, name: &str) -> Result<Feed> {
        let feed = self.feeds.get_by_name(name)?;
        self.sync_feed(&feed).await
    }

    /// Background task: republish every feed whose interval elapsed.
    /// Pointer-publish failures are logged and retried next round.
    pub async fn run_publisher(
        self: Arc<Self>,
        check_interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(interval_secs = check_interval.as_secs(), "feed publisher started");
        let mut tick = tokio::time::interval(check_interval);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let due = match self.feeds.list_due_for_sync(Utc::now()) {
                        Ok(due) => due,
                        Err(e) => {
                            error!(error = %e, "failed to list feeds due for sync");
                            continue;
                        }
                    };
                    for feed in due {
                        if let Err(e) = self.sync_feed(&feed).await {
                            error!(feed = %feed.name, error = %e, "feed sync failed");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("feed publisher stopped");
    }
}
