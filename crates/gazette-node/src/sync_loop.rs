//! Pull-sync client loop: every tick, ask each connected peer for articles
//! newer than the cursor and funnel them through the ingest path.
//!
//! The cursor only advances when every peer in the round was processed
//! successfully, so a partial failure is retried instead of skipped.
//! Gossip and pull-sync are redundant on purpose; the ingest path is
//! idempotent, so double delivery is harmless.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use gazette_net::{SwarmHandle, SyncRequest, MAX_SYNC};
use gazette_shared::constants::SYNC_INITIAL_LOOKBACK_SECS;

use crate::pipeline::ArticleService;

pub struct SyncLoop {
    handle: SwarmHandle,
    pipeline: Arc<ArticleService>,
    interval: Duration,
    cursor: DateTime<Utc>,
}

impl SyncLoop {
    pub fn new(handle: SwarmHandle, pipeline: Arc<ArticleService>, interval: Duration) -> Self {
        Self {
            handle,
            pipeline,
            interval,
            cursor: Utc::now() - chrono::Duration::seconds(SYNC_INITIAL_LOOKBACK_SECS),
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "pull-sync loop started");
        let mut tick = tokio::time::interval(self.interval);
        // The immediate first tick would race the initial dials.
        tick.tick().await;

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.sync_round().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("pull-sync loop stopped");
    }

    async fn sync_round(&mut self) {
        let peers = match self.handle.peers().await {
            Ok(peers) => peers,
            Err(_) => return,
        };
        if peers.is_empty() {
            debug!("no peers to sync with");
            return;
        }

        let round_start = Utc::now();
        let request = SyncRequest {
            since: self.cursor.timestamp(),
            limit: MAX_SYNC as u32,
            exclude_ids: None,
        };

        debug!(peer_count = peers.len(), since = request.since, "starting sync round");

        let results = futures::future::join_all(peers.iter().map(|peer| {
            let handle = self.handle.clone();
            let request = request.clone();
            let peer = *peer;
            async move { (peer, handle.sync_request(peer, request).await) }
        }))
        .await;

        let mut all_ok = true;
        let mut received = 0usize;
        let mut fresh = 0usize;

        for (peer, result) in results {
            match result {
                Ok(response) => {
                    received += response.articles.len();
                    // Responses arrive newest-first; ingest in that order
                    // so has_more rounds pick up where this one stopped.
                    for article in &response.articles {
                        let known = self
                            .pipeline
                            .repo()
                            .exists(article.id)
                            .unwrap_or(false);
                        match self.pipeline.handle_incoming(article) {
                            Ok(()) if !known => fresh += 1,
                            Ok(()) => {}
                            Err(e) => {
                                warn!(peer = %peer, article_id = %article.id, error = %e,
                                      "failed to ingest synced article");
                                all_ok = false;
                            }
                        }
                    }
                    if response.has_more {
                        // Leave the cursor behind; the next tick fetches
                        // the remainder.
                        all_ok = false;
                    }
                }
                Err(e) => {
                    debug!(peer = %peer, error = %e, "sync with peer failed");
                    all_ok = false;
                }
            }
        }

        if fresh > 0 {
            info!(received, fresh, "sync round stored new articles");
        }
        if all_ok {
            self.cursor = round_start;
        }
    }

}
