//! Gossip publishing and inbound dispatch.
//!
//! [`Broadcaster`] signs envelopes with the node keypair and publishes
//! them on the right topic. [`Dispatcher`] drains swarm notifications,
//! verifies envelope signatures, and routes payloads: articles into the
//! pipeline, feeds/votes/moderation to registered handlers. Handler
//! failures are logged and swallowed so a bad message can never
//! unsubscribe the node.

use std::sync::Arc;
use std::time::Duration;

use libp2p::identity::Keypair;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use gazette_net::envelope::{
    ArticleEnvelope, EnvelopeKind, FeedEnvelope, ModerationMessage, VoteMessage,
};
use gazette_net::{SwarmHandle, SwarmNotification, SyncRequest, SyncResponse};
use gazette_shared::constants::{
    SYNC_RESPOND_TIMEOUT_SECS, TOPIC_ARTICLES, TOPIC_FEEDS, TOPIC_MODERATION, TOPIC_VOTES,
};
use gazette_shared::{Article, Feed};

use crate::pipeline::ArticleService;

/// Signs and publishes gossip envelopes.
#[derive(Clone)]
pub struct Broadcaster {
    handle: SwarmHandle,
    keypair: Keypair,
}

impl Broadcaster {
    pub fn new(handle: SwarmHandle, keypair: Keypair) -> Self {
        Self { handle, keypair }
    }

    /// Join the four gossip topics.
    pub async fn join_topics(&self) -> anyhow::Result<()> {
        for topic in [TOPIC_ARTICLES, TOPIC_FEEDS, TOPIC_VOTES, TOPIC_MODERATION] {
            self.handle.join_topic(topic).await?;
        }
        Ok(())
    }

    pub async fn article_created(&self, article: &Article) -> anyhow::Result<()> {
        self.publish_article(ArticleEnvelope::new_article(article.clone())).await
    }

    pub async fn article_updated(&self, article: &Article) -> anyhow::Result<()> {
        self.publish_article(ArticleEnvelope::updated_article(article.clone())).await
    }

    pub async fn article_deleted(&self, article_id: Uuid) -> anyhow::Result<()> {
        self.publish_article(ArticleEnvelope::deleted_article(article_id)).await
    }

    async fn publish_article(&self, mut envelope: ArticleEnvelope) -> anyhow::Result<()> {
        envelope.sign(&self.keypair)?;
        let data = serde_json::to_vec(&envelope)?;
        self.handle.publish(TOPIC_ARTICLES, data).await?;
        debug!(kind = ?envelope.kind, "broadcast article envelope");
        Ok(())
    }

    pub async fn feed_updated(&self, feed: &Feed) -> anyhow::Result<()> {
        let mut envelope = FeedEnvelope::new(EnvelopeKind::Update, feed.clone());
        envelope.sign(&self.keypair)?;
        let data = serde_json::to_vec(&envelope)?;
        self.handle.publish(TOPIC_FEEDS, data).await?;
        debug!(feed = %feed.name, "broadcast feed envelope");
        Ok(())
    }
}

type VoteHandler = Box<dyn Fn(&VoteMessage) + Send + Sync>;
type ModerationHandler = Box<dyn Fn(&ModerationMessage) + Send + Sync>;
type FeedHandler = Box<dyn Fn(&Feed) + Send + Sync>;

/// Routes verified gossip messages and inbound sync requests.
pub struct Dispatcher {
    handle: SwarmHandle,
    pipeline: Arc<ArticleService>,
    feed_handlers: Vec<FeedHandler>,
    vote_handlers: Vec<VoteHandler>,
    moderation_handlers: Vec<ModerationHandler>,
}

impl Dispatcher {
    pub fn new(handle: SwarmHandle, pipeline: Arc<ArticleService>) -> Self {
        Self {
            handle,
            pipeline,
            feed_handlers: Vec::new(),
            vote_handlers: Vec::new(),
            moderation_handlers: Vec::new(),
        }
    }

    /// Handlers must be idempotent; they may be invoked for redelivered
    /// messages that slipped past the dedup cache.
    pub fn on_feed(&mut self, handler: FeedHandler) {
        self.feed_handlers.push(handler);
    }

    pub fn on_vote(&mut self, handler: VoteHandler) {
        self.vote_handlers.push(handler);
    }

    pub fn on_moderation(&mut self, handler: ModerationHandler) {
        self.moderation_handlers.push(handler);
    }

    /// Drain notifications until shutdown.
    pub async fn run(
        self,
        mut notifications: mpsc::Receiver<SwarmNotification>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("gossip dispatcher started");
        loop {
            tokio::select! {
                notification = notifications.recv() => {
                    match notification {
                        Some(SwarmNotification::Message { topic, data, .. }) => {
                            self.dispatch_message(&topic, &data);
                        }
                        Some(SwarmNotification::SyncRequestReceived { peer, request, channel }) => {
                            let response = self.answer_sync(&request);
                            let respond = tokio::time::timeout(
                                Duration::from_secs(SYNC_RESPOND_TIMEOUT_SECS),
                                self.handle.sync_respond(channel, response),
                            );
                            if respond.await.is_err() {
                                debug!(peer = %peer, "sync respond timed out");
                            }
                        }
                        Some(SwarmNotification::PeerConnected { peer_id, .. }) => {
                            debug!(peer = %peer_id, "peer connected");
                        }
                        Some(SwarmNotification::PeerDisconnected { peer_id }) => {
                            debug!(peer = %peer_id, "peer disconnected");
                        }
                        Some(SwarmNotification::RelayReservation { relay_peer }) => {
                            debug!(relay = %relay_peer, "relay reservation active");
                        }
                        None => break,
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("gossip dispatcher stopped");
    }

    fn dispatch_message(&self, topic: &str, data: &[u8]) {
        match topic {
            TOPIC_ARTICLES => self.handle_article_message(data),
            TOPIC_FEEDS => self.handle_feed_message(data),
            TOPIC_VOTES => self.handle_vote_message(data),
            TOPIC_MODERATION => self.handle_moderation_message(data),
            other => debug!(topic = %other, "message on unknown topic"),
        }
    }

    fn handle_article_message(&self, data: &[u8]) {
        let envelope: ArticleEnvelope = match serde_json::from_slice(data) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(error = %e, "unparseable article envelope");
                return;
            }
        };
        if envelope.verify().is_err() {
            debug!("dropping article envelope with bad signature");
            return;
        }

        match envelope.kind {
            EnvelopeKind::New | EnvelopeKind::Update => {
                let Some(ref article) = envelope.article else {
                    debug!("article envelope without article payload");
                    return;
                };
                if let Err(e) = self.pipeline.handle_incoming(article) {
                    warn!(article_id = %article.id, error = %e, "failed to ingest article");
                }
            }
            EnvelopeKind::Delete => {
                // Deletion is advisory; this node retains its replica.
                if let Some(id) = envelope.article_id {
                    info!(article_id = %id, peer = %envelope.peer_id, "peer announced deletion");
                }
            }
        }
    }

    fn handle_feed_message(&self, data: &[u8]) {
        let envelope: FeedEnvelope = match serde_json::from_slice(data) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(error = %e, "unparseable feed envelope");
                return;
            }
        };
        if envelope.verify().is_err() {
            debug!("dropping feed envelope with bad signature");
            return;
        }
        debug!(feed = %envelope.feed.name, "feed announcement received");
        for handler in &self.feed_handlers {
            handler(&envelope.feed);
        }
    }

    fn handle_vote_message(&self, data: &[u8]) {
        // Reserved topic: fixed envelope, no core consumer.
        let Ok(vote) = serde_json::from_slice::<VoteMessage>(data) else {
            debug!("unparseable vote message");
            return;
        };
        debug!(article_id = %vote.article_id, vote = vote.vote, "vote received");
        for handler in &self.vote_handlers {
            handler(&vote);
        }
    }

    fn handle_moderation_message(&self, data: &[u8]) {
        // Reserved topic: fixed envelope, no core consumer.
        let Ok(action) = serde_json::from_slice::<ModerationMessage>(data) else {
            debug!("unparseable moderation message");
            return;
        };
        debug!(article_id = %action.article_id, action = %action.action, "moderation received");
        for handler in &self.moderation_handlers {
            handler(&action);
        }
    }

    /// Build the response to an inbound pull-sync request. The cap is
    /// enforced here no matter what the request asked for.
    fn answer_sync(&self, request: &SyncRequest) -> SyncResponse {
        let limit = request.effective_limit();
        let since = chrono::DateTime::from_timestamp(request.since, 0)
            .unwrap_or_else(chrono::Utc::now);

        let articles = match self.pipeline.repo().list_recent_since(since, limit) {
            Ok(articles) => articles,
            Err(e) => {
                warn!(error = %e, "failed to load articles for sync");
                return SyncResponse {
                    articles: Vec::new(),
                    has_more: false,
                };
            }
        };

        let has_more = articles.len() >= limit;
        let filtered: Vec<_> = articles
            .into_iter()
            .filter(|a| !request.excludes(&a.id))
            .collect();

        SyncResponse {
            articles: filtered,
            has_more,
        }
    }
}
