//! The article pipeline: sign → content-address → store → broadcast on the
//! authoring node; verify → dedup → persist → index on replicas.
//!
//! Both gossip delivery and pull-sync funnel into [`ArticleService::handle_incoming`],
//! which is idempotent: replaying an article, or racing the two delivery
//! paths, leaves local state unchanged.
//!
//! Deletes are advisory across the network: `delete` unlinks locally and
//! announces the deletion, but replicas are free to retain their copy.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use gazette_shared::{
    identity, keystore, Article, ArticleCreateRequest, ArticleListFilter, ArticleUpdateRequest,
    DomainError, Identity,
};
use gazette_store::{ArticleRepository, BlobStore, StoreError, UserRepository};

use crate::error::Result;
use crate::gossip::Broadcaster;
use crate::index::ArticleIndexer;

pub struct ArticleService {
    articles: Arc<dyn ArticleRepository>,
    users: Arc<dyn UserRepository>,
    blobs: BlobStore,
    indexer: Arc<dyn ArticleIndexer>,
    broadcaster: Option<Broadcaster>,
    /// Opaque producer identifier stamped into articles; diagnostics only.
    origin: String,
}

impl ArticleService {
    pub fn new(
        articles: Arc<dyn ArticleRepository>,
        users: Arc<dyn UserRepository>,
        blobs: BlobStore,
        indexer: Arc<dyn ArticleIndexer>,
        broadcaster: Option<Broadcaster>,
        origin: String,
    ) -> Self {
        Self {
            articles,
            users,
            blobs,
            indexer,
            broadcaster,
            origin,
        }
    }

    pub fn repo(&self) -> &Arc<dyn ArticleRepository> {
        &self.articles
    }

    /// Author a new article: sign, content-address, persist, index,
    /// broadcast. Broadcast failures leave the article stored; pull-sync
    /// will deliver it.
    pub async fn create(&self, req: &ArticleCreateRequest, user_id: &str) -> Result<Article> {
        let user = self.users.get_by_id(user_id)?;
        if !user.is_active {
            return Err(DomainError::Forbidden.into());
        }
        let author = self.load_signing_identity(&user)?;

        let now = Utc::now();
        let mut article = Article {
            id: Uuid::new_v4(),
            cid: String::new(),
            title: req.title.clone(),
            body: req.body.clone(),
            author: user.username.clone(),
            author_pubkey: user.public_key.clone(),
            origin: self.origin.clone(),
            signature: String::new(),
            timestamp: now,
            tags: req.tags.clone(),
            category: req.category.clone(),
            version: 1,
            created_at: now,
            updated_at: now,
        };
        article.validate()?;
        identity::sign_article(&mut article, &author)?;

        let canonical = article.to_json()?;
        article.cid = self.blobs.add(&canonical).await?;

        self.articles.upsert(&article)?;
        if let Err(e) = self.indexer.index(&article) {
            warn!(article_id = %article.id, error = %e, "failed to index article");
        }

        if let Some(ref broadcaster) = self.broadcaster {
            if let Err(e) = broadcaster.article_created(&article).await {
                warn!(article_id = %article.id, error = %e, "broadcast failed, article stays local");
            }
        }

        info!(
            article_id = %article.id,
            cid = %article.cid,
            author = %user.username,
            "article created"
        );
        Ok(article)
    }

    /// Ingest an article received from the network (gossip or pull-sync).
    ///
    /// Unverifiable input is dropped without error: this is untrusted
    /// traffic, not a caller mistake. Duplicates resolve by the
    /// (version, timestamp, cid) tie-break and replays succeed silently.
    pub fn handle_incoming(&self, article: &Article) -> Result<()> {
        if identity::verify_article(article).is_err() {
            debug!(article_id = %article.id, "dropping article with bad signature");
            return Ok(());
        }
        if article.validate().is_err() {
            debug!(article_id = %article.id, "dropping invalid article");
            return Ok(());
        }

        match self.articles.get_by_id(article.id) {
            Ok(existing) => {
                if !article.beats(&existing) {
                    debug!(article_id = %article.id, "keeping local copy, incoming does not win");
                    return Ok(());
                }
            }
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }

        self.articles.upsert(article)?;
        if let Err(e) = self.indexer.update(article) {
            warn!(article_id = %article.id, error = %e, "failed to index incoming article");
        }
        debug!(article_id = %article.id, version = article.version, "stored incoming article");
        Ok(())
    }

    pub fn get_by_id(&self, id: Uuid) -> Result<Article> {
        Ok(self.articles.get_by_id(id)?)
    }

    /// Local lookup first; on a miss, fetch the canonical blob, parse and
    /// verify it before returning.
    pub async fn get_by_cid(&self, cid: &str) -> Result<Article> {
        match self.articles.get_by_cid(cid) {
            Ok(article) => return Ok(article),
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }

        debug!(cid = %cid, "article not local, fetching blob");
        let data = self.blobs.cat(cid).await?;
        let article = Article::from_json(&data)?;
        identity::verify_article(&article)?;
        Ok(article)
    }

    pub fn list(&self, filter: &ArticleListFilter) -> Result<(Vec<Article>, u64)> {
        Ok(self.articles.list(filter)?)
    }

    pub fn list_recent(&self, limit: usize) -> Result<Vec<Article>> {
        Ok(self.articles.list_recent(limit)?)
    }

    /// Apply an author's patch: re-validate, re-sign, re-address, persist
    /// and announce the new version.
    pub async fn update(
        &self,
        id: Uuid,
        patch: &ArticleUpdateRequest,
        user_id: &str,
    ) -> Result<Article> {
        let mut article = self.articles.get_by_id(id)?;
        let user = self.users.get_by_id(user_id)?;
        if article.author != user.username {
            return Err(DomainError::Forbidden.into());
        }
        let author = self.load_signing_identity(&user)?;

        if let Some(ref title) = patch.title {
            if !title.is_empty() {
                article.title = title.clone();
            }
        }
        if let Some(ref body) = patch.body {
            if !body.is_empty() {
                article.body = body.clone();
            }
        }
        if let Some(ref tags) = patch.tags {
            article.tags = tags.clone();
        }
        if let Some(ref category) = patch.category {
            if !category.is_empty() {
                article.category = category.clone();
            }
        }
        article.updated_at = Utc::now();
        article.version += 1;

        article.validate()?;
        identity::sign_article(&mut article, &author)?;

        let prior_cid = article.cid.clone();
        article.cid = String::new();
        let canonical = article.to_json()?;
        article.cid = self.blobs.add(&canonical).await?;
        self.blobs.unpin(&prior_cid).await;

        self.articles.upsert(&article)?;
        if let Err(e) = self.indexer.update(&article) {
            warn!(article_id = %article.id, error = %e, "failed to update article index");
        }

        if let Some(ref broadcaster) = self.broadcaster {
            if let Err(e) = broadcaster.article_updated(&article).await {
                warn!(article_id = %article.id, error = %e, "update broadcast failed");
            }
        }

        info!(article_id = %article.id, version = article.version, "article updated");
        Ok(article)
    }

    /// Local unlink plus an advisory deletion announcement.
    pub async fn delete(&self, id: Uuid, user_id: &str) -> Result<()> {
        let article = self.articles.get_by_id(id)?;
        let user = self.users.get_by_id(user_id)?;
        if article.author != user.username {
            return Err(DomainError::Forbidden.into());
        }

        self.articles.delete(id)?;
        if let Err(e) = self.indexer.remove(id) {
            warn!(article_id = %id, error = %e, "failed to remove article from index");
        }
        self.blobs.unpin(&article.cid).await;

        if let Some(ref broadcaster) = self.broadcaster {
            if let Err(e) = broadcaster.article_deleted(id).await {
                warn!(article_id = %id, error = %e, "delete broadcast failed");
            }
        }

        info!(article_id = %id, "article deleted locally");
        Ok(())
    }

    /// On-demand verification of a content-addressed article.
    pub async fn verify_signature(&self, cid: &str) -> Result<bool> {
        let article = self.get_by_cid(cid).await?;
        Ok(identity::verify_article(&article).is_ok())
    }

    fn load_signing_identity(&self, user: &gazette_shared::User) -> Result<Identity> {
        let secret =
            keystore::decrypt_private_key(&user.private_key, user.password_hash.as_bytes())?;
        Ok(Identity::from_secret_bytes(&secret))
    }
}
