use std::sync::Arc;

use chrono::{DateTime, Utc};
use sled::transaction::ConflictableTransactionResult;
use sled::Transactional;
use uuid::Uuid;

use gazette_shared::{Article, ArticleListFilter};

use crate::error::{Result, StoreError};
use crate::kv::{ts_key, KvDatabase};
use crate::repo::ArticleRepository;

pub struct KvArticleRepo {
    articles: sled::Tree,
    by_cid: sled::Tree,
    by_time: sled::Tree,
    by_author: sled::Tree,
}

impl KvArticleRepo {
    pub fn new(db: Arc<KvDatabase>) -> Result<Self> {
        Ok(Self {
            articles: db.tree("articles")?,
            by_cid: db.tree("articles_cid")?,
            by_time: db.tree("articles_time")?,
            by_author: db.tree("articles_author")?,
        })
    }

    fn load(&self, id_key: &[u8]) -> Result<Article> {
        let raw = self.articles.get(id_key)?.ok_or(StoreError::NotFound)?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

fn time_key(article: &Article) -> Vec<u8> {
    let mut key = ts_key(article.timestamp).to_vec();
    key.extend_from_slice(article.id.to_string().as_bytes());
    key
}

fn author_key(article: &Article) -> Vec<u8> {
    let mut key = article.author.to_lowercase().into_bytes();
    key.push(0x00);
    key.extend_from_slice(&ts_key(article.timestamp));
    key.extend_from_slice(article.id.to_string().as_bytes());
    key
}

impl ArticleRepository for KvArticleRepo {
    fn upsert(&self, article: &Article) -> Result<()> {
        let id_key = article.id.to_string().into_bytes();
        let data = serde_json::to_vec(article)?;
        let new_time_key = time_key(article);
        let new_author_key = author_key(article);

        // Old index keys must be removed when the timestamp or CID changed.
        let previous = match self.articles.get(&id_key)? {
            Some(raw) => Some(serde_json::from_slice::<Article>(&raw)?),
            None => None,
        };
        let old_keys = previous
            .as_ref()
            .map(|old| (old.cid.clone(), time_key(old), author_key(old)));

        (&self.articles, &self.by_cid, &self.by_time, &self.by_author)
            .transaction(
                |(articles, by_cid, by_time, by_author)| -> ConflictableTransactionResult<(), ()> {
                    if let Some((ref old_cid, ref old_time, ref old_author)) = old_keys {
                        if !old_cid.is_empty() && *old_cid != article.cid {
                            by_cid.remove(old_cid.as_bytes())?;
                        }
                        by_time.remove(old_time.as_slice())?;
                        by_author.remove(old_author.as_slice())?;
                    }

                    articles.insert(id_key.as_slice(), data.as_slice())?;
                    if !article.cid.is_empty() {
                        by_cid.insert(article.cid.as_bytes(), id_key.as_slice())?;
                    }
                    by_time.insert(new_time_key.as_slice(), id_key.as_slice())?;
                    by_author.insert(new_author_key.as_slice(), id_key.as_slice())?;
                    Ok(())
                },
            )
            .map_err(map_txn_err)?;
        Ok(())
    }

    fn get_by_id(&self, id: Uuid) -> Result<Article> {
        self.load(id.to_string().as_bytes())
    }

    fn get_by_cid(&self, cid: &str) -> Result<Article> {
        let id_key = self.by_cid.get(cid.as_bytes())?.ok_or(StoreError::NotFound)?;
        self.load(&id_key)
    }

    fn exists(&self, id: Uuid) -> Result<bool> {
        Ok(self.articles.contains_key(id.to_string().as_bytes())?)
    }

    fn delete(&self, id: Uuid) -> Result<bool> {
        let id_key = id.to_string().into_bytes();
        let article = match self.articles.get(&id_key)? {
            Some(raw) => serde_json::from_slice::<Article>(&raw)?,
            None => return Ok(false),
        };
        let old_time = time_key(&article);
        let old_author = author_key(&article);

        (&self.articles, &self.by_cid, &self.by_time, &self.by_author)
            .transaction(
                |(articles, by_cid, by_time, by_author)| -> ConflictableTransactionResult<(), ()> {
                    articles.remove(id_key.as_slice())?;
                    if !article.cid.is_empty() {
                        by_cid.remove(article.cid.as_bytes())?;
                    }
                    by_time.remove(old_time.as_slice())?;
                    by_author.remove(old_author.as_slice())?;
                    Ok(())
                },
            )
            .map_err(map_txn_err)?;
        Ok(true)
    }

    fn list(&self, filter: &ArticleListFilter) -> Result<(Vec<Article>, u64)> {
        let filter = filter.clone().normalized();
        // In-memory scan over the time index, newest first. Complex queries
        // belong to the search index, not this store.
        let mut matches = Vec::new();
        for entry in self.by_time.iter().rev() {
            let (_, id_key) = entry?;
            let article = self.load(&id_key)?;
            if filter_matches(&filter, &article) {
                matches.push(article);
            }
        }
        let total = matches.len() as u64;
        let start = (filter.offset() as usize).min(matches.len());
        let end = (start + filter.limit as usize).min(matches.len());
        Ok((matches[start..end].to_vec(), total))
    }

    fn list_recent(&self, limit: usize) -> Result<Vec<Article>> {
        let mut articles = Vec::new();
        for entry in self.by_time.iter().rev().take(limit) {
            let (_, id_key) = entry?;
            articles.push(self.load(&id_key)?);
        }
        Ok(articles)
    }

    fn list_recent_since(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<Article>> {
        let start: Vec<u8> = ts_key(since).to_vec();
        let mut articles = Vec::new();
        for entry in self.by_time.range(start..).rev() {
            let (_, id_key) = entry?;
            let article = self.load(&id_key)?;
            if article.timestamp <= since {
                continue;
            }
            articles.push(article);
            if articles.len() >= limit {
                break;
            }
        }
        Ok(articles)
    }

    fn list_by_author(&self, author: &str, page: u32, limit: u32) -> Result<(Vec<Article>, u64)> {
        let mut prefix = author.to_lowercase().into_bytes();
        prefix.push(0x00);

        let mut ids = Vec::new();
        for entry in self.by_author.scan_prefix(&prefix) {
            let (_, id_key) = entry?;
            ids.push(id_key);
        }
        ids.reverse(); // newest first

        let total = ids.len() as u64;
        let page = page.max(1);
        let limit = limit.clamp(1, 100);
        let start = (((page - 1) * limit) as usize).min(ids.len());
        let end = (start + limit as usize).min(ids.len());

        let mut articles = Vec::new();
        for id_key in &ids[start..end] {
            articles.push(self.load(id_key)?);
        }
        Ok((articles, total))
    }
}

fn filter_matches(filter: &ArticleListFilter, article: &Article) -> bool {
    if let Some(ref author) = filter.author {
        if article.author != *author {
            return false;
        }
    }
    if let Some(ref category) = filter.category {
        if article.category != *category {
            return false;
        }
    }
    if let Some(ref tag) = filter.tag {
        if !article.tags.iter().any(|t| t == tag) {
            return false;
        }
    }
    if let Some(from) = filter.from {
        if article.timestamp < from {
            return false;
        }
    }
    if let Some(to) = filter.to {
        if article.timestamp > to {
            return false;
        }
    }
    true
}

fn map_txn_err(err: sled::transaction::TransactionError<()>) -> StoreError {
    match err {
        sled::transaction::TransactionError::Storage(e) => StoreError::Sled(e),
        sled::transaction::TransactionError::Abort(()) => {
            StoreError::Migration("kv transaction aborted".into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> (KvArticleRepo, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(KvDatabase::open(&dir.path().join("kv")).unwrap());
        (KvArticleRepo::new(db).unwrap(), dir)
    }

    fn article(title: &str, offset_secs: i64) -> Article {
        let ts = Utc::now() + chrono::Duration::seconds(offset_secs);
        Article {
            id: Uuid::new_v4(),
            cid: format!("b3{title}"),
            title: title.into(),
            body: "body".into(),
            author: "alice".into(),
            author_pubkey: "pk".into(),
            origin: "node".into(),
            signature: "sig".into(),
            timestamp: ts,
            tags: vec!["p2p".into()],
            category: "news".into(),
            version: 1,
            created_at: ts,
            updated_at: ts,
        }
    }

    #[test]
    fn upsert_get_round_trip() {
        let (repo, _dir) = repo();
        let a = article("one", 0);
        repo.upsert(&a).unwrap();
        assert_eq!(repo.get_by_id(a.id).unwrap(), a);
        assert_eq!(repo.get_by_cid(&a.cid).unwrap(), a);
    }

    #[test]
    fn upsert_replaces_indexes() {
        let (repo, _dir) = repo();
        let mut a = article("one", 0);
        repo.upsert(&a).unwrap();

        let old_cid = a.cid.clone();
        a.cid = "b3new".into();
        a.version = 2;
        repo.upsert(&a).unwrap();

        assert!(matches!(repo.get_by_cid(&old_cid), Err(StoreError::NotFound)));
        assert_eq!(repo.get_by_cid("b3new").unwrap().version, 2);
        assert_eq!(repo.list_recent(10).unwrap().len(), 1);
    }

    #[test]
    fn recent_is_descending() {
        let (repo, _dir) = repo();
        repo.upsert(&article("old", -60)).unwrap();
        repo.upsert(&article("new", 0)).unwrap();
        let recent = repo.list_recent(10).unwrap();
        assert_eq!(recent[0].title, "new");
        assert_eq!(recent[1].title, "old");
    }

    #[test]
    fn since_excludes_older() {
        let (repo, _dir) = repo();
        repo.upsert(&article("old", -600)).unwrap();
        repo.upsert(&article("new", 0)).unwrap();
        let since = Utc::now() - chrono::Duration::seconds(60);
        let recent = repo.list_recent_since(since, 10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].title, "new");
    }

    #[test]
    fn delete_cleans_indexes() {
        let (repo, _dir) = repo();
        let a = article("gone", 0);
        repo.upsert(&a).unwrap();
        assert!(repo.delete(a.id).unwrap());
        assert!(!repo.delete(a.id).unwrap());
        assert!(matches!(repo.get_by_cid(&a.cid), Err(StoreError::NotFound)));
        assert!(repo.list_recent(10).unwrap().is_empty());
    }

    #[test]
    fn list_filters_and_pages() {
        let (repo, _dir) = repo();
        for i in 0..4 {
            repo.upsert(&article(&format!("a{i}"), -i)).unwrap();
        }
        let mut tech = article("tech", 1);
        tech.category = "technology".into();
        repo.upsert(&tech).unwrap();

        let filter = ArticleListFilter {
            category: Some("technology".into()),
            ..Default::default()
        };
        let (items, total) = repo.list(&filter).unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].title, "tech");

        let filter = ArticleListFilter {
            page: 2,
            limit: 2,
            ..Default::default()
        };
        let (items, total) = repo.list(&filter).unwrap();
        assert_eq!(total, 5);
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn list_by_author_separates_authors() {
        let (repo, _dir) = repo();
        repo.upsert(&article("mine", 0)).unwrap();
        let mut bobs = article("bobs", 1);
        bobs.author = "bob".into();
        repo.upsert(&bobs).unwrap();

        let (items, total) = repo.list_by_author("alice", 1, 10).unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].title, "mine");
    }
}
