//! Search-index hand-off.
//!
//! The pipeline only needs a small capability: index, update, remove. The
//! real full-text engine lives behind this trait; [`MemoryIndexer`] is the
//! in-process default and keeps the node self-contained.

use std::collections::HashMap;
use std::sync::RwLock;

use uuid::Uuid;

use gazette_shared::Article;

pub trait ArticleIndexer: Send + Sync {
    fn index(&self, article: &Article) -> anyhow::Result<()>;
    fn update(&self, article: &Article) -> anyhow::Result<()>;
    fn remove(&self, id: Uuid) -> anyhow::Result<()>;
}

/// In-memory index: a single writer lock around updates, shared reads.
#[derive(Default)]
pub struct MemoryIndexer {
    docs: RwLock<HashMap<Uuid, String>>,
}

impl MemoryIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    fn doc_text(article: &Article) -> String {
        let mut text = format!("{} {} {}", article.title, article.body, article.author);
        for tag in &article.tags {
            text.push(' ');
            text.push_str(tag);
        }
        if !article.category.is_empty() {
            text.push(' ');
            text.push_str(&article.category);
        }
        text.to_lowercase()
    }

    /// Case-insensitive substring search over indexed documents.
    pub fn search(&self, query: &str) -> Vec<Uuid> {
        let needle = query.to_lowercase();
        let docs = self.docs.read().expect("index lock");
        docs.iter()
            .filter(|(_, text)| text.contains(&needle))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn count(&self) -> usize {
        self.docs.read().expect("index lock").len()
    }
}

impl ArticleIndexer for MemoryIndexer {
    fn index(&self, article: &Article) -> anyhow::Result<()> {
        let mut docs = self.docs.write().expect("index lock");
        docs.insert(article.id, Self::doc_text(article));
        Ok(())
    }

    fn update(&self, article: &Article) -> anyhow::Result<()> {
        self.index(article)
    }

    fn remove(&self, id: Uuid) -> anyhow::Result<()> {
        let mut docs = self.docs.write().expect("index lock");
        docs.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn article(title: &str, body: &str) -> Article {
        let now = Utc::now();
        Article {
            id: Uuid::new_v4(),
            cid: String::new(),
            title: title.into(),
            body: body.into(),
            author: "alice".into(),
            author_pubkey: String::new(),
            origin: String::new(),
            signature: String::new(),
            timestamp: now,
            tags: vec!["p2p".into()],
            category: "news".into(),
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn index_search_remove() {
        let indexer = MemoryIndexer::new();
        let a = article("Breaking story", "Something happened");
        indexer.index(&a).unwrap();

        assert_eq!(indexer.search("breaking"), vec![a.id]);
        assert_eq!(indexer.search("p2p"), vec![a.id]);
        assert!(indexer.search("unrelated").is_empty());

        indexer.remove(a.id).unwrap();
        assert!(indexer.search("breaking").is_empty());
    }

    #[test]
    fn update_replaces_document() {
        let indexer = MemoryIndexer::new();
        let mut a = article("Old title", "body");
        indexer.index(&a).unwrap();

        a.title = "New title".into();
        indexer.update(&a).unwrap();

        assert!(indexer.search("old title").is_empty());
        assert_eq!(indexer.search("new title"), vec![a.id]);
        assert_eq!(indexer.count(), 1);
    }
}
