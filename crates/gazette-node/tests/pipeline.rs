//! End-to-end pipeline scenarios: authoring, replication between two
//! nodes, duplicate suppression, update ordering, forged-article
//! rejection, and feed manifest publication.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use gazette_node::{
    ArticleIndexer, ArticleService, FeedService, MemoryIndexer, UserService,
};
use gazette_shared::article::{ArticleCreateRequest, ArticleUpdateRequest};
use gazette_shared::feed::FeedCreateRequest;
use gazette_shared::identity::verify_article;
use gazette_shared::user::UserRegisterRequest;
use gazette_shared::{Article, ArticleListFilter, User};
use gazette_store::blobs::compute_cid;
use gazette_store::{open_stores, BlobStore, FsDagStore, StoreMode, Stores};

struct TestNode {
    stores: Stores,
    blobs: BlobStore,
    indexer: Arc<MemoryIndexer>,
    pipeline: ArticleService,
    users: UserService,
    feeds: Arc<FeedService>,
    _dir: tempfile::TempDir,
}

async fn node(name: &str) -> TestNode {
    let dir = tempfile::tempdir().unwrap();
    let stores = open_stores(StoreMode::Sqlite, dir.path()).unwrap();
    let dag = Arc::new(FsDagStore::open(dir.path().join("blobs")).await.unwrap());
    let blobs = BlobStore::new(dag, true);
    let indexer = Arc::new(MemoryIndexer::new());
    let keypair = libp2p::identity::Keypair::generate_ed25519();

    let pipeline = ArticleService::new(
        stores.articles.clone(),
        stores.users.clone(),
        blobs.clone(),
        indexer.clone(),
        None,
        name.to_string(),
    );
    let users = UserService::new(stores.users.clone());
    let feeds = Arc::new(FeedService::new(
        stores.feeds.clone(),
        stores.articles.clone(),
        blobs.clone(),
        keypair,
        None,
    ));

    TestNode {
        stores,
        blobs,
        indexer,
        pipeline,
        users,
        feeds,
        _dir: dir,
    }
}

fn register(node: &TestNode, username: &str) -> User {
    node.users
        .register(&UserRegisterRequest {
            username: username.into(),
            password: "correct horse battery".into(),
        })
        .unwrap()
}

fn create_request(title: &str) -> ArticleCreateRequest {
    ArticleCreateRequest {
        title: title.into(),
        body: "Hi".into(),
        tags: vec!["p2p".into()],
        category: "technology".into(),
    }
}

#[tokio::test]
async fn created_article_is_signed_and_content_addressed() {
    let node = node("a").await;
    let author = register(&node, "alice");

    let article = node
        .pipeline
        .create(&create_request("Hello"), &author.id)
        .await
        .unwrap();

    assert!(verify_article(&article).is_ok());
    assert_eq!(article.version, 1);
    assert_eq!(article.author, "alice");
    assert_eq!(article.origin, "a");

    // The CID covers the canonical blob (serialized before the CID was
    // assigned).
    let mut canonical = article.clone();
    canonical.cid = String::new();
    assert_eq!(article.cid, compute_cid(&canonical.to_json().unwrap()));

    // Stored and fetchable from the blob store too.
    let blob = node.blobs.cat(&article.cid).await.unwrap();
    let from_blob = Article::from_json(&blob).unwrap();
    assert_eq!(from_blob.id, article.id);
    assert!(verify_article(&from_blob).is_ok());
}

#[tokio::test]
async fn invalid_articles_are_rejected_at_create() {
    let node = node("a").await;
    let author = register(&node, "alice");

    let cases = [
        ArticleCreateRequest {
            body: String::new(),
            ..create_request("no body")
        },
        ArticleCreateRequest {
            title: "x".repeat(201),
            ..create_request("ignored")
        },
        ArticleCreateRequest {
            tags: (0..11).map(|i| format!("t{i}")).collect(),
            ..create_request("too many tags")
        },
        ArticleCreateRequest {
            tags: vec!["y".repeat(51)],
            ..create_request("tag too long")
        },
        ArticleCreateRequest {
            category: "astrology".into(),
            ..create_request("bad category")
        },
    ];

    for case in cases {
        let err = node.pipeline.create(&case, &author.id).await.unwrap_err();
        assert!(
            matches!(
                err,
                gazette_node::NodeError::Domain(
                    gazette_shared::DomainError::InvalidArticle { .. }
                )
            ),
            "expected InvalidArticle, got {err:?}"
        );
    }
}

#[tokio::test]
async fn two_node_replication() {
    let node_a = node("a").await;
    let node_b = node("b").await;
    let author = register(&node_a, "alice");

    let article = node_a
        .pipeline
        .create(&create_request("Hello"), &author.id)
        .await
        .unwrap();

    // Hand-off as pull-sync would do it.
    node_b.pipeline.handle_incoming(&article).unwrap();

    let replica = node_b.pipeline.get_by_id(article.id).unwrap();
    assert_eq!(replica.title, "Hello");
    assert_eq!(replica.body, "Hi");
    assert_eq!(replica.category, "technology");
    assert_eq!(replica.tags, vec!["p2p".to_string()]);
    assert!(verify_article(&replica).is_ok());
}

struct CountingIndexer {
    updates: AtomicUsize,
}

impl ArticleIndexer for CountingIndexer {
    fn index(&self, _article: &Article) -> anyhow::Result<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
    fn update(&self, _article: &Article) -> anyhow::Result<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
    fn remove(&self, _id: uuid::Uuid) -> anyhow::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn duplicate_delivery_is_suppressed() {
    let node_a = node("a").await;
    let author = register(&node_a, "alice");
    let article = node_a
        .pipeline
        .create(&create_request("Once"), &author.id)
        .await
        .unwrap();

    // Replica with a counting indexer: gossip and pull-sync race the same
    // article in, the second delivery must be a no-op.
    let dir = tempfile::tempdir().unwrap();
    let stores = open_stores(StoreMode::Sqlite, dir.path()).unwrap();
    let dag = Arc::new(FsDagStore::open(dir.path().join("blobs")).await.unwrap());
    let counter = Arc::new(CountingIndexer {
        updates: AtomicUsize::new(0),
    });
    let replica = ArticleService::new(
        stores.articles.clone(),
        stores.users.clone(),
        BlobStore::new(dag, false),
        counter.clone(),
        None,
        "b".into(),
    );

    replica.handle_incoming(&article).unwrap();
    replica.handle_incoming(&article).unwrap();

    let (items, total) = replica.list(&ArticleListFilter::default()).unwrap();
    assert_eq!(total, 1);
    assert_eq!(items.len(), 1);
    assert_eq!(counter.updates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn out_of_order_update_converges_on_latest_version() {
    let node_a = node("a").await;
    let node_c = node("c").await;
    let author = register(&node_a, "alice");

    let v1 = node_a
        .pipeline
        .create(&create_request("Draft"), &author.id)
        .await
        .unwrap();
    let v2 = node_a
        .pipeline
        .update(
            v1.id,
            &ArticleUpdateRequest {
                body: Some("Final text".into()),
                ..Default::default()
            },
            &author.id,
        )
        .await
        .unwrap();
    assert_eq!(v2.version, 2);
    assert_ne!(v2.cid, v1.cid);
    assert!(verify_article(&v2).is_ok());

    // Late joiner receives v2 first, then the stale v1.
    node_c.pipeline.handle_incoming(&v2).unwrap();
    node_c.pipeline.handle_incoming(&v1).unwrap();

    let held = node_c.pipeline.get_by_id(v1.id).unwrap();
    assert_eq!(held.version, 2);
    assert_eq!(held.body, "Final text");

    // And in-order delivery ends the same way.
    let node_d = node("d").await;
    node_d.pipeline.handle_incoming(&v1).unwrap();
    node_d.pipeline.handle_incoming(&v2).unwrap();
    assert_eq!(node_d.pipeline.get_by_id(v1.id).unwrap().version, 2);
}

#[tokio::test]
async fn forged_article_is_never_persisted() {
    let node_a = node("a").await;
    let node_b = node("b").await;
    let author = register(&node_a, "alice");

    let mut forged = node_a
        .pipeline
        .create(&create_request("Real"), &author.id)
        .await
        .unwrap();
    forged.body = "tampered propaganda".into();

    node_b.pipeline.handle_incoming(&forged).unwrap();

    assert!(node_b.pipeline.get_by_id(forged.id).is_err());
    let (items, _) = node_b.pipeline.list(&ArticleListFilter::default()).unwrap();
    assert!(items.is_empty());
    assert_eq!(node_b.indexer.count(), 0);
}

#[tokio::test]
async fn update_and_delete_require_authorship() {
    let node = node("a").await;
    let alice = register(&node, "alice");
    let mallory = register(&node, "mallory");

    let article = node
        .pipeline
        .create(&create_request("Mine"), &alice.id)
        .await
        .unwrap();

    let err = node
        .pipeline
        .update(
            article.id,
            &ArticleUpdateRequest {
                body: Some("hijacked".into()),
                ..Default::default()
            },
            &mallory.id,
        )
        .await
        .unwrap_err();
    assert!(err.is_forbidden());

    let err = node.pipeline.delete(article.id, &mallory.id).await.unwrap_err();
    assert!(err.is_forbidden());

    // The author can delete; deletion is local.
    node.pipeline.delete(article.id, &alice.id).await.unwrap();
    assert!(node.pipeline.get_by_id(article.id).is_err());
}

#[tokio::test]
async fn get_by_cid_falls_back_to_blob_store() {
    let node = node("a").await;
    let author = register(&node, "alice");
    let article = node
        .pipeline
        .create(&create_request("Addressed"), &author.id)
        .await
        .unwrap();

    // Remove the local row; the canonical blob remains.
    node.stores.articles.delete(article.id).unwrap();

    let fetched = node.pipeline.get_by_cid(&article.cid).await.unwrap();
    assert_eq!(fetched.id, article.id);
    assert_eq!(fetched.title, "Addressed");
    assert!(verify_article(&fetched).is_ok());

    assert!(node.pipeline.verify_signature(&article.cid).await.unwrap());
}

#[tokio::test]
async fn feed_manifest_lists_recent_cids_newest_first() {
    let node = node("a").await;
    let author = register(&node, "alice");

    let mut cids = Vec::new();
    for title in ["first", "second", "third"] {
        let article = node
            .pipeline
            .create(&create_request(title), &author.id)
            .await
            .unwrap();
        cids.push(article.cid);
        // Distinct timestamps so the manifest order is deterministic.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    node.feeds
        .create(&FeedCreateRequest {
            name: "global".into(),
            sync_interval_minutes: 1,
        })
        .unwrap();
    let feed = node.feeds.get_by_name("global").unwrap();
    let synced = node.feeds.sync_feed(&feed).await.unwrap();

    assert!(!synced.last_cid.is_empty());
    assert_eq!(synced.pointer_address, "/ptr/feed-global");
    assert!(synced.last_sync.is_some());

    // Resolving the pointer yields the manifest with CIDs newest-first.
    let manifest = node.feeds.resolve_manifest("global").await.unwrap();
    assert_eq!(manifest.total_count, 3);
    cids.reverse();
    assert_eq!(manifest.articles, cids);

    // Republish with a fourth article repoints the pointer.
    let fourth = node
        .pipeline
        .create(&create_request("fourth"), &author.id)
        .await
        .unwrap();
    let resynced = node.feeds.trigger_sync("global").await.unwrap();
    assert_ne!(resynced.last_cid, synced.last_cid);
    let manifest = node.feeds.resolve_manifest("global").await.unwrap();
    assert_eq!(manifest.total_count, 4);
    assert_eq!(manifest.articles[0], fourth.cid);
}

#[tokio::test]
async fn duplicate_feed_name_conflicts() {
    let node = node("a").await;
    let request = FeedCreateRequest {
        name: "global".into(),
        sync_interval_minutes: 5,
    };
    node.feeds.create(&request).unwrap();
    let err = node.feeds.create(&request).unwrap_err();
    assert!(err.is_conflict());
}
