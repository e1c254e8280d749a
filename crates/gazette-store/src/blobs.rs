//! Content-addressed blob storage.
//!
//! [`DagStore`] is the capability the rest of the system programs against:
//! add/cat/pin byte blobs by CID plus a mutable-pointer facility for feeds.
//! [`BlobStore`] wraps any `DagStore` with the retry, timeout and
//! best-effort-pin policy; [`FsDagStore`] is the local implementation,
//! keyed by BLAKE3 CIDs.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

use gazette_shared::constants::{BLOB_CAT_TIMEOUT_SECS, BLOB_OP_TIMEOUT_SECS};

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("blob upload failed after retries")]
    UploadFailed,

    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("blob store unavailable: {0}")]
    Unavailable(String),

    #[error("pointer resolve failed: {0}")]
    PointerResolve(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type BlobResult<T> = std::result::Result<T, BlobError>;

/// Low-level capability over a content-addressed DAG store.
#[async_trait]
pub trait DagStore: Send + Sync {
    /// Store bytes, returning the store-computed CID. No retry policy here.
    async fn add(&self, data: &[u8]) -> BlobResult<String>;
    async fn cat(&self, cid: &str) -> BlobResult<Vec<u8>>;
    async fn pin(&self, cid: &str) -> BlobResult<()>;
    /// Unpinning an absent CID is a no-op.
    async fn unpin(&self, cid: &str) -> BlobResult<()>;
    /// Point `name` at `cid`; returns the pointer address.
    async fn publish_pointer(&self, name: &str, cid: &str) -> BlobResult<String>;
    async fn resolve_pointer(&self, name: &str) -> BlobResult<String>;
    async fn healthy(&self) -> bool;
}

/// Policy wrapper: retries, timeouts, best-effort pinning.
#[derive(Clone)]
pub struct BlobStore {
    inner: Arc<dyn DagStore>,
    pin_content: bool,
    op_timeout: Duration,
    cat_timeout: Duration,
}

impl BlobStore {
    pub fn new(inner: Arc<dyn DagStore>, pin_content: bool) -> Self {
        Self {
            inner,
            pin_content,
            op_timeout: Duration::from_secs(BLOB_OP_TIMEOUT_SECS),
            cat_timeout: Duration::from_secs(BLOB_CAT_TIMEOUT_SECS),
        }
    }

    /// Store bytes and return the CID. Up to three attempts with 1s/2s
    /// backoff; pin failures are logged and swallowed (the content is
    /// already uploaded).
    pub async fn add(&self, data: &[u8]) -> BlobResult<String> {
        let mut last_err = None;
        for attempt in 1..=3u32 {
            match tokio::time::timeout(self.op_timeout, self.inner.add(data)).await {
                Ok(Ok(cid)) => {
                    debug!(cid = %cid, size = data.len(), "added blob");
                    if self.pin_content {
                        if let Err(e) = self.inner.pin(&cid).await {
                            warn!(cid = %cid, error = %e, "failed to pin blob");
                        }
                    }
                    return Ok(cid);
                }
                Ok(Err(e)) => {
                    warn!(attempt, error = %e, "blob add attempt failed");
                    last_err = Some(e);
                }
                Err(_) => {
                    warn!(attempt, "blob add attempt timed out");
                    last_err = Some(BlobError::Unavailable("add timed out".into()));
                }
            }
            if attempt < 3 {
                tokio::time::sleep(Duration::from_secs(attempt as u64)).await;
            }
        }
        let _ = last_err;
        Err(BlobError::UploadFailed)
    }

    pub async fn cat(&self, cid: &str) -> BlobResult<Vec<u8>> {
        match tokio::time::timeout(self.cat_timeout, self.inner.cat(cid)).await {
            Ok(result) => result,
            Err(_) => Err(BlobError::Unavailable("cat timed out".into())),
        }
    }

    /// Best-effort unpin: absent CIDs and transient failures only log.
    pub async fn unpin(&self, cid: &str) {
        if cid.is_empty() {
            return;
        }
        match tokio::time::timeout(self.op_timeout, self.inner.unpin(cid)).await {
            Ok(Ok(())) => debug!(cid = %cid, "unpinned blob"),
            Ok(Err(e)) => warn!(cid = %cid, error = %e, "failed to unpin blob"),
            Err(_) => warn!(cid = %cid, "unpin timed out"),
        }
    }

    pub async fn publish_pointer(&self, name: &str, cid: &str) -> BlobResult<String> {
        match tokio::time::timeout(self.op_timeout, self.inner.publish_pointer(name, cid)).await {
            Ok(result) => result,
            Err(_) => Err(BlobError::PointerResolve("publish timed out".into())),
        }
    }

    pub async fn resolve_pointer(&self, name: &str) -> BlobResult<String> {
        match tokio::time::timeout(self.op_timeout, self.inner.resolve_pointer(name)).await {
            Ok(result) => result,
            Err(_) => Err(BlobError::PointerResolve("resolve timed out".into())),
        }
    }

    pub async fn healthy(&self) -> bool {
        matches!(
            tokio::time::timeout(self.op_timeout, self.inner.healthy()).await,
            Ok(true)
        )
    }
}

/// Compute the CID of a byte blob: `b3` + BLAKE3 hex.
pub fn compute_cid(data: &[u8]) -> String {
    format!("b3{}", blake3::hash(data).to_hex())
}

#[derive(Serialize, Deserialize)]
struct PointerRecord {
    name: String,
    cid: String,
    updated_at: chrono::DateTime<Utc>,
}

/// Local filesystem DAG store: blobs under `blobs/<cid>`, pin markers under
/// `pins/<cid>`, mutable pointers as JSON records under `pointers/<name>`.
pub struct FsDagStore {
    base: PathBuf,
}

impl FsDagStore {
    pub async fn open(base: PathBuf) -> BlobResult<Self> {
        for sub in ["blobs", "pins", "pointers"] {
            fs::create_dir_all(base.join(sub)).await?;
        }
        Ok(Self { base })
    }

    fn blob_path(&self, cid: &str) -> PathBuf {
        self.base.join("blobs").join(cid)
    }

    fn pin_path(&self, cid: &str) -> PathBuf {
        self.base.join("pins").join(cid)
    }

    fn pointer_path(&self, name: &str) -> PathBuf {
        self.base.join("pointers").join(name)
    }
}

#[async_trait]
impl DagStore for FsDagStore {
    async fn add(&self, data: &[u8]) -> BlobResult<String> {
        let cid = compute_cid(data);
        let path = self.blob_path(&cid);
        if !path.exists() {
            fs::write(&path, data).await?;
        }
        Ok(cid)
    }

    async fn cat(&self, cid: &str) -> BlobResult<Vec<u8>> {
        let path = self.blob_path(cid);
        if !path.exists() {
            return Err(BlobError::NotFound(cid.to_string()));
        }
        Ok(fs::read(&path).await?)
    }

    async fn pin(&self, cid: &str) -> BlobResult<()> {
        if !self.blob_path(cid).exists() {
            return Err(BlobError::NotFound(cid.to_string()));
        }
        fs::write(self.pin_path(cid), b"").await?;
        Ok(())
    }

    async fn unpin(&self, cid: &str) -> BlobResult<()> {
        let path = self.pin_path(cid);
        if path.exists() {
            fs::remove_file(&path).await?;
        }
        Ok(())
    }

    async fn publish_pointer(&self, name: &str, cid: &str) -> BlobResult<String> {
        let record = PointerRecord {
            name: name.to_string(),
            cid: cid.to_string(),
            updated_at: Utc::now(),
        };
        fs::write(self.pointer_path(name), serde_json::to_vec_pretty(&record)?).await?;
        Ok(format!("/ptr/{name}"))
    }

    async fn resolve_pointer(&self, name: &str) -> BlobResult<String> {
        let path = self.pointer_path(name);
        if !path.exists() {
            return Err(BlobError::PointerResolve(format!("unknown pointer: {name}")));
        }
        let record: PointerRecord = serde_json::from_slice(&fs::read(&path).await?)?;
        Ok(record.cid)
    }

    async fn healthy(&self) -> bool {
        self.base.join("blobs").is_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    async fn store() -> (BlobStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let dag = Arc::new(FsDagStore::open(dir.path().to_path_buf()).await.unwrap());
        (BlobStore::new(dag, true), dir)
    }

    #[tokio::test]
    async fn add_cat_round_trip() {
        let (store, _dir) = store().await;
        let cid = store.add(b"article-bytes").await.unwrap();
        assert!(cid.starts_with("b3"));
        assert_eq!(store.cat(&cid).await.unwrap(), b"article-bytes");
    }

    #[tokio::test]
    async fn cid_is_deterministic() {
        let (store, _dir) = store().await;
        let a = store.add(b"same").await.unwrap();
        let b = store.add(b"same").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a, compute_cid(b"same"));
    }

    #[tokio::test]
    async fn missing_blob_is_not_found() {
        let (store, _dir) = store().await;
        assert!(matches!(
            store.cat("b3deadbeef").await,
            Err(BlobError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn unpin_absent_is_noop() {
        let (store, _dir) = store().await;
        store.unpin("b3deadbeef").await;
        store.unpin("").await;
    }

    #[tokio::test]
    async fn pointer_round_trip() {
        let (store, _dir) = store().await;
        let cid = store.add(b"manifest").await.unwrap();
        let addr = store.publish_pointer("feed-global", &cid).await.unwrap();
        assert_eq!(addr, "/ptr/feed-global");
        assert_eq!(store.resolve_pointer("feed-global").await.unwrap(), cid);
    }

    #[tokio::test]
    async fn unknown_pointer_fails() {
        let (store, _dir) = store().await;
        assert!(matches!(
            store.resolve_pointer("nope").await,
            Err(BlobError::PointerResolve(_))
        ));
    }

    struct FlakyStore {
        attempts: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl DagStore for FlakyStore {
        async fn add(&self, data: &[u8]) -> BlobResult<String> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(BlobError::Unavailable("flaky".into()));
            }
            Ok(compute_cid(data))
        }
        async fn cat(&self, cid: &str) -> BlobResult<Vec<u8>> {
            Err(BlobError::NotFound(cid.to_string()))
        }
        async fn pin(&self, _cid: &str) -> BlobResult<()> {
            Ok(())
        }
        async fn unpin(&self, _cid: &str) -> BlobResult<()> {
            Ok(())
        }
        async fn publish_pointer(&self, name: &str, _cid: &str) -> BlobResult<String> {
            Ok(format!("/ptr/{name}"))
        }
        async fn resolve_pointer(&self, name: &str) -> BlobResult<String> {
            Err(BlobError::PointerResolve(name.to_string()))
        }
        async fn healthy(&self) -> bool {
            true
        }
    }

    #[tokio::test(start_paused = true)]
    async fn add_retries_transient_failures() {
        let store = BlobStore::new(
            Arc::new(FlakyStore {
                attempts: AtomicU32::new(0),
                fail_first: 2,
            }),
            false,
        );
        let cid = store.add(b"eventually").await.unwrap();
        assert_eq!(cid, compute_cid(b"eventually"));
    }

    #[tokio::test(start_paused = true)]
    async fn add_gives_up_after_three_attempts() {
        let flaky = Arc::new(FlakyStore {
            attempts: AtomicU32::new(0),
            fail_first: u32::MAX,
        });
        let store = BlobStore::new(flaky.clone(), false);
        assert!(matches!(
            store.add(b"never").await,
            Err(BlobError::UploadFailed)
        ));
        assert_eq!(flaky.attempts.load(Ordering::SeqCst), 3);
    }
}
