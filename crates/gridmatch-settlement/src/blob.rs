//! Content-addressed blob storage for payloads too large to put on the
//! ledger directly. A blob is addressed by the SHA-256 of its bytes.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use gridmatch_types::{ContentDigest, GridmatchError, Result};

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` and return their digest. Idempotent.
    async fn put(&self, bytes: Vec<u8>) -> Result<ContentDigest>;

    /// Fetch the bytes for `digest`.
    async fn get(&self, digest: &ContentDigest) -> Result<Vec<u8>>;
}

/// In-process [`BlobStore`].
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: DashMap<ContentDigest, Vec<u8>>,
    fail_puts: AtomicU32,
}

impl InMemoryBlobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` puts with a transient error.
    pub fn fail_next_puts(&self, n: u32) {
        self.fail_puts.store(n, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, bytes: Vec<u8>) -> Result<ContentDigest> {
        if self
            .fail_puts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(GridmatchError::BlobStore {
                reason: "injected put failure".into(),
            });
        }
        let digest = ContentDigest::of(&bytes);
        self.blobs.entry(digest).or_insert(bytes);
        Ok(digest)
    }

    async fn get(&self, digest: &ContentDigest) -> Result<Vec<u8>> {
        self.blobs
            .get(digest)
            .map(|b| b.value().clone())
            .ok_or_else(|| GridmatchError::BlobStore {
                reason: format!("no blob for digest {digest}"),
            })
    }
}
