//! DocumentStore port - the remote text blob (a pull-request comment).
//!
//! The store offers list, create, read and overwrite-by-id. There is no
//! compare-and-swap and no ordering guarantee between independent writers:
//! the lock protocol in `app::coordinator` is what makes sharing safe.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Store-assigned id of a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlobId(u64);

impl BlobId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A snapshot of one blob as returned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    pub id: BlobId,
    pub body: String,
}

impl Blob {
    pub fn new(id: BlobId, body: impl Into<String>) -> Self {
        Self {
            id,
            body: body.into(),
        }
    }
}

/// Transport-level failure. Propagated unmodified by the lock.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("blob {0} not found")]
    NotFound(BlobId),

    #[error("store I/O failed: {0}")]
    Io(String),

    #[error("store operation failed: {0}")]
    Other(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

/// Remote blob store.
///
/// Implementations must be cheap to call repeatedly; the lock polls them.
///
/// # Design principles
/// - bodies are opaque text; the store never interprets them
/// - errors are transport errors only, the coordinator does not retry them
///
/// # Implementations
/// - `InMemoryDocumentStore`: tests and development
/// - `DirDocumentStore`: one file per blob, shared between processes
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// All blobs visible to this writer, in store order.
    async fn list(&self) -> Result<Vec<Blob>, StoreError>;

    async fn create(&self, body: &str) -> Result<Blob, StoreError>;

    async fn read(&self, id: BlobId) -> Result<Blob, StoreError>;

    /// Replace the whole body. Last writer wins.
    async fn overwrite(&self, id: BlobId, body: &str) -> Result<Blob, StoreError>;
}

#[async_trait]
impl<T: DocumentStore + ?Sized> DocumentStore for std::sync::Arc<T> {
    async fn list(&self) -> Result<Vec<Blob>, StoreError> {
        (**self).list().await
    }

    async fn create(&self, body: &str) -> Result<Blob, StoreError> {
        (**self).create(body).await
    }

    async fn read(&self, id: BlobId) -> Result<Blob, StoreError> {
        (**self).read(id).await
    }

    async fn overwrite(&self, id: BlobId, body: &str) -> Result<Blob, StoreError> {
        (**self).overwrite(id, body).await
    }
}
