//! Storage abstraction trait
//!
//! Defines the `ObjectStorage` trait that all storage backends must
//! implement, and the error classification callers dispatch on.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;

use filedepot_core::StorageBackend;

/// Storage operation errors.
///
/// `Unavailable` is transient and retryable; `InvalidKey` is a caller error
/// and never retryable; `NotFound` means the key addresses nothing.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Unavailable(_) | StorageError::Io(_))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Streaming blob contents
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// Stat-equivalent description of a stored blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobInfo {
    pub size: u64,
}

/// Object Store Gateway
///
/// All storage backends (S3, local filesystem) implement this trait. The
/// gateway is safe for concurrent access on independent keys.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Create the logical container if absent; succeed silently if present.
    async fn ensure_container(&self) -> StorageResult<()>;

    /// Durably persist a blob under the caller-generated key.
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()>;

    /// Open a blob as a stream of chunks.
    async fn get(&self, key: &str) -> StorageResult<ByteStream>;

    /// Describe a blob without reading it.
    async fn head(&self, key: &str) -> StorageResult<BlobInfo>;

    /// Remove a blob. `NotFound` if the key addresses nothing.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Enumerate every stored object key. Reconciliation-sweep hook for
    /// finding blobs without a catalog row.
    async fn list_keys(&self) -> StorageResult<Vec<String>>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
