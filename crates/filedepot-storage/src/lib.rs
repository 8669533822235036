//! Filedepot Storage Library
//!
//! Object Store Gateway: the `ObjectStorage` trait plus S3 and local
//! filesystem backends.
//!
//! # Object keys
//!
//! Keys are generated by the caller (the ingestion service), never by a
//! backend; the gateway has no uniqueness policy. Keys must not contain
//! `..` or a leading `/`. A successful `put` has durably persisted the blob
//! before returning; no partial write is observable through `get` or
//! `head`.

pub mod factory;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
pub use filedepot_core::StorageBackend;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{BlobInfo, ByteStream, ObjectStorage, StorageError, StorageResult};
