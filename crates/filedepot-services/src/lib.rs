//! Filedepot Services Library
//!
//! The ingestion service: accepts uploaded content, durably stores the
//! blob, records metadata in the catalog, and announces the upload on the
//! event channel. Owns the consistency contract between the three
//! subsystems.

pub mod ingestion;
pub(crate) mod keys;
pub mod test_support;

pub use ingestion::{FileDownload, IngestionService};
