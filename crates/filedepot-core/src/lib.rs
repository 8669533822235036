//! Filedepot Core Library
//!
//! This crate provides the domain models, error types, and configuration
//! shared across all Filedepot components.

pub mod config;
pub mod error;
pub mod models;
pub mod process_error;
pub mod storage_types;
pub mod telemetry;

// Re-export commonly used types
pub use config::{Config, WorkerConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use process_error::{ProcessError, ProcessResultExt};
pub use storage_types::StorageBackend;
