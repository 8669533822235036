//! Error types module
//!
//! The unified `AppError` enum covers the ingestion pipeline's failure
//! taxonomy: caller errors, absent entities, transient infrastructure
//! failures of each subsystem, and catalog/blob mismatches. Conversion from
//! `sqlx::Error` is gated behind the `sqlx` feature.

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses.
///
/// Errors self-describe how an external transport layer should present them
/// and how callers should react.
pub trait ErrorMetadata {
    /// HTTP status code an edge layer would return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "STORAGE_UNAVAILABLE")
    fn error_code(&self) -> &'static str;

    /// Whether this error is transient (the whole operation can be retried)
    fn is_transient(&self) -> bool;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Object storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Metadata catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("Event channel unavailable: {0}")]
    ChannelUnavailable(String),

    #[error("Data inconsistency: {0}")]
    DataInconsistency(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::CatalogUnavailable(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Static metadata for each variant: (http_status, error_code, transient, log_level).
/// Client messages stay per-variant for dynamic content.
fn app_error_static_metadata(err: &AppError) -> (u16, &'static str, bool, LogLevel) {
    match err {
        AppError::InvalidInput(_) => (400, "INVALID_INPUT", false, LogLevel::Debug),
        AppError::NotFound(_) => (404, "NOT_FOUND", false, LogLevel::Debug),
        AppError::StorageUnavailable(_) => (503, "STORAGE_UNAVAILABLE", true, LogLevel::Error),
        AppError::CatalogUnavailable(_) => (503, "CATALOG_UNAVAILABLE", true, LogLevel::Error),
        AppError::ChannelUnavailable(_) => (503, "CHANNEL_UNAVAILABLE", true, LogLevel::Error),
        AppError::DataInconsistency(_) => (500, "DATA_INCONSISTENCY", false, LogLevel::Error),
        AppError::Internal(_) => (500, "INTERNAL_ERROR", true, LogLevel::Error),
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_transient(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).3
    }

    fn client_message(&self) -> String {
        match self {
            AppError::InvalidInput(ref msg) => msg.clone(),
            AppError::NotFound(ref msg) => msg.clone(),
            AppError::StorageUnavailable(_) => {
                "Object storage is temporarily unavailable".to_string()
            }
            AppError::CatalogUnavailable(_) => {
                "Metadata catalog is temporarily unavailable".to_string()
            }
            AppError::ChannelUnavailable(_) => {
                "Event channel is temporarily unavailable".to_string()
            }
            AppError::DataInconsistency(_) => {
                "Stored metadata does not match object storage".to_string()
            }
            AppError::Internal(_) => "Internal error".to_string(),
        }
    }
}
