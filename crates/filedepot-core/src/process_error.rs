//! Processing error types
//!
//! Error type for event processing, allowing an operation to indicate
//! whether a failure is recoverable (the message should be redelivered) or
//! unrecoverable (the message must be acknowledged and reported, since
//! redelivering it would fail forever).

use std::fmt;

/// Event processing error that can be either recoverable or unrecoverable
#[derive(Debug)]
pub struct ProcessError {
    inner: anyhow::Error,
    recoverable: bool,
}

impl ProcessError {
    /// Create a new unrecoverable processing error
    ///
    /// Use for failures that will not change on redelivery:
    /// - malformed blob content
    /// - an unknown/unconfigured operation kind
    pub fn unrecoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            recoverable: false,
        }
    }

    /// Create a new recoverable processing error
    ///
    /// Use for failures worth retrying via channel redelivery:
    /// - object storage temporarily unavailable
    /// - transient network failures
    pub fn recoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            recoverable: true,
        }
    }

    /// Check if this error is recoverable (the message should be redelivered)
    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    /// Get the inner error
    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }

    /// Consume self and return the inner error
    pub fn into_inner(self) -> anyhow::Error {
        self.inner
    }
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for ProcessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl From<anyhow::Error> for ProcessError {
    /// Default conversion from anyhow::Error creates a recoverable error
    fn from(err: anyhow::Error) -> Self {
        Self::recoverable(err)
    }
}

/// Extension trait for Result to easily create unrecoverable processing errors
pub trait ProcessResultExt<T> {
    /// Mark this result as unrecoverable on error
    fn unrecoverable(self) -> Result<T, ProcessError>;
}

impl<T, E: Into<anyhow::Error>> ProcessResultExt<T> for Result<T, E> {
    fn unrecoverable(self) -> Result<T, ProcessError> {
        self.map_err(|e| ProcessError::unrecoverable(e.into()))
    }
}
