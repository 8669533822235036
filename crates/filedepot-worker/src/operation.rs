//! Processing operations
//!
//! The operation run against each ingested blob is opaque to the pipeline:
//! implementations register by kind string and the worker is configured
//! with one kind. Operations that write derived state must key that write
//! by `event.id`, since the same event can be delivered more than once.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use filedepot_core::models::IngestionEvent;
use filedepot_core::ProcessError;
use filedepot_storage::ByteStream;

#[async_trait]
pub trait ProcessOperation: Send + Sync {
    /// Kind string this operation registers under.
    fn kind(&self) -> &'static str;

    /// Run against one event's blob, fully draining the stream.
    async fn run(
        &self,
        event: &IngestionEvent,
        blob: ByteStream,
    ) -> Result<serde_json::Value, ProcessError>;
}

/// Registry of available operations, keyed by kind.
#[derive(Default)]
pub struct OperationRegistry {
    operations: HashMap<&'static str, Arc<dyn ProcessOperation>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in operations.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(InspectOperation));
        registry
    }

    pub fn register(&mut self, operation: Arc<dyn ProcessOperation>) {
        self.operations.insert(operation.kind(), operation);
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn ProcessOperation>> {
        self.operations.get(kind).cloned()
    }
}

/// Built-in operation: drain the blob, count its bytes, and log a summary
/// comparing the observed size with the event's declared size. Read-only,
/// so it is naturally idempotent under redelivery.
pub struct InspectOperation;

#[async_trait]
impl ProcessOperation for InspectOperation {
    fn kind(&self) -> &'static str {
        "inspect"
    }

    async fn run(
        &self,
        event: &IngestionEvent,
        mut blob: ByteStream,
    ) -> Result<serde_json::Value, ProcessError> {
        let mut bytes_read: u64 = 0;

        while let Some(chunk) = blob.next().await {
            let chunk = chunk.map_err(|e| {
                if e.is_transient() {
                    ProcessError::recoverable(e)
                } else {
                    ProcessError::unrecoverable(e)
                }
            })?;
            bytes_read += chunk.len() as u64;
        }

        let size_matches = bytes_read == event.size as u64;
        if size_matches {
            tracing::info!(
                file_id = %event.id,
                object_key = %event.object_key,
                content_type = %event.content_type,
                bytes_read = bytes_read,
                "Blob inspected"
            );
        } else {
            tracing::warn!(
                file_id = %event.id,
                object_key = %event.object_key,
                bytes_read = bytes_read,
                declared_size = event.size,
                "Blob size does not match its catalog record"
            );
        }

        Ok(json!({
            "bytesRead": bytes_read,
            "declaredSize": event.size,
            "sizeMatches": size_matches,
        }))
    }
}
