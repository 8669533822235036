//! Processing worker
//!
//! Per-event processing: confirm the blob still exists, open it, run the
//! configured operation. Failure classification decides ack vs nack at the
//! pool level.

use anyhow::anyhow;
use serde_json::json;
use std::sync::Arc;

use filedepot_core::models::IngestionEvent;
use filedepot_core::ProcessError;
use filedepot_storage::{ObjectStorage, StorageError};

use crate::operation::OperationRegistry;

pub struct ProcessingWorker {
    storage: Arc<dyn ObjectStorage>,
    registry: OperationRegistry,
    operation: String,
}

impl ProcessingWorker {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        registry: OperationRegistry,
        operation: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            registry,
            operation: operation.into(),
        }
    }

    /// Process one delivered event.
    ///
    /// An absent blob is a no-op success: the record may have been deleted
    /// between publish and consumption, and acknowledging keeps the channel
    /// from redelivering a message that can never do work.
    #[tracing::instrument(skip(self, event), fields(file_id = %event.id, object_key = %event.object_key))]
    pub async fn process(&self, event: &IngestionEvent) -> Result<serde_json::Value, ProcessError> {
        let operation = self.registry.get(&self.operation).ok_or_else(|| {
            ProcessError::unrecoverable(anyhow!("unknown operation kind: {}", self.operation))
        })?;

        match self.storage.head(&event.object_key).await {
            Ok(_) => {}
            Err(StorageError::NotFound(_)) => {
                tracing::info!(
                    file_id = %event.id,
                    object_key = %event.object_key,
                    "Blob no longer exists, acknowledging event as a no-op"
                );
                return Ok(json!({ "skipped": true }));
            }
            Err(e) if e.is_transient() => return Err(ProcessError::recoverable(e)),
            Err(e) => return Err(ProcessError::unrecoverable(e)),
        }

        let blob = match self.storage.get(&event.object_key).await {
            Ok(stream) => stream,
            // Deleted between head and get; same no-op rule
            Err(StorageError::NotFound(_)) => {
                return Ok(json!({ "skipped": true }));
            }
            Err(e) if e.is_transient() => return Err(ProcessError::recoverable(e)),
            Err(e) => return Err(ProcessError::unrecoverable(e)),
        };

        operation.run(event, blob).await
    }
}
