//! Ingestion service
//!
//! Upload orchestration across three independently-failing subsystems:
//! object store, metadata catalog, event channel. There is no transaction
//! spanning them; the ordering and compensation rules here are the
//! consistency contract. See DESIGN.md for the orphan policy decisions.

use bytes::Bytes;
use std::sync::Arc;
use uuid::Uuid;

use filedepot_core::models::{FileRecord, IngestionEvent, NewFileRecord};
use filedepot_core::AppError;
use filedepot_db::{EventChannel, FileCatalog};
use filedepot_storage::{ByteStream, ObjectStorage, StorageError};

use crate::keys::generate_object_key;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A record plus a streaming handle to its bytes. `record.content_type`
/// and `record.size` are what a transport layer needs for response
/// framing.
pub struct FileDownload {
    pub record: FileRecord,
    pub stream: ByteStream,
}

#[derive(Clone)]
pub struct IngestionService {
    storage: Arc<dyn ObjectStorage>,
    catalog: Arc<dyn FileCatalog>,
    channel: Arc<dyn EventChannel>,
}

impl IngestionService {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        catalog: Arc<dyn FileCatalog>,
        channel: Arc<dyn EventChannel>,
    ) -> Self {
        Self {
            storage,
            catalog,
            channel,
        }
    }

    /// Ensure the blob container exists. Call once at startup.
    pub async fn ensure_ready(&self) -> Result<(), AppError> {
        self.storage
            .ensure_container()
            .await
            .map_err(map_storage_err)
    }

    /// Store an upload: blob first, then catalog record, then event.
    ///
    /// Infrastructure failures surface without internal retries; a caller
    /// retry of the whole upload is safe because every attempt generates a
    /// fresh object key. Cancelling the returned future between the blob
    /// write and the catalog insert leaves a transient orphan blob for the
    /// reconciliation sweep.
    #[tracing::instrument(skip(self, data), fields(filename = %original_filename, size_bytes = data.len()))]
    pub async fn store(
        &self,
        data: Bytes,
        original_filename: &str,
        content_type: Option<&str>,
        uploaded_by: &str,
    ) -> Result<FileRecord, AppError> {
        if data.is_empty() {
            return Err(AppError::InvalidInput("file is empty".to_string()));
        }

        let content_type = content_type
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let object_key = generate_object_key(original_filename);
        let size = data.len() as i64;

        self.storage
            .put(&object_key, data, &content_type)
            .await
            .map_err(map_storage_err)?;

        let new_record = NewFileRecord {
            original_filename: original_filename.to_string(),
            object_key: object_key.clone(),
            content_type,
            size,
            uploaded_by: uploaded_by.to_string(),
        };

        let record = match self.catalog.insert(new_record).await {
            Ok(record) => record,
            Err(insert_err) => {
                // The blob is now a transient orphan; compensate before
                // surfacing the catalog error.
                match self.storage.delete(&object_key).await {
                    Ok(()) | Err(StorageError::NotFound(_)) => {
                        tracing::info!(
                            object_key = %object_key,
                            "Removed blob after catalog insert failure"
                        );
                    }
                    Err(delete_err) => {
                        tracing::warn!(
                            object_key = %object_key,
                            error = %delete_err,
                            "Orphan blob left behind after catalog insert failure, \
                             leaving it to the reconciliation sweep"
                        );
                    }
                }
                return Err(insert_err);
            }
        };

        if let Err(publish_err) = self
            .channel
            .publish(&IngestionEvent::for_record(&record))
            .await
        {
            // Degraded success: the record exists but no processing will
            // trigger until a reconciliation sweep re-publishes it.
            tracing::warn!(
                file_id = %record.id,
                object_key = %record.object_key,
                error = %publish_err,
                "Stored file but failed to publish its ingestion event"
            );
        }

        tracing::info!(
            file_id = %record.id,
            object_key = %record.object_key,
            uploaded_by = %record.uploaded_by,
            size_bytes = record.size,
            "File stored"
        );

        Ok(record)
    }

    pub async fn list(&self) -> Result<Vec<FileRecord>, AppError> {
        self.catalog.list_all().await
    }

    pub async fn get_metadata(&self, id: Uuid) -> Result<FileRecord, AppError> {
        self.catalog
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("file {}", id)))
    }

    /// Look up the record, then open its blob.
    ///
    /// A record whose blob is missing is a `DataInconsistency`, not
    /// `NotFound`: operators must be able to tell "never existed" from
    /// "corrupted".
    #[tracing::instrument(skip(self))]
    pub async fn download(&self, id: Uuid) -> Result<FileDownload, AppError> {
        let record = self.get_metadata(id).await?;

        match self.storage.get(&record.object_key).await {
            Ok(stream) => Ok(FileDownload { record, stream }),
            Err(StorageError::NotFound(_)) => {
                tracing::error!(
                    file_id = %id,
                    object_key = %record.object_key,
                    "Catalog record has no blob"
                );
                Err(AppError::DataInconsistency(format!(
                    "file {} has a catalog record but no blob at {}",
                    id, record.object_key
                )))
            }
            Err(e) => Err(map_storage_err(e)),
        }
    }

    /// Delete the blob first, then the record: the inverse of ingestion
    /// order, so a partial failure leaves a dangling record rather than a
    /// dangling blob.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let record = self.get_metadata(id).await?;

        match self.storage.delete(&record.object_key).await {
            // Blob already gone: proceed to the record
            Ok(()) | Err(StorageError::NotFound(_)) => {}
            Err(e) => {
                tracing::error!(
                    file_id = %id,
                    object_key = %record.object_key,
                    error = %e,
                    "Blob delete failed, retaining catalog record"
                );
                return Err(map_storage_err(e));
            }
        }

        self.catalog.delete_by_id(id).await?;

        tracing::info!(
            file_id = %id,
            object_key = %record.object_key,
            "File deleted"
        );

        Ok(())
    }
}

fn map_storage_err(e: StorageError) -> AppError {
    match e {
        StorageError::InvalidKey(key) => {
            AppError::InvalidInput(format!("invalid object key: {}", key))
        }
        StorageError::NotFound(key) => AppError::NotFound(key),
        other => AppError::StorageUnavailable(other.to_string()),
    }
}
