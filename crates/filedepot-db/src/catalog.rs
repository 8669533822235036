//! Metadata Catalog
//!
//! Relational store of file records. Every write is atomic at the
//! single-row level; no transaction spans the catalog and the object store
//! or the event channel.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use filedepot_core::models::{FileRecord, NewFileRecord};
use filedepot_core::AppError;

/// Metadata Catalog contract.
///
/// Implemented by [`PgFileCatalog`] for Postgres and by in-memory doubles
/// for tests.
#[async_trait]
pub trait FileCatalog: Send + Sync {
    /// Insert a record; the catalog assigns `id` and `created_at`.
    async fn insert(&self, new: NewFileRecord) -> Result<FileRecord, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<FileRecord>, AppError>;

    async fn find_by_object_key(&self, key: &str) -> Result<Option<FileRecord>, AppError>;

    /// All records, oldest first. Also the reconciliation-sweep hook.
    async fn list_all(&self) -> Result<Vec<FileRecord>, AppError>;

    /// Returns false when the id is unknown.
    async fn delete_by_id(&self, id: Uuid) -> Result<bool, AppError>;
}

const FILE_COLUMNS: &str =
    "id, original_filename, object_key, content_type, size, uploaded_by, created_at";

#[derive(Clone)]
pub struct PgFileCatalog {
    pool: PgPool,
}

impl PgFileCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FileCatalog for PgFileCatalog {
    #[tracing::instrument(skip(self, new), fields(object_key = %new.object_key))]
    async fn insert(&self, new: NewFileRecord) -> Result<FileRecord, AppError> {
        let record: FileRecord = sqlx::query_as::<Postgres, FileRecord>(&format!(
            r#"
            INSERT INTO files (original_filename, object_key, content_type, size, uploaded_by)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {FILE_COLUMNS}
            "#
        ))
        .bind(&new.original_filename)
        .bind(&new.object_key)
        .bind(&new.content_type)
        .bind(new.size)
        .bind(&new.uploaded_by)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, object_key = %new.object_key, "Failed to insert file record");
            AppError::from(e)
        })?;

        tracing::info!(
            file_id = %record.id,
            object_key = %record.object_key,
            size_bytes = record.size,
            "File record created"
        );

        Ok(record)
    }

    #[tracing::instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> Result<Option<FileRecord>, AppError> {
        let record = sqlx::query_as::<Postgres, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    #[tracing::instrument(skip(self))]
    async fn find_by_object_key(&self, key: &str) -> Result<Option<FileRecord>, AppError> {
        let record = sqlx::query_as::<Postgres, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE object_key = $1"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    #[tracing::instrument(skip(self))]
    async fn list_all(&self) -> Result<Vec<FileRecord>, AppError> {
        let records = sqlx::query_as::<Postgres, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_by_id(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM files WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            tracing::info!(file_id = %id, "File record deleted");
        }

        Ok(deleted)
    }
}
