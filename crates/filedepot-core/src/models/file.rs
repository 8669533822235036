use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog row describing an uploaded blob.
///
/// `object_key` is the opaque address of the blob in the object store;
/// once persisted it is immutable and unique. The record is created
/// together with a successful blob write and destroyed only by an explicit
/// delete that removes both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct FileRecord {
    pub id: Uuid,
    pub original_filename: String,
    pub object_key: String,
    pub content_type: String,
    pub size: i64,
    pub uploaded_by: String,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for the catalog; `id` and `created_at` are assigned by
/// the catalog on insert.
#[derive(Debug, Clone)]
pub struct NewFileRecord {
    pub original_filename: String,
    pub object_key: String,
    pub content_type: String,
    pub size: i64,
    pub uploaded_by: String,
}
