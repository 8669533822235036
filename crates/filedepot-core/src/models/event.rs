use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::FileRecord;

/// Message announcing that a FileRecord/blob pair is ready for processing.
///
/// Produced exactly once per successful ingestion; delivered at-least-once,
/// so consumers must be idempotent or de-duplicate by `id`. Field names are
/// camelCase on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionEvent {
    pub id: Uuid,
    pub object_key: String,
    pub filename: String,
    pub content_type: String,
    pub size: i64,
    pub uploaded_by: String,
}

impl IngestionEvent {
    pub fn for_record(record: &FileRecord) -> Self {
        Self {
            id: record.id,
            object_key: record.object_key.clone(),
            filename: record.original_filename.clone(),
            content_type: record.content_type.clone(),
            size: record.size,
            uploaded_by: record.uploaded_by.clone(),
        }
    }
}

/// One delivery attempt of one message, as handed to a consumer.
///
/// `delivery_id` identifies the queued message for `ack`/`nack`; `attempt`
/// is 1-based and increments on every redelivery.
#[derive(Debug, Clone)]
pub struct EventDelivery {
    pub delivery_id: Uuid,
    pub attempt: i32,
    pub event: IngestionEvent,
}
