//! Processing worker and pool tests: idempotence under redelivery,
//! missing-blob no-ops, failure classification, and the end-to-end
//! claim/process/ack loop against the in-memory channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde_json::json;
use tempfile::tempdir;
use uuid::Uuid;

use filedepot_core::models::IngestionEvent;
use filedepot_core::{ProcessError, WorkerConfig};
use filedepot_db::EventChannel;
use filedepot_services::test_support::{FaultInjectingStorage, MemoryChannel};
use filedepot_storage::{ByteStream, LocalStorage, ObjectStorage};
use filedepot_worker::{EventWorkerPool, OperationRegistry, ProcessOperation, ProcessingWorker};

fn event_for(object_key: &str, size: i64) -> IngestionEvent {
    IngestionEvent {
        id: Uuid::new_v4(),
        object_key: object_key.to_string(),
        filename: "f.bin".to_string(),
        content_type: "application/octet-stream".to_string(),
        size,
        uploaded_by: "alice".to_string(),
    }
}

/// Operation writing derived state keyed by the event id (upsert), the
/// pattern required of any state-writing operation under at-least-once
/// delivery.
#[derive(Clone, Default)]
struct RecordingOperation {
    processed: Arc<Mutex<HashMap<Uuid, u64>>>,
}

#[async_trait]
impl ProcessOperation for RecordingOperation {
    fn kind(&self) -> &'static str {
        "record"
    }

    async fn run(
        &self,
        event: &IngestionEvent,
        mut blob: ByteStream,
    ) -> Result<serde_json::Value, ProcessError> {
        let mut bytes_read: u64 = 0;
        while let Some(chunk) = blob.next().await {
            bytes_read += chunk.map_err(|e| ProcessError::recoverable(e))?.len() as u64;
        }

        self.processed.lock().unwrap().insert(event.id, bytes_read);
        Ok(json!({ "bytesRead": bytes_read }))
    }
}

/// Fails recoverably for the first `failures` invocations, then delegates.
struct FlakyOperation {
    failures_remaining: Arc<AtomicUsize>,
    inner: RecordingOperation,
}

#[async_trait]
impl ProcessOperation for FlakyOperation {
    fn kind(&self) -> &'static str {
        "record"
    }

    async fn run(
        &self,
        event: &IngestionEvent,
        blob: ByteStream,
    ) -> Result<serde_json::Value, ProcessError> {
        let failed = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
            .is_ok();
        if failed {
            return Err(ProcessError::recoverable(anyhow::anyhow!(
                "injected transient failure"
            )));
        }
        self.inner.run(event, blob).await
    }
}

struct MalformedContentOperation;

#[async_trait]
impl ProcessOperation for MalformedContentOperation {
    fn kind(&self) -> &'static str {
        "record"
    }

    async fn run(
        &self,
        _event: &IngestionEvent,
        _blob: ByteStream,
    ) -> Result<serde_json::Value, ProcessError> {
        Err(ProcessError::unrecoverable(anyhow::anyhow!(
            "malformed content"
        )))
    }
}

async fn storage_with_blob(key: &str, data: &[u8]) -> (tempfile::TempDir, Arc<LocalStorage>) {
    let dir = tempdir().unwrap();
    let storage = Arc::new(LocalStorage::new(dir.path()).await.unwrap());
    storage
        .put(key, Bytes::copy_from_slice(data), "application/octet-stream")
        .await
        .unwrap();
    (dir, storage)
}

async fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cond()
}

fn test_config(operation: &str) -> WorkerConfig {
    WorkerConfig {
        max_workers: 2,
        poll_interval_ms: 20,
        max_attempts: 5,
        timeout_seconds: 5,
        reap_interval_secs: 0,
        stale_grace_period_secs: 0,
        operation: operation.to_string(),
    }
}

#[tokio::test]
async fn duplicate_delivery_produces_no_duplicate_side_effect() {
    let (_dir, storage) = storage_with_blob("k/dup.bin", b"payload").await;
    let operation = RecordingOperation::default();
    let mut registry = OperationRegistry::new();
    registry.register(Arc::new(operation.clone()));

    let worker = ProcessingWorker::new(storage, registry, "record");
    let event = event_for("k/dup.bin", 7);

    // Simulated redelivery: same event processed twice
    worker.process(&event).await.unwrap();
    worker.process(&event).await.unwrap();

    let processed = operation.processed.lock().unwrap();
    assert_eq!(processed.len(), 1);
    assert_eq!(processed[&event.id], 7);
}

#[tokio::test]
async fn missing_blob_is_acknowledged_as_noop() {
    let dir = tempdir().unwrap();
    let storage = Arc::new(LocalStorage::new(dir.path()).await.unwrap());
    let worker = ProcessingWorker::new(storage, OperationRegistry::with_builtins(), "inspect");

    let summary = worker
        .process(&event_for("k/never-existed.bin", 3))
        .await
        .unwrap();
    assert_eq!(summary["skipped"], true);
}

#[tokio::test]
async fn unknown_operation_kind_is_unrecoverable() {
    let (_dir, storage) = storage_with_blob("k/a.bin", b"abc").await;
    let worker = ProcessingWorker::new(storage, OperationRegistry::with_builtins(), "transcode");

    let err = worker.process(&event_for("k/a.bin", 3)).await.unwrap_err();
    assert!(!err.is_recoverable());
}

#[tokio::test]
async fn transient_storage_failure_is_recoverable() {
    let (_dir, storage) = storage_with_blob("k/a.bin", b"abc").await;
    let flaky = Arc::new(FaultInjectingStorage::new(storage));
    flaky.fail_heads(true);

    let worker = ProcessingWorker::new(flaky, OperationRegistry::with_builtins(), "inspect");

    let err = worker.process(&event_for("k/a.bin", 3)).await.unwrap_err();
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn inspect_reports_size_mismatch() {
    let (_dir, storage) = storage_with_blob("k/short.bin", b"ab").await;
    let worker = ProcessingWorker::new(storage, OperationRegistry::with_builtins(), "inspect");

    // Declared size disagrees with the stored blob
    let summary = worker.process(&event_for("k/short.bin", 99)).await.unwrap();
    assert_eq!(summary["bytesRead"], 2);
    assert_eq!(summary["sizeMatches"], false);
}

#[tokio::test]
async fn pool_drains_published_events() {
    let (_dir, storage) = storage_with_blob("k/one.bin", b"one").await;
    storage
        .put("k/two.bin", Bytes::from_static(b"two!"), "application/octet-stream")
        .await
        .unwrap();
    storage
        .put("k/three.bin", Bytes::from_static(b"three"), "application/octet-stream")
        .await
        .unwrap();

    let operation = RecordingOperation::default();
    let mut registry = OperationRegistry::new();
    registry.register(Arc::new(operation.clone()));
    let worker = Arc::new(ProcessingWorker::new(storage, registry, "record"));

    let channel = MemoryChannel::new();
    channel.publish(&event_for("k/one.bin", 3)).await.unwrap();
    channel.publish(&event_for("k/two.bin", 4)).await.unwrap();
    channel.publish(&event_for("k/three.bin", 5)).await.unwrap();

    let pool = EventWorkerPool::new(
        Arc::new(channel.clone()),
        worker,
        test_config("record"),
        None,
    );

    let drained = wait_until(Duration::from_secs(5), || {
        channel.is_drained() && operation.processed.lock().unwrap().len() == 3
    })
    .await;
    assert!(drained);
    assert!(channel.dead_events().is_empty());

    pool.shutdown().await;
}

#[tokio::test]
async fn pool_retries_recoverable_failures_via_redelivery() {
    let (_dir, storage) = storage_with_blob("k/retry.bin", b"retry").await;

    let inner = RecordingOperation::default();
    let mut registry = OperationRegistry::new();
    registry.register(Arc::new(FlakyOperation {
        failures_remaining: Arc::new(AtomicUsize::new(1)),
        inner: inner.clone(),
    }));
    let worker = Arc::new(ProcessingWorker::new(storage, registry, "record"));

    let channel = MemoryChannel::new();
    let event = event_for("k/retry.bin", 5);
    channel.publish(&event).await.unwrap();

    let pool = EventWorkerPool::new(
        Arc::new(channel.clone()),
        worker,
        test_config("record"),
        None,
    );

    let drained = wait_until(Duration::from_secs(5), || {
        channel.is_drained() && inner.processed.lock().unwrap().contains_key(&event.id)
    })
    .await;
    assert!(drained);
    assert!(channel.dead_events().is_empty());

    pool.shutdown().await;
}

#[tokio::test]
async fn pool_acknowledges_permanent_failures() {
    let (_dir, storage) = storage_with_blob("k/bad.bin", b"bad").await;

    let mut registry = OperationRegistry::new();
    registry.register(Arc::new(MalformedContentOperation));
    let worker = Arc::new(ProcessingWorker::new(storage, registry, "record"));

    let channel = MemoryChannel::new();
    channel.publish(&event_for("k/bad.bin", 3)).await.unwrap();

    let pool = EventWorkerPool::new(
        Arc::new(channel.clone()),
        worker,
        test_config("record"),
        None,
    );

    // Acked despite the failure: not redelivered, not dead-lettered
    let drained = wait_until(Duration::from_secs(5), || channel.is_drained()).await;
    assert!(drained);
    assert!(channel.dead_events().is_empty());

    pool.shutdown().await;
}
