//! Ingestion service integration tests: the upload consistency contract
//! exercised against local storage in a tempdir plus in-memory catalog and
//! channel doubles.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use tempfile::{tempdir, TempDir};
use uuid::Uuid;

use filedepot_core::AppError;
use filedepot_services::test_support::{FaultInjectingStorage, MemoryCatalog, MemoryChannel};
use filedepot_services::IngestionService;
use filedepot_storage::{ByteStream, LocalStorage, ObjectStorage};

struct Fixture {
    service: IngestionService,
    storage: Arc<FaultInjectingStorage>,
    catalog: MemoryCatalog,
    channel: MemoryChannel,
    dir: TempDir,
}

async fn fixture() -> Fixture {
    let dir = tempdir().unwrap();
    let local = Arc::new(LocalStorage::new(dir.path()).await.unwrap());
    let storage = Arc::new(FaultInjectingStorage::new(local));
    let catalog = MemoryCatalog::new();
    let channel = MemoryChannel::new();

    let service = IngestionService::new(
        storage.clone(),
        Arc::new(catalog.clone()),
        Arc::new(channel.clone()),
    );

    Fixture {
        service,
        storage,
        catalog,
        channel,
        dir,
    }
}

async fn collect(mut stream: ByteStream) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk.unwrap());
    }
    out
}

fn count_files(dir: &Path) -> usize {
    let mut count = 0;
    for entry in std::fs::read_dir(dir).unwrap() {
        let entry = entry.unwrap();
        if entry.file_type().unwrap().is_dir() {
            count += count_files(&entry.path());
        } else {
            count += 1;
        }
    }
    count
}

#[tokio::test]
async fn store_then_download_round_trips() {
    let fx = fixture().await;
    fx.service.ensure_ready().await.unwrap();

    let record = fx
        .service
        .store(
            Bytes::from_static(b"0123456789"),
            "report.pdf",
            Some("application/pdf"),
            "alice",
        )
        .await
        .unwrap();

    assert_eq!(record.size, 10);
    assert_eq!(record.content_type, "application/pdf");
    assert_eq!(record.uploaded_by, "alice");
    assert_eq!(record.original_filename, "report.pdf");
    assert!(record.object_key.ends_with("/report.pdf"));

    let download = fx.service.download(record.id).await.unwrap();
    assert_eq!(download.record, record);
    assert_eq!(collect(download.stream).await, b"0123456789");

    // The matching ingestion event is observable on the channel
    let events = fx.channel.pending_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, record.id);
    assert_eq!(events[0].object_key, record.object_key);
    assert_eq!(events[0].filename, "report.pdf");
    assert_eq!(events[0].size, 10);
    assert_eq!(events[0].uploaded_by, "alice");
}

#[tokio::test]
async fn missing_content_type_defaults_to_octet_stream() {
    let fx = fixture().await;

    let record = fx
        .service
        .store(Bytes::from_static(b"x"), "data", None, "bob")
        .await
        .unwrap();
    assert_eq!(record.content_type, "application/octet-stream");

    let record = fx
        .service
        .store(Bytes::from_static(b"x"), "data", Some("  "), "bob")
        .await
        .unwrap();
    assert_eq!(record.content_type, "application/octet-stream");
}

#[tokio::test]
async fn empty_payload_is_invalid_input() {
    let fx = fixture().await;

    let result = fx
        .service
        .store(Bytes::new(), "empty.bin", Some("text/plain"), "alice")
        .await;

    assert!(matches!(result, Err(AppError::InvalidInput(_))));
    assert!(fx.service.list().await.unwrap().is_empty());
    assert!(fx.channel.pending_events().is_empty());
}

#[tokio::test]
async fn unknown_id_is_not_found_everywhere() {
    let fx = fixture().await;
    let id = Uuid::new_v4();

    assert!(matches!(
        fx.service.get_metadata(id).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        fx.service.download(id).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        fx.service.delete(id).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn concurrent_uploads_of_one_name_get_distinct_keys() {
    let fx = fixture().await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = fx.service.clone();
        handles.push(tokio::spawn(async move {
            service
                .store(
                    Bytes::from_static(b"same content"),
                    "shared-name.bin",
                    Some("application/octet-stream"),
                    "alice",
                )
                .await
                .unwrap()
        }));
    }

    let mut ids = std::collections::HashSet::new();
    let mut keys = std::collections::HashSet::new();
    for handle in handles {
        let record = handle.await.unwrap();
        ids.insert(record.id);
        keys.insert(record.object_key);
    }

    assert_eq!(ids.len(), 8);
    assert_eq!(keys.len(), 8);
    assert_eq!(fx.service.list().await.unwrap().len(), 8);
}

#[tokio::test]
async fn delete_removes_blob_and_record() {
    let fx = fixture().await;

    let record = fx
        .service
        .store(Bytes::from_static(b"bye"), "gone.txt", Some("text/plain"), "alice")
        .await
        .unwrap();

    fx.service.delete(record.id).await.unwrap();

    assert!(matches!(
        fx.service.download(record.id).await,
        Err(AppError::NotFound(_))
    ));
    // Second delete observes NotFound: idempotent from the caller's view
    assert!(matches!(
        fx.service.delete(record.id).await,
        Err(AppError::NotFound(_))
    ));
    assert_eq!(count_files(fx.dir.path()), 0);
}

#[tokio::test]
async fn storage_outage_fails_upload_with_no_partial_state() {
    let fx = fixture().await;
    fx.storage.fail_puts(true);

    let result = fx
        .service
        .store(Bytes::from_static(b"data"), "a.bin", None, "alice")
        .await;

    assert!(matches!(result, Err(AppError::StorageUnavailable(_))));
    assert!(fx.service.list().await.unwrap().is_empty());
    assert!(fx.channel.pending_events().is_empty());
}

#[tokio::test]
async fn catalog_failure_compensates_by_deleting_the_blob() {
    let fx = fixture().await;
    fx.catalog.fail_next_insert();

    let result = fx
        .service
        .store(Bytes::from_static(b"data"), "a.bin", None, "alice")
        .await;

    assert!(matches!(result, Err(AppError::CatalogUnavailable(_))));
    // The just-written blob was compensated away; nothing is visible
    assert_eq!(count_files(fx.dir.path()), 0);
    assert!(fx.service.list().await.unwrap().is_empty());
    assert!(fx.channel.pending_events().is_empty());
}

#[tokio::test]
async fn catalog_failure_with_failed_compensation_logs_orphan() {
    let fx = fixture().await;
    fx.catalog.fail_next_insert();
    fx.storage.fail_deletes(true);

    let result = fx
        .service
        .store(Bytes::from_static(b"data"), "a.bin", None, "alice")
        .await;

    // The catalog error still surfaces; the orphan blob stays for the sweep
    assert!(matches!(result, Err(AppError::CatalogUnavailable(_))));
    assert_eq!(count_files(fx.dir.path()), 1);
    assert!(fx.service.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn publish_failure_is_degraded_success() {
    let fx = fixture().await;
    fx.channel.fail_publishes(true);

    let record = fx
        .service
        .store(Bytes::from_static(b"data"), "a.bin", None, "alice")
        .await
        .unwrap();

    // Record stored and downloadable, but no event was published
    assert_eq!(fx.service.list().await.unwrap().len(), 1);
    assert!(fx.channel.pending_events().is_empty());
    let download = fx.service.download(record.id).await.unwrap();
    assert_eq!(collect(download.stream).await, b"data");
}

#[tokio::test]
async fn blob_delete_failure_retains_the_record() {
    let fx = fixture().await;

    let record = fx
        .service
        .store(Bytes::from_static(b"keep"), "k.bin", None, "alice")
        .await
        .unwrap();

    fx.storage.fail_deletes(true);
    let result = fx.service.delete(record.id).await;
    assert!(matches!(result, Err(AppError::StorageUnavailable(_))));

    // Record retained: the delete can be retried once storage recovers
    assert!(fx.service.get_metadata(record.id).await.is_ok());

    fx.storage.fail_deletes(false);
    fx.service.delete(record.id).await.unwrap();
    assert!(fx.service.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn record_without_blob_is_data_inconsistency() {
    let fx = fixture().await;

    let record = fx
        .service
        .store(Bytes::from_static(b"data"), "a.bin", None, "alice")
        .await
        .unwrap();

    // Remove the blob behind the catalog's back
    fx.storage.delete(&record.object_key).await.unwrap();

    let result = fx.service.download(record.id).await;
    assert!(matches!(result, Err(AppError::DataInconsistency(_))));
}
