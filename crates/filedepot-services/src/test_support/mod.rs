//! In-memory test doubles
//!
//! These implement the real catalog/channel/storage traits without
//! Postgres or an object store, with switches for injecting the failures
//! the consistency contract is specified against. Used by this crate's
//! tests and by downstream crates' tests.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use filedepot_core::models::{EventDelivery, FileRecord, IngestionEvent, NewFileRecord};
use filedepot_core::{AppError, StorageBackend};
use filedepot_db::{ChannelError, EventChannel, FileCatalog};
use filedepot_storage::{BlobInfo, ByteStream, ObjectStorage, StorageError, StorageResult};

/// In-memory metadata catalog
#[derive(Clone, Default)]
pub struct MemoryCatalog {
    files: Arc<Mutex<Vec<FileRecord>>>,
    fail_next_insert: Arc<AtomicBool>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next insert fail with `CatalogUnavailable`.
    pub fn fail_next_insert(&self) {
        self.fail_next_insert.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl FileCatalog for MemoryCatalog {
    async fn insert(&self, new: NewFileRecord) -> Result<FileRecord, AppError> {
        if self.fail_next_insert.swap(false, Ordering::SeqCst) {
            return Err(AppError::CatalogUnavailable(
                "injected insert failure".to_string(),
            ));
        }

        let record = FileRecord {
            id: Uuid::new_v4(),
            original_filename: new.original_filename,
            object_key: new.object_key,
            content_type: new.content_type,
            size: new.size,
            uploaded_by: new.uploaded_by,
            created_at: Utc::now(),
        };

        self.files.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<FileRecord>, AppError> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn find_by_object_key(&self, key: &str) -> Result<Option<FileRecord>, AppError> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.object_key == key)
            .cloned())
    }

    async fn list_all(&self) -> Result<Vec<FileRecord>, AppError> {
        Ok(self.files.lock().unwrap().clone())
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<bool, AppError> {
        let mut files = self.files.lock().unwrap();
        let before = files.len();
        files.retain(|r| r.id != id);
        Ok(files.len() < before)
    }
}

struct QueuedMessage {
    id: Uuid,
    attempts: i32,
    event: IngestionEvent,
}

#[derive(Default)]
struct ChannelState {
    pending: VecDeque<QueuedMessage>,
    inflight: HashMap<Uuid, QueuedMessage>,
    dead: Vec<QueuedMessage>,
}

/// In-memory event channel with at-least-once semantics.
///
/// `nack` requeues immediately (the retry delay is ignored) so tests can
/// drive redelivery without sleeping.
#[derive(Clone)]
pub struct MemoryChannel {
    state: Arc<Mutex<ChannelState>>,
    fail_publishes: Arc<AtomicBool>,
    max_attempts: i32,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::with_max_attempts(5)
    }

    pub fn with_max_attempts(max_attempts: i32) -> Self {
        Self {
            state: Arc::new(Mutex::new(ChannelState::default())),
            fail_publishes: Arc::new(AtomicBool::new(false)),
            max_attempts,
        }
    }

    pub fn fail_publishes(&self, on: bool) {
        self.fail_publishes.store(on, Ordering::SeqCst);
    }

    /// Events currently waiting for a consumer.
    pub fn pending_events(&self) -> Vec<IngestionEvent> {
        self.state
            .lock()
            .unwrap()
            .pending
            .iter()
            .map(|m| m.event.clone())
            .collect()
    }

    pub fn dead_events(&self) -> Vec<IngestionEvent> {
        self.state
            .lock()
            .unwrap()
            .dead
            .iter()
            .map(|m| m.event.clone())
            .collect()
    }

    pub fn is_drained(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.pending.is_empty() && state.inflight.is_empty()
    }
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventChannel for MemoryChannel {
    async fn publish(&self, event: &IngestionEvent) -> Result<(), ChannelError> {
        if self.fail_publishes.load(Ordering::SeqCst) {
            return Err(ChannelError::Unavailable(
                "injected publish failure".to_string(),
            ));
        }

        self.state.lock().unwrap().pending.push_back(QueuedMessage {
            id: Uuid::new_v4(),
            attempts: 0,
            event: event.clone(),
        });
        Ok(())
    }

    async fn claim(&self) -> Result<Option<EventDelivery>, ChannelError> {
        let mut state = self.state.lock().unwrap();
        let Some(mut message) = state.pending.pop_front() else {
            return Ok(None);
        };

        message.attempts += 1;
        let delivery = EventDelivery {
            delivery_id: message.id,
            attempt: message.attempts,
            event: message.event.clone(),
        };
        state.inflight.insert(message.id, message);

        Ok(Some(delivery))
    }

    async fn ack(&self, delivery_id: Uuid) -> Result<(), ChannelError> {
        self.state.lock().unwrap().inflight.remove(&delivery_id);
        Ok(())
    }

    async fn nack(&self, delivery_id: Uuid, _retry_in: Duration) -> Result<(), ChannelError> {
        let mut state = self.state.lock().unwrap();
        let Some(message) = state.inflight.remove(&delivery_id) else {
            return Ok(());
        };

        if message.attempts >= self.max_attempts {
            state.dead.push(message);
        } else {
            state.pending.push_back(message);
        }
        Ok(())
    }
}

/// Object storage wrapper with per-operation failure switches.
///
/// A raised switch makes that operation fail with
/// `StorageError::Unavailable` instead of delegating.
pub struct FaultInjectingStorage {
    inner: Arc<dyn ObjectStorage>,
    fail_puts: AtomicBool,
    fail_gets: AtomicBool,
    fail_heads: AtomicBool,
    fail_deletes: AtomicBool,
}

impl FaultInjectingStorage {
    pub fn new(inner: Arc<dyn ObjectStorage>) -> Self {
        Self {
            inner,
            fail_puts: AtomicBool::new(false),
            fail_gets: AtomicBool::new(false),
            fail_heads: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }

    pub fn fail_puts(&self, on: bool) {
        self.fail_puts.store(on, Ordering::SeqCst);
    }

    pub fn fail_gets(&self, on: bool) {
        self.fail_gets.store(on, Ordering::SeqCst);
    }

    pub fn fail_heads(&self, on: bool) {
        self.fail_heads.store(on, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, on: bool) {
        self.fail_deletes.store(on, Ordering::SeqCst);
    }

    fn outage() -> StorageError {
        StorageError::Unavailable("injected storage outage".to_string())
    }
}

#[async_trait]
impl ObjectStorage for FaultInjectingStorage {
    async fn ensure_container(&self) -> StorageResult<()> {
        self.inner.ensure_container().await
    }

    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(Self::outage());
        }
        self.inner.put(key, data, content_type).await
    }

    async fn get(&self, key: &str) -> StorageResult<ByteStream> {
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(Self::outage());
        }
        self.inner.get(key).await
    }

    async fn head(&self, key: &str) -> StorageResult<BlobInfo> {
        if self.fail_heads.load(Ordering::SeqCst) {
            return Err(Self::outage());
        }
        self.inner.head(key).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Self::outage());
        }
        self.inner.delete(key).await
    }

    async fn list_keys(&self) -> StorageResult<Vec<String>> {
        self.inner.list_keys().await
    }

    fn backend_type(&self) -> StorageBackend {
        self.inner.backend_type()
    }
}
