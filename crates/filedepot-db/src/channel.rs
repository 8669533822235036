//! Event Channel
//!
//! Durable, at-least-once queue carrying ingestion events to competing
//! consumers. The Postgres implementation claims rows with
//! `FOR UPDATE SKIP LOCKED`, so each message is in flight with at most one
//! consumer per delivery attempt, and wakes pollers through LISTEN/NOTIFY.

use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use filedepot_core::models::{EventDelivery, IngestionEvent};

/// Channel name for PostgreSQL LISTEN/NOTIFY when an event is published.
pub const EVENT_NOTIFY_CHANNEL: &str = "filedepot_new_event";

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed event payload: {0}")]
    Payload(String),
}

impl From<sqlx::Error> for ChannelError {
    fn from(err: sqlx::Error) -> Self {
        ChannelError::Unavailable(err.to_string())
    }
}

/// Event Channel contract.
///
/// `publish` reports failure synchronously and never rolls back prior
/// writes. Delivery is at-least-once: a claimed message returns to the
/// queue on `nack` (or via the stale reaper when a consumer dies), so
/// handlers must tolerate duplicates. Ordering across messages is not
/// guaranteed.
#[async_trait]
pub trait EventChannel: Send + Sync {
    async fn publish(&self, event: &IngestionEvent) -> Result<(), ChannelError>;

    /// Hand the next available message to this consumer, or None.
    async fn claim(&self) -> Result<Option<EventDelivery>, ChannelError>;

    /// Permanently remove a delivered message.
    async fn ack(&self, delivery_id: Uuid) -> Result<(), ChannelError>;

    /// Make a delivered message re-deliverable after `retry_in`. The
    /// channel dead-letters messages that have exhausted their attempt
    /// budget instead of redelivering them forever.
    async fn nack(&self, delivery_id: Uuid, retry_in: Duration) -> Result<(), ChannelError>;

    /// Return in-flight deliveries older than `older_than` to the queue
    /// (crashed-consumer recovery). Backends without in-flight state may
    /// keep the default no-op.
    async fn reap_stale(&self, older_than: Duration) -> Result<u64, ChannelError> {
        let _ = older_than;
        Ok(0)
    }
}

/// Postgres-backed event channel. Several logical queues share the
/// `ingestion_events` table, keyed by queue name.
#[derive(Clone)]
pub struct PgEventChannel {
    pool: PgPool,
    queue: String,
    max_attempts: i32,
}

impl PgEventChannel {
    pub fn new(pool: PgPool, queue: impl Into<String>, max_attempts: i32) -> Self {
        Self {
            pool,
            queue: queue.into(),
            max_attempts,
        }
    }

    /// Return dead-lettered messages to the queue with a fresh attempt
    /// budget. Out-of-band inspection hook, not part of the channel
    /// contract.
    pub async fn requeue_dead(&self) -> Result<u64, ChannelError> {
        let result = sqlx::query(
            r#"
            UPDATE ingestion_events
            SET status = 'pending', attempts = 0, available_at = now(), claimed_at = NULL
            WHERE queue = $1 AND status = 'dead'
            "#,
        )
        .bind(&self.queue)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl EventChannel for PgEventChannel {
    #[tracing::instrument(skip(self, event), fields(file_id = %event.id, queue = %self.queue))]
    async fn publish(&self, event: &IngestionEvent) -> Result<(), ChannelError> {
        let payload = serde_json::to_value(event)
            .map_err(|e| ChannelError::Payload(e.to_string()))?;

        // Insert and notify in one transaction so workers wake for a row
        // that is actually visible.
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO ingestion_events (queue, payload, status, available_at)
            VALUES ($1, $2, 'pending', now())
            "#,
        )
        .bind(&self.queue)
        .bind(&payload)
        .execute(&mut *tx)
        .await?;

        // Notify is non-fatal: workers fall back to polling.
        if let Err(e) = sqlx::query("SELECT pg_notify($1, '')")
            .bind(EVENT_NOTIFY_CHANNEL)
            .execute(&mut *tx)
            .await
        {
            tracing::warn!(
                error = %e,
                file_id = %event.id,
                "Failed to notify workers of new event, they will discover it via polling"
            );
        }

        tx.commit().await?;

        tracing::info!(
            file_id = %event.id,
            object_key = %event.object_key,
            queue = %self.queue,
            "Ingestion event published"
        );

        Ok(())
    }

    async fn claim(&self) -> Result<Option<EventDelivery>, ChannelError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(Uuid, serde_json::Value)> = sqlx::query_as(
            r#"
            SELECT id, payload
            FROM ingestion_events
            WHERE queue = $1 AND status = 'pending' AND available_at <= now()
            ORDER BY available_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(&self.queue)
        .fetch_optional(&mut *tx)
        .await?;

        let (id, payload) = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let attempt: i32 = sqlx::query_scalar(
            r#"
            UPDATE ingestion_events
            SET status = 'inflight', attempts = attempts + 1, claimed_at = now()
            WHERE id = $1
            RETURNING attempts
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        let event = match serde_json::from_value::<IngestionEvent>(payload) {
            Ok(event) => event,
            Err(e) => {
                // A payload that cannot decode will never process; park it.
                sqlx::query("UPDATE ingestion_events SET status = 'dead' WHERE id = $1")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
                tracing::error!(delivery_id = %id, error = %e, "Dead-lettered undecodable event payload");
                return Err(ChannelError::Payload(e.to_string()));
            }
        };

        tx.commit().await?;

        Ok(Some(EventDelivery {
            delivery_id: id,
            attempt,
            event,
        }))
    }

    async fn ack(&self, delivery_id: Uuid) -> Result<(), ChannelError> {
        sqlx::query("DELETE FROM ingestion_events WHERE id = $1")
            .bind(delivery_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn nack(&self, delivery_id: Uuid, retry_in: Duration) -> Result<(), ChannelError> {
        let status: Option<String> = sqlx::query_scalar(
            r#"
            UPDATE ingestion_events
            SET status = CASE WHEN attempts >= $2 THEN 'dead' ELSE 'pending' END,
                available_at = now() + ($3::bigint * interval '1 millisecond'),
                claimed_at = NULL
            WHERE id = $1
            RETURNING status
            "#,
        )
        .bind(delivery_id)
        .bind(self.max_attempts)
        .bind(retry_in.as_millis() as i64)
        .fetch_optional(&self.pool)
        .await?;

        match status.as_deref() {
            Some("dead") => {
                tracing::error!(
                    delivery_id = %delivery_id,
                    max_attempts = self.max_attempts,
                    "Event exhausted its redelivery budget, dead-lettered"
                );
            }
            Some(_) => {
                tracing::debug!(
                    delivery_id = %delivery_id,
                    retry_in_ms = retry_in.as_millis() as u64,
                    "Event returned to queue for redelivery"
                );
            }
            // Already acked or requeued elsewhere; nack is idempotent.
            None => {}
        }

        Ok(())
    }

    async fn reap_stale(&self, older_than: Duration) -> Result<u64, ChannelError> {
        let result = sqlx::query(
            r#"
            UPDATE ingestion_events
            SET status = 'pending', claimed_at = NULL
            WHERE queue = $1 AND status = 'inflight'
              AND claimed_at < now() - ($2::bigint * interval '1 second')
            "#,
        )
        .bind(&self.queue)
        .bind(older_than.as_secs() as i64)
        .execute(&self.pool)
        .await?;

        let reaped = result.rows_affected();
        if reaped > 0 {
            tracing::warn!(
                queue = %self.queue,
                reaped = reaped,
                "Returned stale in-flight events to the queue"
            );
        }

        Ok(reaped)
    }
}
