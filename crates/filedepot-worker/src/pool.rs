//! Event worker pool: claiming, bounded concurrency, retry, and shutdown.
//!
//! Shutdown: [`EventWorkerPool::shutdown`] signals the pool to stop
//! claiming; it does not wait for in-flight messages. For graceful
//! shutdown, coordinate with your runtime and allow time for running
//! messages to finish before process exit.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;

use filedepot_core::models::EventDelivery;
use filedepot_core::WorkerConfig;
use filedepot_db::{EventChannel, EVENT_NOTIFY_CHANNEL};

use crate::worker::ProcessingWorker;

/// Maximum delay in seconds before a nacked message becomes deliverable
/// again. Caps exponential backoff so that high attempt counts do not
/// produce excessively long delays.
pub const MAX_RETRY_BACKOFF_SECS: u64 = 300;

/// Computes backoff in seconds for a given delivery attempt (exponential with cap).
#[inline]
pub(crate) fn compute_retry_backoff_seconds(attempt: i32) -> u64 {
    2_u64
        .saturating_pow(attempt.max(0) as u32)
        .min(MAX_RETRY_BACKOFF_SECS)
}

/// Competing-consumers worker pool over an [`EventChannel`].
///
/// Claims messages up to `max_workers` concurrently, each with its own
/// timeout. Recoverable failures are nacked with exponential backoff (the
/// channel dead-letters past its attempt budget); unrecoverable failures
/// are acknowledged and reported.
#[derive(Clone)]
pub struct EventWorkerPool {
    shutdown_tx: mpsc::Sender<()>,
}

impl EventWorkerPool {
    /// Create a pool and spawn its claim loop.
    ///
    /// If `pg_pool` is `Some`, the loop uses PostgreSQL LISTEN/NOTIFY to
    /// wake immediately when events are published, in addition to polling
    /// at `poll_interval_ms`. If `None`, only polling is used.
    pub fn new(
        channel: Arc<dyn EventChannel>,
        worker: Arc<ProcessingWorker>,
        config: WorkerConfig,
        pg_pool: Option<sqlx::PgPool>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        tokio::spawn(Self::pool_loop(channel, worker, config, shutdown_rx, pg_pool));

        Self { shutdown_tx }
    }

    async fn pool_loop(
        channel: Arc<dyn EventChannel>,
        worker: Arc<ProcessingWorker>,
        config: WorkerConfig,
        mut shutdown_rx: mpsc::Receiver<()>,
        pg_pool: Option<sqlx::PgPool>,
    ) {
        let use_listen = pg_pool.is_some();
        tracing::info!(
            max_workers = config.max_workers,
            poll_interval_ms = config.poll_interval_ms,
            listen_notify = use_listen,
            operation = %config.operation,
            "Event worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(config.max_workers));
        let poll_interval = Duration::from_millis(config.poll_interval_ms);
        let timeout = Duration::from_secs(config.timeout_seconds);

        // Channel to wake the main loop when LISTEN receives a NOTIFY.
        let (notify_tx, mut notify_rx) = mpsc::channel::<()>(16);
        if let Some(pool) = pg_pool {
            let tx = notify_tx.clone();
            tokio::spawn(async move {
                loop {
                    match sqlx::postgres::PgListener::connect_with(&pool).await {
                        Ok(mut listener) => {
                            if let Err(e) = listener.listen(EVENT_NOTIFY_CHANNEL).await {
                                tracing::warn!(error = %e, "LISTEN failed, will retry");
                                tokio::time::sleep(Duration::from_secs(5)).await;
                                continue;
                            }
                            while listener.recv().await.is_ok() {
                                let _ = tx.send(()).await;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "PgListener connect failed, will retry");
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            });
        }

        // Spawn the stale-delivery reaper (if interval > 0): a consumer
        // that died mid-message must not strand its delivery in flight.
        let (reaper_shutdown_tx, mut reaper_shutdown_rx) = mpsc::channel::<()>(1);
        if config.reap_interval_secs > 0 {
            let channel_for_reaper = channel.clone();
            let reap_interval = Duration::from_secs(config.reap_interval_secs);
            let stale_after =
                Duration::from_secs(config.timeout_seconds + config.stale_grace_period_secs);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(reap_interval);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            if let Err(e) = channel_for_reaper.reap_stale(stale_after).await {
                                tracing::error!(error = %e, "Stale delivery reaper failed");
                            }
                        }
                        _ = reaper_shutdown_rx.recv() => break,
                    }
                }
            });
        }

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Event worker pool shutting down");
                    let _ = reaper_shutdown_tx.send(()).await;
                    break;
                }
                _ = notify_rx.recv() => {
                    Self::claim_and_dispatch_one(&channel, &worker, &semaphore, timeout).await;
                }
                _ = sleep(poll_interval) => {
                    Self::claim_and_dispatch_one(&channel, &worker, &semaphore, timeout).await;
                }
            }
        }

        tracing::info!("Event worker pool stopped");
    }

    async fn claim_and_dispatch_one(
        channel: &Arc<dyn EventChannel>,
        worker: &Arc<ProcessingWorker>,
        semaphore: &Arc<Semaphore>,
        timeout: Duration,
    ) {
        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!("No workers available, skipping claim");
                return;
            }
        };

        match channel.claim().await {
            Ok(Some(delivery)) => {
                let channel = channel.clone();
                let worker = worker.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    Self::handle_delivery(channel, worker, delivery, timeout).await;
                });
            }
            Ok(None) => {
                drop(permit);
                tracing::trace!("No events available in queue");
            }
            Err(e) => {
                drop(permit);
                tracing::error!(error = %e, "Failed to claim event from channel");
            }
        }
    }

    #[tracing::instrument(skip(channel, worker, delivery), fields(delivery_id = %delivery.delivery_id, file_id = %delivery.event.id, attempt = delivery.attempt))]
    async fn handle_delivery(
        channel: Arc<dyn EventChannel>,
        worker: Arc<ProcessingWorker>,
        delivery: EventDelivery,
        timeout: Duration,
    ) {
        let result = tokio::time::timeout(timeout, worker.process(&delivery.event)).await;

        match result {
            Ok(Ok(summary)) => {
                if let Err(e) = channel.ack(delivery.delivery_id).await {
                    tracing::error!(error = %e, "Failed to ack processed event");
                    return;
                }
                tracing::info!(summary = %summary, "Event processed");
            }
            Ok(Err(e)) if e.is_recoverable() => {
                let backoff_seconds = compute_retry_backoff_seconds(delivery.attempt);
                tracing::warn!(
                    error = %e,
                    backoff_seconds = backoff_seconds,
                    "Event processing failed, returning to queue"
                );
                if let Err(nack_err) = channel
                    .nack(delivery.delivery_id, Duration::from_secs(backoff_seconds))
                    .await
                {
                    tracing::error!(error = %nack_err, "Failed to nack event");
                }
            }
            Ok(Err(e)) => {
                // Redelivering a permanently-failing message would loop
                // forever; acknowledge and report it instead.
                tracing::error!(
                    error = %e,
                    "Permanent processing failure, acknowledging event"
                );
                if let Err(ack_err) = channel.ack(delivery.delivery_id).await {
                    tracing::error!(error = %ack_err, "Failed to ack permanently failed event");
                }
            }
            Err(_) => {
                let backoff_seconds = compute_retry_backoff_seconds(delivery.attempt);
                tracing::warn!(
                    timeout_secs = timeout.as_secs(),
                    backoff_seconds = backoff_seconds,
                    "Event processing timed out, returning to queue"
                );
                if let Err(nack_err) = channel
                    .nack(delivery.delivery_id, Duration::from_secs(backoff_seconds))
                    .await
                {
                    tracing::error!(error = %nack_err, "Failed to nack timed-out event");
                }
            }
        }
    }

    /// Signals the pool to stop claiming new events and exit the main loop.
    ///
    /// Returns immediately after sending the signal; already-spawned
    /// message handlers continue running until they complete or time out.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating event worker pool shutdown");
        let _ = self.shutdown_tx.send(()).await;
    }
}
