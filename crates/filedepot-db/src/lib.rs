//! Filedepot database layer
//!
//! The Metadata Catalog (`FileCatalog` trait, Postgres implementation) and
//! the Event Channel (`EventChannel` trait, Postgres-backed durable queue
//! with at-least-once delivery). Neither participates in a transaction
//! spanning the object store; see DESIGN.md for the consistency contract.

pub mod catalog;
pub mod channel;

pub use catalog::{FileCatalog, PgFileCatalog};
pub use channel::{ChannelError, EventChannel, PgEventChannel, EVENT_NOTIFY_CHANNEL};

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

/// Connect a Postgres pool with the configured limits.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await
}

/// Apply the schema migrations for the catalog and the event queue.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
