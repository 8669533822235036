//! Configuration module
//!
//! Environment-driven configuration for the ingestion service and the
//! processing worker. Transport and process bootstrapping live outside this
//! workspace; this is the wiring those layers read.

use std::env;

use crate::storage_types::StorageBackend;

const DB_MAX_CONNECTIONS: u32 = 20;
const WORKER_MAX_WORKERS: usize = 4;
const WORKER_POLL_INTERVAL_MS: u64 = 1000;
const WORKER_MAX_ATTEMPTS: i32 = 5;
const WORKER_TIMEOUT_SECS: u64 = 600;
const WORKER_REAP_INTERVAL_SECS: u64 = 60;
const WORKER_STALE_GRACE_PERIOD_SECS: u64 = 300;
const DEFAULT_EVENT_QUEUE: &str = "file.ingestion";
const DEFAULT_OPERATION: &str = "inspect";

/// Worker pool configuration
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub max_workers: usize,
    pub poll_interval_ms: u64,
    /// Channel-level redelivery budget; messages beyond it are dead-lettered.
    pub max_attempts: i32,
    pub timeout_seconds: u64,
    /// Interval between runs of the stale-delivery reaper. 0 = disabled.
    pub reap_interval_secs: u64,
    /// Grace period added to the message timeout before an in-flight
    /// delivery is considered stale.
    pub stale_grace_period_secs: u64,
    /// Kind of the configured processing operation.
    pub operation: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_workers: WORKER_MAX_WORKERS,
            poll_interval_ms: WORKER_POLL_INTERVAL_MS,
            max_attempts: WORKER_MAX_ATTEMPTS,
            timeout_seconds: WORKER_TIMEOUT_SECS,
            reap_interval_secs: WORKER_REAP_INTERVAL_SECS,
            stale_grace_period_secs: WORKER_STALE_GRACE_PERIOD_SECS,
            operation: DEFAULT_OPERATION.to_string(),
        }
    }
}

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub storage_backend: Option<StorageBackend>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    /// Custom endpoint for S3-compatible providers (MinIO, Spaces, ...)
    pub s3_endpoint: Option<String>,
    pub local_storage_path: Option<String>,
    /// Logical queue name events are published to and consumed from.
    pub event_queue: String,
    pub worker: WorkerConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

        let storage_backend = env::var("STORAGE_BACKEND")
            .ok()
            .map(|s| s.parse::<StorageBackend>())
            .transpose()?;

        let worker = WorkerConfig {
            max_workers: env::var("WORKER_MAX_WORKERS")
                .unwrap_or_else(|_| WORKER_MAX_WORKERS.to_string())
                .parse()
                .unwrap_or(WORKER_MAX_WORKERS),
            poll_interval_ms: env::var("WORKER_POLL_INTERVAL_MS")
                .unwrap_or_else(|_| WORKER_POLL_INTERVAL_MS.to_string())
                .parse()
                .unwrap_or(WORKER_POLL_INTERVAL_MS),
            max_attempts: env::var("WORKER_MAX_ATTEMPTS")
                .unwrap_or_else(|_| WORKER_MAX_ATTEMPTS.to_string())
                .parse()
                .unwrap_or(WORKER_MAX_ATTEMPTS),
            timeout_seconds: env::var("WORKER_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| WORKER_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(WORKER_TIMEOUT_SECS),
            reap_interval_secs: env::var("WORKER_REAP_INTERVAL_SECS")
                .unwrap_or_else(|_| WORKER_REAP_INTERVAL_SECS.to_string())
                .parse()
                .unwrap_or(WORKER_REAP_INTERVAL_SECS),
            stale_grace_period_secs: env::var("WORKER_STALE_GRACE_PERIOD_SECS")
                .unwrap_or_else(|_| WORKER_STALE_GRACE_PERIOD_SECS.to_string())
                .parse()
                .unwrap_or(WORKER_STALE_GRACE_PERIOD_SECS),
            operation: env::var("WORKER_OPERATION")
                .unwrap_or_else(|_| DEFAULT_OPERATION.to_string()),
        };

        let config = Config {
            environment,
            database_url,
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| DB_MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(DB_MAX_CONNECTIONS),
            storage_backend,
            s3_bucket: env::var("S3_BUCKET").ok(),
            s3_region: env::var("S3_REGION").ok().or_else(|| env::var("AWS_REGION").ok()),
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
            local_storage_path: env::var("LOCAL_STORAGE_PATH").ok(),
            event_queue: env::var("EVENT_QUEUE")
                .unwrap_or_else(|_| DEFAULT_EVENT_QUEUE.to_string()),
            worker,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        match self.storage_backend {
            Some(StorageBackend::S3) => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!("S3_BUCKET must be set for the s3 backend"));
                }
                if self.s3_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set for the s3 backend"
                    ));
                }
            }
            Some(StorageBackend::Local) => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set for the local backend"
                    ));
                }
            }
            None => {}
        }

        if self.event_queue.trim().is_empty() {
            return Err(anyhow::anyhow!("EVENT_QUEUE must not be blank"));
        }
        if self.worker.max_workers == 0 {
            return Err(anyhow::anyhow!("WORKER_MAX_WORKERS must be at least 1"));
        }

        Ok(())
    }

    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            environment: "test".to_string(),
            database_url: "postgres://localhost/filedepot".to_string(),
            db_max_connections: DB_MAX_CONNECTIONS,
            storage_backend: None,
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
            local_storage_path: None,
            event_queue: DEFAULT_EVENT_QUEUE.to_string(),
            worker: WorkerConfig::default(),
        }
    }

    #[test]
    fn s3_backend_requires_bucket_and_region() {
        let mut config = base_config();
        config.storage_backend = Some(StorageBackend::S3);
        assert!(config.validate().is_err());

        config.s3_bucket = Some("files".to_string());
        assert!(config.validate().is_err());

        config.s3_region = Some("eu-west-1".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn local_backend_requires_path() {
        let mut config = base_config();
        config.storage_backend = Some(StorageBackend::Local);
        assert!(config.validate().is_err());

        config.local_storage_path = Some("/var/lib/filedepot".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_workers_rejected() {
        let mut config = base_config();
        config.worker.max_workers = 0;
        assert!(config.validate().is_err());
    }
}
