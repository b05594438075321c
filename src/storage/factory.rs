//! Storage backend selection
//!
//! Picks one backend from the hub configuration:
//!
//! 1. a database DSN selects the SQLite backend,
//! 2. otherwise a non-empty snapshot path selects the file backend over memory,
//! 3. otherwise metrics live in memory only.
//!
//! Durable backends are wrapped in a [`RetryingStore`] using the default
//! schedule. Opening the database is retried on the same schedule.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::backend::MetricStore;
use super::error::StorageResult;
use super::file::{FileBackend, FileOptions};
use super::memory::MemoryBackend;
use super::retrying::RetryingStore;
use crate::retry::RetryPolicy;

/// Storage backend configuration
#[derive(Debug, Clone, PartialEq)]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    Memory,

    /// In-memory storage snapshotted to a JSON file
    File {
        path: PathBuf,
        store_interval: Duration,
        restore: bool,
    },

    /// SQLite database
    Database { dsn: String },
}

impl StorageConfig {
    /// Apply the selection rules to the raw hub settings
    pub fn select(
        dsn: Option<&str>,
        path: Option<&str>,
        store_interval: Duration,
        restore: bool,
    ) -> Self {
        if let Some(dsn) = dsn.filter(|d| !d.is_empty()) {
            return StorageConfig::Database {
                dsn: dsn.to_string(),
            };
        }

        match path.filter(|p| !p.is_empty()) {
            Some(path) => StorageConfig::File {
                path: PathBuf::from(path),
                store_interval,
                restore,
            },
            None => StorageConfig::Memory,
        }
    }
}

/// Construct the configured store
pub async fn build_store(
    config: &StorageConfig,
    cancel: &CancellationToken,
) -> StorageResult<Arc<dyn MetricStore>> {
    build_store_with_policy(config, RetryPolicy::default(), cancel).await
}

pub async fn build_store_with_policy(
    config: &StorageConfig,
    policy: RetryPolicy,
    cancel: &CancellationToken,
) -> StorageResult<Arc<dyn MetricStore>> {
    match config {
        StorageConfig::Memory => {
            info!("using in-memory storage");
            Ok(Arc::new(MemoryBackend::new()))
        }
        StorageConfig::File {
            path,
            store_interval,
            restore,
        } => {
            info!("using file storage at {}", path.display());
            let options = FileOptions {
                path: path.clone(),
                store_interval: *store_interval,
                restore: *restore,
            };
            let backend = FileBackend::new(MemoryBackend::new(), options, cancel).await?;
            Ok(Arc::new(RetryingStore::new(backend, policy, cancel.clone())))
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Database { dsn } => {
            use super::sqlite::SqliteBackend;

            info!("using database storage");
            let backend = policy
                .run("connect", cancel, || SqliteBackend::connect(dsn))
                .await?;
            Ok(Arc::new(RetryingStore::new(backend, policy, cancel.clone())))
        }
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Database { .. } => Err(super::StorageError::InvalidConfig(
            "database storage requires the storage-sqlite feature".to_string(),
        )),
    }
}
