//! Error types for storage operations

use thiserror::Error;

use crate::MetricKind;
use crate::retry::RetryableError;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Classification tag carried by every storage error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Requested metric is absent
    NotFound,
    /// Malformed input, never retried
    Validation,
    /// Transient condition, safe to retry
    Retriable,
    /// Anything else, surfaced immediately
    Fatal,
}

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{kind} metric not found: {name}")]
    NotFound { kind: MetricKind, name: String },

    #[error("invalid metric: {0}")]
    Validation(String),

    /// Transient backend condition (connection refused, busy database, ...)
    #[error("storage temporarily unavailable: {0}")]
    Retriable(String),

    #[error("storage query failed: {0}")]
    QueryFailed(String),

    #[error("database migration failed: {0}")]
    MigrationFailed(String),

    #[error("invalid storage configuration: {0}")]
    InvalidConfig(String),

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage backend is shut down")]
    Closed,
}

impl StorageError {
    pub fn not_found(kind: MetricKind, name: impl Into<String>) -> Self {
        StorageError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            StorageError::NotFound { .. } => ErrorClass::NotFound,
            StorageError::Validation(_) => ErrorClass::Validation,
            StorageError::Retriable(_) => ErrorClass::Retriable,
            StorageError::QueryFailed(_)
            | StorageError::MigrationFailed(_)
            | StorageError::InvalidConfig(_)
            | StorageError::Snapshot(_)
            | StorageError::Io(_)
            | StorageError::Closed => ErrorClass::Fatal,
        }
    }

    /// Wrap an I/O error, tagging interruptions and timeouts as retriable
    pub fn from_io(context: &str, err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut => {
                StorageError::Retriable(format!("{context}: {err}"))
            }
            _ => StorageError::Io(std::io::Error::new(err.kind(), format!("{context}: {err}"))),
        }
    }
}

impl RetryableError for StorageError {
    fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Retriable
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::Tls(_) => {
                StorageError::Retriable(err.to_string())
            }
            sqlx::Error::PoolClosed => StorageError::Closed,
            sqlx::Error::Database(db) if is_busy_code(db.code().as_deref()) => {
                StorageError::Retriable(err.to_string())
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::migrate::MigrateError> for StorageError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StorageError::MigrationFailed(err.to_string())
    }
}

/// SQLITE_BUSY (5) and SQLITE_LOCKED (6), including their extended codes
#[cfg(feature = "storage-sqlite")]
fn is_busy_code(code: Option<&str>) -> bool {
    code.and_then(|c| c.parse::<i32>().ok())
        .is_some_and(|c| matches!(c & 0xff, 5 | 6))
}
