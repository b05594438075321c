//! Storage backend trait definition
//!
//! This module defines the `MetricStore` trait that every backend
//! (memory, file snapshot, SQLite) implements, plus the snapshot type
//! used for persistence and bulk updates.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::{StorageError, StorageResult};

/// Point-in-time view of every gauge and counter
///
/// This is also the on-disk snapshot format:
/// `{"gauges": {name: float}, "counters": {name: uint}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    #[serde(default)]
    pub gauges: HashMap<String, f64>,

    #[serde(default)]
    pub counters: HashMap<String, i64>,
}

impl MetricSnapshot {
    pub fn is_empty(&self) -> bool {
        self.gauges.is_empty() && self.counters.is_empty()
    }
}

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Uniform contract for reading and writing gauges and counters
///
/// ## Semantics
///
/// - Gauges are last-write-wins.
/// - Counters are additive: `set_counter` adds `delta` and returns the new total.
///   Deltas must be non-negative so a counter never decreases.
/// - `get_gauge`/`get_counter` on an unknown name fail with
///   [`StorageError::NotFound`], which is never retried.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`; they are shared across request
/// handlers and background tasks behind an `Arc`.
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Overwrite a gauge, returning the stored value
    async fn set_gauge(&self, name: &str, value: f64) -> StorageResult<f64>;

    async fn get_gauge(&self, name: &str) -> StorageResult<f64>;

    /// Add `delta` to a counter atomically, returning the new total
    async fn set_counter(&self, name: &str, delta: i64) -> StorageResult<i64>;

    async fn get_counter(&self, name: &str) -> StorageResult<i64>;

    /// Copy of all gauges
    async fn gauges(&self) -> StorageResult<HashMap<String, f64>>;

    /// Copy of all counters
    async fn counters(&self) -> StorageResult<HashMap<String, i64>>;

    /// Apply counter deltas and gauge overwrites as one logical unit
    ///
    /// Used by batch ingestion and by snapshot restore.
    async fn update_counters_and_gauges(
        &self,
        counters: &HashMap<String, i64>,
        gauges: &HashMap<String, f64>,
    ) -> StorageResult<()>;

    /// Check backend health
    ///
    /// Performs a lightweight operation to verify the backend
    /// is operational (e.g., ping database, check file access).
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Release held resources. Calling it more than once is a no-op.
    async fn shutdown(&self) -> StorageResult<()>;

    /// Both maps at once
    async fn snapshot(&self) -> StorageResult<MetricSnapshot> {
        Ok(MetricSnapshot {
            gauges: self.gauges().await?,
            counters: self.counters().await?,
        })
    }
}

#[async_trait]
impl<T: MetricStore + ?Sized> MetricStore for Arc<T> {
    async fn set_gauge(&self, name: &str, value: f64) -> StorageResult<f64> {
        (**self).set_gauge(name, value).await
    }

    async fn get_gauge(&self, name: &str) -> StorageResult<f64> {
        (**self).get_gauge(name).await
    }

    async fn set_counter(&self, name: &str, delta: i64) -> StorageResult<i64> {
        (**self).set_counter(name, delta).await
    }

    async fn get_counter(&self, name: &str) -> StorageResult<i64> {
        (**self).get_counter(name).await
    }

    async fn gauges(&self) -> StorageResult<HashMap<String, f64>> {
        (**self).gauges().await
    }

    async fn counters(&self) -> StorageResult<HashMap<String, i64>> {
        (**self).counters().await
    }

    async fn update_counters_and_gauges(
        &self,
        counters: &HashMap<String, i64>,
        gauges: &HashMap<String, f64>,
    ) -> StorageResult<()> {
        (**self).update_counters_and_gauges(counters, gauges).await
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        (**self).health_check().await
    }

    async fn shutdown(&self) -> StorageResult<()> {
        (**self).shutdown().await
    }

    async fn snapshot(&self) -> StorageResult<MetricSnapshot> {
        (**self).snapshot().await
    }
}

/// Reject deltas that would make a counter decrease
pub fn validate_delta(name: &str, delta: i64) -> StorageResult<()> {
    if delta < 0 {
        return Err(StorageError::Validation(format!(
            "counter {name} cannot be decremented (delta {delta})"
        )));
    }
    Ok(())
}

/// Add `delta` to `current`, failing on overflow
pub fn accumulate(name: &str, current: i64, delta: i64) -> StorageResult<i64> {
    current
        .checked_add(delta)
        .ok_or_else(|| StorageError::Validation(format!("counter {name} overflowed")))
}
