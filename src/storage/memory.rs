//! In-memory storage backend (no persistence)
//!
//! A read/write-locked pair of maps. Readers run concurrently, writers are
//! exclusive, and the listing operations hand out copies so callers never see
//! a map that is being mutated. Wrap it in a
//! [`FileBackend`](super::file::FileBackend) for durability across restarts.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use super::backend::{HealthStatus, MetricStore, accumulate, validate_delta};
use super::error::{StorageError, StorageResult};
use crate::MetricKind;

#[derive(Debug, Default)]
struct Maps {
    gauges: HashMap<String, f64>,
    counters: HashMap<String, i64>,
}

/// In-memory storage backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    maps: RwLock<Maps>,
}

impl MemoryBackend {
    /// Create a new in-memory backend
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetricStore for MemoryBackend {
    async fn set_gauge(&self, name: &str, value: f64) -> StorageResult<f64> {
        trace!("set gauge {name} = {value}");
        self.maps.write().await.gauges.insert(name.to_string(), value);
        Ok(value)
    }

    async fn get_gauge(&self, name: &str) -> StorageResult<f64> {
        self.maps
            .read()
            .await
            .gauges
            .get(name)
            .copied()
            .ok_or_else(|| StorageError::not_found(MetricKind::Gauge, name))
    }

    async fn set_counter(&self, name: &str, delta: i64) -> StorageResult<i64> {
        validate_delta(name, delta)?;

        let mut maps = self.maps.write().await;
        let current = maps.counters.get(name).copied().unwrap_or_default();
        let total = accumulate(name, current, delta)?;
        maps.counters.insert(name.to_string(), total);

        trace!("add counter {name} += {delta} -> {total}");
        Ok(total)
    }

    async fn get_counter(&self, name: &str) -> StorageResult<i64> {
        self.maps
            .read()
            .await
            .counters
            .get(name)
            .copied()
            .ok_or_else(|| StorageError::not_found(MetricKind::Counter, name))
    }

    async fn gauges(&self) -> StorageResult<HashMap<String, f64>> {
        Ok(self.maps.read().await.gauges.clone())
    }

    async fn counters(&self) -> StorageResult<HashMap<String, i64>> {
        Ok(self.maps.read().await.counters.clone())
    }

    async fn update_counters_and_gauges(
        &self,
        counters: &HashMap<String, i64>,
        gauges: &HashMap<String, f64>,
    ) -> StorageResult<()> {
        let mut maps = self.maps.write().await;

        // validate everything first so the update is all-or-nothing
        let mut totals = Vec::with_capacity(counters.len());
        for (name, delta) in counters {
            validate_delta(name, *delta)?;
            let current = maps.counters.get(name).copied().unwrap_or_default();
            totals.push((name.clone(), accumulate(name, current, *delta)?));
        }

        maps.counters.extend(totals);
        maps.gauges
            .extend(gauges.iter().map(|(name, value)| (name.clone(), *value)));

        debug!(
            "applied {} counters and {} gauges",
            counters.len(),
            gauges.len()
        );
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let maps = self.maps.read().await;
        Ok(HealthStatus {
            healthy: true,
            message: "In-memory storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("gauges".to_string(), maps.gauges.len().to_string()),
                ("counters".to_string(), maps.counters.len().to_string()),
            ]),
        })
    }

    async fn shutdown(&self) -> StorageResult<()> {
        debug!("closing in-memory backend (no-op)");
        Ok(())
    }
}
