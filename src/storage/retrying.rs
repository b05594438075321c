//! Retry decorator for storage backends
//!
//! Wraps any [`MetricStore`] and re-runs every operation that fails with a
//! [`StorageError::Retriable`] error on the given [`RetryPolicy`]. Not-found,
//! validation and fatal errors pass through after a single attempt.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::backend::{HealthStatus, MetricSnapshot, MetricStore};
use super::error::StorageResult;
use crate::retry::RetryPolicy;

pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl<S: MetricStore> RetryingStore<S> {
    pub fn new(inner: S, policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self {
            inner,
            policy,
            cancel,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: MetricStore> MetricStore for RetryingStore<S> {
    async fn set_gauge(&self, name: &str, value: f64) -> StorageResult<f64> {
        self.policy
            .run("set_gauge", &self.cancel, || self.inner.set_gauge(name, value))
            .await
    }

    async fn get_gauge(&self, name: &str) -> StorageResult<f64> {
        self.policy
            .run("get_gauge", &self.cancel, || self.inner.get_gauge(name))
            .await
    }

    async fn set_counter(&self, name: &str, delta: i64) -> StorageResult<i64> {
        self.policy
            .run("set_counter", &self.cancel, || {
                self.inner.set_counter(name, delta)
            })
            .await
    }

    async fn get_counter(&self, name: &str) -> StorageResult<i64> {
        self.policy
            .run("get_counter", &self.cancel, || self.inner.get_counter(name))
            .await
    }

    async fn gauges(&self) -> StorageResult<HashMap<String, f64>> {
        self.policy
            .run("gauges", &self.cancel, || self.inner.gauges())
            .await
    }

    async fn counters(&self) -> StorageResult<HashMap<String, i64>> {
        self.policy
            .run("counters", &self.cancel, || self.inner.counters())
            .await
    }

    async fn update_counters_and_gauges(
        &self,
        counters: &HashMap<String, i64>,
        gauges: &HashMap<String, f64>,
    ) -> StorageResult<()> {
        self.policy
            .run("update_counters_and_gauges", &self.cancel, || {
                self.inner.update_counters_and_gauges(counters, gauges)
            })
            .await
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        self.inner.health_check().await
    }

    async fn shutdown(&self) -> StorageResult<()> {
        self.inner.shutdown().await
    }

    async fn snapshot(&self) -> StorageResult<MetricSnapshot> {
        self.policy
            .run("snapshot", &self.cancel, || self.inner.snapshot())
            .await
    }
}
