//! Integration tests for storage failure handling behind the API
//!
//! These tests verify that:
//! - Transient storage failures are hidden by the retry layer
//! - Exhausted retries surface as 500
//! - The listing endpoint degrades to empty maps
//! - The health endpoint reports an unhealthy backend

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use metrics_relay::api::ApiState;
use metrics_relay::retry::RetryPolicy;
use metrics_relay::storage::{
    HealthStatus, MetricSnapshot, MetricStore, StorageError, StorageResult,
    memory::MemoryBackend, retrying::RetryingStore,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::helpers::{client, spawn_hub_with};

/// Memory store whose first `failures` operations report a busy backend
struct FlakyStore {
    inner: MemoryBackend,
    failures: usize,
    calls: AtomicUsize,
}

impl FlakyStore {
    fn new(failures: usize) -> Self {
        Self {
            inner: MemoryBackend::new(),
            failures,
            calls: AtomicUsize::new(0),
        }
    }

    fn check(&self) -> StorageResult<()> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(StorageError::Retriable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl MetricStore for FlakyStore {
    async fn set_gauge(&self, name: &str, value: f64) -> StorageResult<f64> {
        self.check()?;
        self.inner.set_gauge(name, value).await
    }

    async fn get_gauge(&self, name: &str) -> StorageResult<f64> {
        self.check()?;
        self.inner.get_gauge(name).await
    }

    async fn set_counter(&self, name: &str, delta: i64) -> StorageResult<i64> {
        self.check()?;
        self.inner.set_counter(name, delta).await
    }

    async fn get_counter(&self, name: &str) -> StorageResult<i64> {
        self.check()?;
        self.inner.get_counter(name).await
    }

    async fn gauges(&self) -> StorageResult<HashMap<String, f64>> {
        self.check()?;
        self.inner.gauges().await
    }

    async fn counters(&self) -> StorageResult<HashMap<String, i64>> {
        self.check()?;
        self.inner.counters().await
    }

    async fn update_counters_and_gauges(
        &self,
        counters: &HashMap<String, i64>,
        gauges: &HashMap<String, f64>,
    ) -> StorageResult<()> {
        self.check()?;
        self.inner.update_counters_and_gauges(counters, gauges).await
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        Ok(HealthStatus {
            healthy: self.calls.load(Ordering::SeqCst) >= self.failures,
            message: "flaky test store".to_string(),
            metadata: HashMap::new(),
        })
    }

    async fn shutdown(&self) -> StorageResult<()> {
        Ok(())
    }
}

fn retrying(failures: usize) -> Arc<dyn MetricStore> {
    Arc::new(RetryingStore::new(
        FlakyStore::new(failures),
        RetryPolicy::new(vec![Duration::from_millis(10); 3]),
        CancellationToken::new(),
    ))
}

async fn post_counter(url: &str) -> reqwest::Response {
    client()
        .post(url)
        .json(&json!({"id": "PollCount", "type": "counter", "delta": 1}))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_transient_failures_are_hidden() {
    let store = retrying(2);
    let hub = spawn_hub_with(store.clone(), ApiState::new(store)).await;

    let response = post_counter(&hub.url("/update/")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(hub.store.get_counter("PollCount").await.unwrap(), 1);
}

#[tokio::test]
async fn test_exhausted_retries_are_500() {
    let store = retrying(usize::MAX);
    let hub = spawn_hub_with(store.clone(), ApiState::new(store)).await;

    let response = post_counter(&hub.url("/update/")).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("unavailable"));
}

#[tokio::test]
async fn test_listing_degrades_to_empty() {
    let store = retrying(usize::MAX);
    let hub = spawn_hub_with(store.clone(), ApiState::new(store)).await;

    let response = client().get(hub.url("/")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let listing: MetricSnapshot = response.json().await.unwrap();
    assert!(listing.is_empty());
}

#[tokio::test]
async fn test_ping_reports_unhealthy_backend() {
    let store: Arc<dyn MetricStore> = Arc::new(FlakyStore::new(usize::MAX));
    let hub = spawn_hub_with(store.clone(), ApiState::new(store)).await;

    let response = client().get(hub.url("/ping")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
