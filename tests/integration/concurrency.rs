//! Integration tests for concurrent access
//!
//! These tests verify that counter updates are never lost when many writers
//! hit the same metric at once.

use std::sync::Arc;

use futures::future::join_all;
use metrics_relay::service::MetricService;
use metrics_relay::storage::{MetricStore, memory::MemoryBackend};
use metrics_relay::Metrics;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_counter_writes() {
    let store: Arc<dyn MetricStore> = Arc::new(MemoryBackend::new());

    let writers = (0..100).map(|_| {
        let store = store.clone();
        tokio::spawn(async move { store.set_counter("hits", 3).await })
    });

    for result in join_all(writers).await {
        tokio_test::assert_ok!(result.unwrap());
    }

    assert_eq!(store.get_counter("hits").await.unwrap(), 300);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_batches_and_reads() {
    let service = MetricService::new(Arc::new(MemoryBackend::new()));

    let batches = (0..50).map(|i| {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .update_batch(vec![
                    Metrics::counter("PollCount", 2),
                    Metrics::gauge("Last", i as f64),
                ])
                .await
        })
    });
    let readers = (0..50).map(|_| {
        let service = service.clone();
        tokio::spawn(async move { service.listing().await })
    });

    for result in join_all(batches).await {
        tokio_test::assert_ok!(result.unwrap());
    }
    join_all(readers).await;

    let listing = service.listing().await;
    assert_eq!(listing.counters["PollCount"], 100);
    assert!((0.0..50.0).contains(&listing.gauges["Last"]));
}

#[cfg(feature = "api")]
#[tokio::test]
async fn test_concurrent_http_updates() {
    use serde_json::json;

    let hub = crate::helpers::spawn_hub().await;
    let client = crate::helpers::client();

    let requests = (0..40).map(|_| {
        client
            .post(hub.url("/update/"))
            .json(&json!({"id": "PollCount", "type": "counter", "delta": 5}))
            .send()
    });

    for response in join_all(requests).await {
        assert!(response.unwrap().status().is_success());
    }

    assert_eq!(hub.store.get_counter("PollCount").await.unwrap(), 200);
}
