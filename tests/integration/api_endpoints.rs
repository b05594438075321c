//! Integration tests for API endpoints
//!
//! These tests verify that:
//! - JSON and path-style updates store counters and gauges correctly
//! - Reads return stored values and 404 for unknown metrics
//! - Malformed bodies are rejected with 400
//! - The listing and health endpoints respond

use axum::http::StatusCode;
use metrics_relay::api::HealthResponse;
use metrics_relay::storage::MetricSnapshot;
use metrics_relay::{MetricKind, Metrics};
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::helpers::{client, spawn_hub};

#[tokio::test]
async fn test_counter_accumulates_across_requests() {
    let hub = spawn_hub().await;
    let client = client();

    for delta in [100, 5] {
        let response = client
            .post(hub.url("/update/"))
            .json(&json!({"id": "PollCount", "type": "counter", "delta": delta}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(hub.store.get_counter("PollCount").await.unwrap(), 105);
}

#[tokio::test]
async fn test_update_echoes_stored_value() {
    let hub = spawn_hub().await;
    let client = client();

    client
        .post(hub.url("/update/"))
        .json(&Metrics::counter("PollCount", 7))
        .send()
        .await
        .unwrap();

    let echoed: Metrics = client
        .post(hub.url("/update/"))
        .json(&Metrics::counter("PollCount", 3))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(echoed, Metrics::counter("PollCount", 10));
}

#[tokio::test]
async fn test_gauge_last_write_wins() {
    let hub = spawn_hub().await;
    let client = client();

    for value in [1234.5, 2000.0] {
        client
            .post(hub.url("/update/"))
            .json(&json!({"id": "Alloc", "type": "gauge", "value": value}))
            .send()
            .await
            .unwrap();
    }

    let stored: Metrics = client
        .post(hub.url("/value/"))
        .json(&json!({"id": "Alloc", "type": "gauge"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(stored, Metrics::gauge("Alloc", 2000.0));
}

#[tokio::test]
async fn test_unknown_metric_is_404() {
    let hub = spawn_hub().await;

    let response = client()
        .post(hub.url("/value/"))
        .json(&json!({"id": "missing", "type": "counter"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn test_malformed_requests_are_400() {
    let hub = spawn_hub().await;
    let client = client();

    let bodies = [
        "not json".to_string(),
        json!({"id": "x", "type": "histogram", "value": 1.0}).to_string(),
        json!({"id": "PollCount", "type": "counter", "value": 1.0}).to_string(),
        json!({"id": "Alloc", "type": "gauge", "delta": 1}).to_string(),
        json!({"id": "PollCount", "type": "counter", "delta": -1}).to_string(),
    ];

    for body in bodies {
        let response = client
            .post(hub.url("/update/"))
            .header("Content-Type", "application/json")
            .body(body.clone())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
    }

    assert!(hub.store.snapshot().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_batch_accepts_wrapped_and_bare_arrays() {
    let hub = spawn_hub().await;
    let client = client();

    let wrapped = client
        .post(hub.url("/updates/"))
        .json(&json!({"metrics": [
            {"id": "PollCount", "type": "counter", "delta": 2},
            {"id": "PollCount", "type": "counter", "delta": 3},
            {"id": "Alloc", "type": "gauge", "value": 1.0},
            {"id": "Alloc", "type": "gauge", "value": 4.5},
        ]}))
        .send()
        .await
        .unwrap();
    assert_eq!(wrapped.status(), StatusCode::OK);

    let bare = client
        .post(hub.url("/updates/"))
        .json(&json!([{"id": "PollCount", "type": "counter", "delta": 1}]))
        .send()
        .await
        .unwrap();
    assert_eq!(bare.status(), StatusCode::OK);

    assert_eq!(hub.store.get_counter("PollCount").await.unwrap(), 6);
    assert_eq!(hub.store.get_gauge("Alloc").await.unwrap(), 4.5);
}

#[tokio::test]
async fn test_invalid_batch_applies_nothing() {
    let hub = spawn_hub().await;

    let response = client()
        .post(hub.url("/updates/"))
        .json(&json!([
            {"id": "ok", "type": "counter", "delta": 1},
            {"id": "bad", "type": "counter"},
        ]))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(hub.store.counters().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_path_style_update_and_read() {
    let hub = spawn_hub().await;
    let client = client();

    let response = client
        .post(hub.url("/update/counter/hits/4"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "4");

    client
        .post(hub.url("/update/gauge/temp/21.5"))
        .send()
        .await
        .unwrap();

    let value = client
        .get(hub.url("/value/gauge/temp"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(value, "21.5");

    let bad_kind = client
        .post(hub.url("/update/histogram/x/1"))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_kind.status(), StatusCode::BAD_REQUEST);

    let bad_value = client
        .post(hub.url("/update/counter/x/abc"))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_value.status(), StatusCode::BAD_REQUEST);

    let not_a_number = client
        .post(hub.url("/update/gauge/x/NaN"))
        .send()
        .await
        .unwrap();
    assert_eq!(not_a_number.status(), StatusCode::BAD_REQUEST);

    let missing = client
        .get(hub.url("/value/counter/nothing"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_listing() {
    let hub = spawn_hub().await;
    hub.store.set_gauge("Alloc", 1.5).await.unwrap();
    hub.store.set_counter("PollCount", 3).await.unwrap();

    let listing: MetricSnapshot = client()
        .get(hub.url("/"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(listing.gauges["Alloc"], 1.5);
    assert_eq!(listing.counters["PollCount"], 3);
}

#[tokio::test]
async fn test_ping() {
    let hub = spawn_hub().await;

    let response = client().get(hub.url("/ping")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let health: HealthResponse = response.json().await.unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.metadata["backend"], "memory");
}

#[tokio::test]
async fn test_value_kind_is_part_of_identity() {
    let hub = spawn_hub().await;
    hub.store.set_counter("shared", 1).await.unwrap();

    let response = client()
        .post(hub.url("/value/"))
        .json(&json!({"id": "shared", "type": MetricKind::Gauge}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
