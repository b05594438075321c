//! Integration tests for the request pipeline between dispatcher and hub
//!
//! These tests verify that:
//! - Hashed, encrypted and compressed requests are decoded and applied
//! - Hash mismatches are rejected before the body is parsed
//! - Responses are signed with the hub's key
//! - The trusted subnet filter admits and rejects by X-Real-IP

use std::time::Duration;

use axum::http::StatusCode;
use metrics_relay::agent::{DeliveryMode, DispatchError, Dispatcher};
use metrics_relay::api::{ApiState, middleware::admission::AdmissionFilter};
use metrics_relay::retry::RetryPolicy;
use metrics_relay::transport::{Decryptor, HASH_HEADER, REAL_IP_HEADER, Signer, compress};
use metrics_relay::Metrics;
use rsa::RsaPrivateKey;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::helpers::{TestHub, client, memory_store, spawn_hub_with};

fn keypair() -> Decryptor {
    Decryptor::new(RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap())
}

async fn hub_with(configure: impl FnOnce(ApiState) -> ApiState) -> TestHub {
    let store = memory_store();
    let state = configure(ApiState::new(store.clone()));
    spawn_hub_with(store, state).await
}

fn dispatcher(hub: &TestHub) -> Dispatcher {
    Dispatcher::new(hub.url.clone(), CancellationToken::new())
        .unwrap()
        .with_policy(RetryPolicy::new(vec![Duration::from_millis(10)]))
}

#[tokio::test]
async fn test_full_pipeline_round_trip() {
    let decryptor = keypair();
    let encryptor = decryptor.encryptor();
    let hub = hub_with(|state| {
        state
            .with_signer(Signer::new(b"shared-key").unwrap())
            .with_decryptor(decryptor)
    })
    .await;

    let dispatcher = dispatcher(&hub)
        .with_signer(Signer::new(b"shared-key").unwrap())
        .with_encryptor(encryptor);

    dispatcher
        .deliver(&[Metrics::counter("PollCount", 100), Metrics::gauge("Alloc", 1234.5)])
        .await
        .unwrap();
    dispatcher
        .deliver(&[Metrics::counter("PollCount", 5), Metrics::gauge("Alloc", 2000.0)])
        .await
        .unwrap();

    assert_eq!(hub.store.get_counter("PollCount").await.unwrap(), 105);
    assert_eq!(hub.store.get_gauge("Alloc").await.unwrap(), 2000.0);
}

#[tokio::test]
async fn test_single_mode_through_pipeline() {
    let hub = hub_with(|state| state.with_signer(Signer::new(b"k").unwrap())).await;

    dispatcher(&hub)
        .with_signer(Signer::new(b"k").unwrap())
        .with_mode(DeliveryMode::Single)
        .deliver(&[Metrics::counter("a", 1), Metrics::gauge("b", 2.0)])
        .await
        .unwrap();

    assert_eq!(hub.store.get_counter("a").await.unwrap(), 1);
    assert_eq!(hub.store.get_gauge("b").await.unwrap(), 2.0);
}

#[tokio::test]
async fn test_redelivery_double_counts() {
    let hub = hub_with(|state| state).await;
    let dispatcher = dispatcher(&hub);
    let report = [Metrics::counter("PollCount", 7)];

    // at-least-once delivery: the same report sent twice is applied twice
    dispatcher.deliver(&report).await.unwrap();
    dispatcher.deliver(&report).await.unwrap();

    assert_eq!(hub.store.get_counter("PollCount").await.unwrap(), 14);
}

#[tokio::test]
async fn test_wrong_key_is_rejected_without_retry() {
    let hub = hub_with(|state| state.with_signer(Signer::new(b"hub-key").unwrap())).await;

    let result = dispatcher(&hub)
        .with_signer(Signer::new(b"agent-key").unwrap())
        .deliver(&[Metrics::counter("PollCount", 1)])
        .await;

    assert!(matches!(result, Err(DispatchError::Status { status: 400, .. })));
    assert!(hub.store.counters().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_hash_checked_before_parsing() {
    let hub = hub_with(|state| state.with_signer(Signer::new(b"key").unwrap())).await;

    // not even JSON, but the hash mismatch must win
    let response = client()
        .post(hub.url("/update/"))
        .header(HASH_HEADER, "00ff")
        .body("garbage")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("hash"));
}

#[tokio::test]
async fn test_missing_hash_is_accepted_and_response_signed() {
    let signer = Signer::new(b"key").unwrap();
    let hub = hub_with(|state| state.with_signer(signer.clone())).await;

    let response = client()
        .post(hub.url("/update/"))
        .json(&json!({"id": "PollCount", "type": "counter", "delta": 1}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let hash = response
        .headers()
        .get(HASH_HEADER)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let body = response.bytes().await.unwrap();
    assert!(signer.verify(&body, &hash).is_ok());
}

#[tokio::test]
async fn test_plaintext_body_rejected_when_decryption_enabled() {
    let hub = hub_with(|state| state.with_decryptor(keypair())).await;

    let body = compress(br#"{"id":"PollCount","type":"counter","delta":1}"#).unwrap();
    let response = client()
        .post(hub.url("/update/"))
        .header("Content-Encoding", "gzip")
        .body(body)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_corrupt_gzip_rejected() {
    let hub = hub_with(|state| state).await;

    let response = client()
        .post(hub.url("/update/"))
        .header("Content-Encoding", "gzip")
        .body("definitely not gzip")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_trusted_subnet() {
    let hub = hub_with(|state| {
        state.with_admission(AdmissionFilter::from_cidr("10.0.0.0/8").unwrap())
    })
    .await;
    let client = client();
    let metric = json!({"id": "PollCount", "type": "counter", "delta": 1});

    let outside = client
        .post(hub.url("/update/"))
        .header(REAL_IP_HEADER, "192.168.1.1")
        .json(&metric)
        .send()
        .await
        .unwrap();
    assert_eq!(outside.status(), StatusCode::FORBIDDEN);

    let missing = client
        .post(hub.url("/update/"))
        .json(&metric)
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::FORBIDDEN);

    let inside = client
        .post(hub.url("/update/"))
        .header(REAL_IP_HEADER, "10.1.2.3")
        .json(&metric)
        .send()
        .await
        .unwrap();
    assert_eq!(inside.status(), StatusCode::OK);

    assert_eq!(hub.store.get_counter("PollCount").await.unwrap(), 1);
}

#[tokio::test]
async fn test_dispatcher_advertises_local_ip() {
    let hub = hub_with(|state| {
        state.with_admission(AdmissionFilter::from_cidr("127.0.0.0/8").unwrap())
    })
    .await;

    let local_ip = metrics_relay::util::local_ip_for(&format!("127.0.0.1:{}", hub.port));
    dispatcher(&hub)
        .with_local_ip(local_ip)
        .deliver(&[Metrics::gauge("Alloc", 1.0)])
        .await
        .unwrap();

    assert_eq!(hub.store.get_gauge("Alloc").await.unwrap(), 1.0);
}
