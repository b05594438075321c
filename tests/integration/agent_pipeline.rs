//! Integration tests for the agent talking to a real hub
//!
//! These tests verify that:
//! - Sampled gauges and PollCount reach the hub's store
//! - Shutdown flushes the final report before the agent exits

use std::time::Duration;

use metrics_relay::agent::{Agent, AgentOptions, Dispatcher};
use metrics_relay::api::ApiState;
use metrics_relay::transport::Signer;
use tokio_util::sync::CancellationToken;

use crate::helpers::{memory_store, spawn_hub_with};

#[tokio::test]
async fn test_agent_reports_to_hub() {
    let store = memory_store();
    let hub = spawn_hub_with(
        store.clone(),
        ApiState::new(store).with_signer(Signer::new(b"key").unwrap()),
    )
    .await;

    let cancel = CancellationToken::new();
    let dispatcher = Dispatcher::new(hub.url.clone(), cancel.clone())
        .unwrap()
        .with_signer(Signer::new(b"key").unwrap());

    let agent = Agent::spawn(
        AgentOptions {
            poll_interval: Duration::from_millis(20),
            report_interval: Duration::from_millis(100),
            rate_limit: 2,
        },
        dispatcher,
        cancel.clone(),
    );

    tokio::time::sleep(Duration::from_millis(350)).await;
    cancel.cancel();
    agent.join().await;

    let poll_count = hub.store.get_counter("PollCount").await.unwrap();
    assert!(poll_count >= 5, "PollCount was {poll_count}");
    assert!(hub.store.get_gauge("TotalMemory").await.unwrap() > 0.0);
    assert!(hub.store.get_gauge("RandomValue").await.is_ok());
}

#[tokio::test]
async fn test_every_poll_is_counted_once() {
    let store = memory_store();
    let hub = spawn_hub_with(store.clone(), ApiState::new(store)).await;

    let cancel = CancellationToken::new();
    let dispatcher = Dispatcher::new(hub.url.clone(), cancel.clone()).unwrap();

    let agent = Agent::spawn(
        AgentOptions {
            poll_interval: Duration::from_millis(25),
            report_interval: Duration::from_millis(60),
            rate_limit: 1,
        },
        dispatcher,
        cancel.clone(),
    );
    let state = agent.state().clone();

    tokio::time::sleep(Duration::from_millis(300)).await;
    cancel.cancel();
    agent.join().await;

    // everything polled was reported, nothing is left behind
    assert_eq!(state.lock().await.poll_count(), 0);
    assert!(hub.store.get_counter("PollCount").await.unwrap() > 0);
}
