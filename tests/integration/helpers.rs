//! Helper functions for integration tests
#![allow(dead_code)]

use std::sync::Arc;

use metrics_relay::storage::{MetricStore, memory::MemoryBackend};
use tokio_util::sync::CancellationToken;

#[cfg(feature = "api")]
use metrics_relay::api::{ApiConfig, ApiState, spawn_api_server};

/// A running hub bound to a random local port
#[cfg(feature = "api")]
pub struct TestHub {
    pub url: String,
    pub port: u16,
    pub store: Arc<dyn MetricStore>,
    pub cancel: CancellationToken,
}

#[cfg(feature = "api")]
impl TestHub {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.url, path)
    }
}

#[cfg(feature = "api")]
impl Drop for TestHub {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub fn memory_store() -> Arc<dyn MetricStore> {
    Arc::new(MemoryBackend::new())
}

/// Spawn a hub serving `state`, whose store must be `store`
#[cfg(feature = "api")]
pub async fn spawn_hub_with(store: Arc<dyn MetricStore>, state: ApiState) -> TestHub {
    let cancel = CancellationToken::new();
    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(), // Random port
    };

    let (addr, _handle) = spawn_api_server(config, state, cancel.clone())
        .await
        .unwrap();

    TestHub {
        url: format!("http://{addr}"),
        port: addr.port(),
        store,
        cancel,
    }
}

/// Spawn a hub over a fresh in-memory store with no key, no encryption and
/// no subnet restriction
#[cfg(feature = "api")]
pub async fn spawn_hub() -> TestHub {
    let store = memory_store();
    spawn_hub_with(store.clone(), ApiState::new(store)).await
}

pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}
