//! HTTP API of the metrics hub
//!
//! ## Architecture
//!
//! - **Axum** web framework with Tower middleware
//! - **Request pipeline** (outermost first): tracing, response compression,
//!   trusted subnet admission, body decoding (gunzip + decrypt), hash
//!   verification and response signing
//! - **Handlers** delegate to [`MetricService`](crate::service::MetricService)
//!
//! ## Endpoints
//!
//! - `POST /update/` - Store one JSON metric
//! - `POST /updates/` - Store a batch of JSON metrics
//! - `POST /value/` - Read one metric as JSON
//! - `POST /update/:type/:name/:value` - Store one metric from path segments
//! - `GET /value/:type/:name` - Read one metric as plain text
//! - `GET /` - All stored metrics
//! - `GET /ping` - Storage health check

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod types;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;
pub use types::{BatchRequest, BatchResponse, HealthResponse, ValueRequest};

use std::net::SocketAddr;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing::info;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8080")
    pub bind_addr: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }
}

/// Build the router with every route and the full middleware stack
pub fn router(state: ApiState) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(from_fn_with_state(
            state.admission.clone(),
            middleware::admission::admission_middleware,
        ))
        .layer(from_fn_with_state(
            state.decryptor.clone(),
            middleware::decode::decode_middleware,
        ))
        .layer(from_fn_with_state(
            state.signer.clone(),
            middleware::integrity::integrity_middleware,
        ));

    Router::new()
        .route("/", get(routes::metrics::listing))
        .route("/ping", get(routes::health::health_check))
        .route("/update", post(routes::metrics::update))
        .route("/update/", post(routes::metrics::update))
        .route("/updates", post(routes::metrics::update_batch))
        .route("/updates/", post(routes::metrics::update_batch))
        .route("/value", post(routes::metrics::value))
        .route("/value/", post(routes::metrics::value))
        .route(
            "/update/:kind/:name/:value",
            post(routes::metrics::update_from_path),
        )
        .route("/value/:kind/:name", get(routes::metrics::value_from_path))
        .with_state(state)
        .layer(middleware)
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task that stops
/// gracefully once `cancel` fires. Returns the server's local address and
/// the task handle.
pub async fn spawn_api_server(
    config: ApiConfig,
    state: ApiState,
    cancel: CancellationToken,
) -> anyhow::Result<(SocketAddr, JoinHandle<()>)> {
    info!("starting API server on {}", config.bind_addr);

    let app = router(state);

    // Bind and serve
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    // Spawn server in background
    let handle = tokio::spawn(async move {
        let shutdown = async move { cancel.cancelled().await };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            tracing::error!("API server error: {}", e);
        }
        info!("API server stopped");
    });

    Ok((addr, handle))
}
