//! Metric update and query endpoints
//!
//! JSON bodies arrive as raw bytes (already decoded by the middleware) and are
//! parsed here so malformed payloads become 400 responses.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
};

use crate::api::error::ApiResult;
use crate::api::state::ApiState;
use crate::api::types::{BatchRequest, BatchResponse, ValueRequest};
use crate::storage::{MetricSnapshot, StorageError};
use crate::{MetricKind, Metrics};

/// POST /update/
pub async fn update(State(state): State<ApiState>, body: Bytes) -> ApiResult<Json<Metrics>> {
    let metric: Metrics = serde_json::from_slice(&body)?;
    Ok(Json(state.service.update(metric).await?))
}

/// POST /updates/
pub async fn update_batch(
    State(state): State<ApiState>,
    body: Bytes,
) -> ApiResult<Json<BatchResponse>> {
    let metrics = serde_json::from_slice::<BatchRequest>(&body)?.into_metrics();
    let updated = metrics.len();

    state.service.update_batch(metrics).await?;
    Ok(Json(BatchResponse { updated }))
}

/// POST /value/
pub async fn value(State(state): State<ApiState>, body: Bytes) -> ApiResult<Json<Metrics>> {
    let request: ValueRequest = serde_json::from_slice(&body)?;
    Ok(Json(state.service.value(&request.id, request.kind).await?))
}

/// POST /update/:kind/:name/:value
pub async fn update_from_path(
    State(state): State<ApiState>,
    Path((kind, name, value)): Path<(String, String, String)>,
) -> ApiResult<String> {
    let stored = state.service.update_raw(&kind, &name, &value).await?;
    Ok(plain_value(&stored))
}

/// GET /value/:kind/:name
pub async fn value_from_path(
    State(state): State<ApiState>,
    Path((kind, name)): Path<(String, String)>,
) -> ApiResult<String> {
    let kind: MetricKind = kind.parse().map_err(StorageError::Validation)?;
    let stored = state.service.value(&name, kind).await?;
    Ok(plain_value(&stored))
}

/// GET /
pub async fn listing(State(state): State<ApiState>) -> Json<MetricSnapshot> {
    Json(state.service.listing().await)
}

fn plain_value(metric: &Metrics) -> String {
    match (metric.delta, metric.value) {
        (Some(delta), _) => delta.to_string(),
        (None, Some(value)) => value.to_string(),
        (None, None) => String::new(),
    }
}
