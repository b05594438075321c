//! Health check endpoint

use axum::{Json, extract::State, http::StatusCode};

use crate::api::{state::ApiState, types::HealthResponse};

/// GET /ping
///
/// 200 when the storage backend reports healthy, 500 otherwise
pub async fn health_check(State(state): State<ApiState>) -> (StatusCode, Json<HealthResponse>) {
    let timestamp = chrono::Utc::now().to_rfc3339();

    match state.service.store().health_check().await {
        Ok(health) if health.healthy => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok".to_string(),
                message: health.message,
                timestamp,
                metadata: health.metadata,
            }),
        ),
        Ok(health) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(HealthResponse {
                status: "unhealthy".to_string(),
                message: health.message,
                timestamp,
                metadata: health.metadata,
            }),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(HealthResponse {
                status: "unhealthy".to_string(),
                message: e.to_string(),
                timestamp,
                metadata: Default::default(),
            }),
        ),
    }
}
