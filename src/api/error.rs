//! API error types and conversions

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use crate::storage::{ErrorClass, StorageError};
use crate::transport::TransportError;

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

/// API error types
#[derive(Debug)]
pub enum ApiError {
    /// Storage operation failed (after any retries)
    StorageError(String),

    /// Malformed body, missing field or unknown metric type
    InvalidRequest(String),

    /// Body could not be decoded or failed the hash check
    Integrity(String),

    /// Resource not found
    NotFound(String),

    /// Internal server error
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::StorageError(msg) => {
                error!("storage failure: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Integrity(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err.class() {
            ErrorClass::NotFound => ApiError::NotFound(err.to_string()),
            ErrorClass::Validation => ApiError::InvalidRequest(err.to_string()),
            ErrorClass::Retriable | ErrorClass::Fatal => ApiError::StorageError(err.to_string()),
        }
    }
}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        ApiError::Integrity(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::InvalidRequest(format!("invalid JSON body: {err}"))
    }
}

impl From<axum::Error> for ApiError {
    fn from(err: axum::Error) -> Self {
        ApiError::InvalidRequest(format!("failed to read body: {err}"))
    }
}
