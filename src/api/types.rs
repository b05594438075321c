//! API request/response types

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{MetricKind, Metrics, MetricsBatch};

/// Body of `POST /value/`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueRequest {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: MetricKind,
}

/// Body of `POST /updates/`: either `{"metrics": [...]}` or a bare array
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BatchRequest {
    Wrapped(MetricsBatch),
    Bare(Vec<Metrics>),
}

impl BatchRequest {
    pub fn into_metrics(self) -> Vec<Metrics> {
        match self {
            BatchRequest::Wrapped(batch) => batch.metrics,
            BatchRequest::Bare(metrics) => metrics,
        }
    }
}

/// Response of `POST /updates/`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub updated: usize,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    pub timestamp: String,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}
