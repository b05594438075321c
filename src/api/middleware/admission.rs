//! Trusted subnet admission middleware
//!
//! With a trusted CIDR configured every request must carry its sender's
//! address in `X-Real-IP`, and that address must fall inside the range.
//! Rejection happens before the body is read.

use std::net::IpAddr;

use axum::{
    Json,
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use ipnet::IpNet;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::transport::REAL_IP_HEADER;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdmissionFilter {
    trusted: Option<IpNet>,
}

impl AdmissionFilter {
    pub fn new(trusted: Option<IpNet>) -> Self {
        Self { trusted }
    }

    /// Parse a CIDR such as `10.0.0.0/8`
    pub fn from_cidr(cidr: &str) -> Result<Self, ipnet::AddrParseError> {
        Ok(Self::new(Some(cidr.trim().parse()?)))
    }

    pub fn trusted(&self) -> Option<&IpNet> {
        self.trusted.as_ref()
    }

    pub fn check(&self, headers: &HeaderMap) -> Result<(), AdmissionError> {
        let Some(trusted) = &self.trusted else {
            return Ok(());
        };

        let raw = headers
            .get(REAL_IP_HEADER)
            .ok_or(AdmissionError::MissingAddress)?
            .to_str()
            .map_err(|_| AdmissionError::InvalidAddress("non-ASCII header".to_string()))?;

        let addr: IpAddr = raw
            .trim()
            .parse()
            .map_err(|_| AdmissionError::InvalidAddress(raw.to_string()))?;

        if !trusted.contains(&addr) {
            return Err(AdmissionError::Untrusted(addr));
        }

        Ok(())
    }
}

/// Admission errors
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("missing {REAL_IP_HEADER} header")]
    MissingAddress,

    #[error("invalid client address: {0}")]
    InvalidAddress(String),

    #[error("address {0} is outside the trusted subnet")]
    Untrusted(IpAddr),
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        debug!("request rejected: {}", self);
        (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

pub async fn admission_middleware(
    State(filter): State<AdmissionFilter>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AdmissionError> {
    filter.check(request.headers())?;
    Ok(next.run(request).await)
}
