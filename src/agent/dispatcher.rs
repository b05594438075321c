//! Delivery of metrics to the hub
//!
//! Every request body goes through the transport pipeline once (hash,
//! optional encryption, gzip) and is then sent with its own retry policy.
//! Connection failures, timeouts and 5xx answers are retried; any other
//! status is final.

use std::net::IpAddr;
use std::time::Duration;

use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

use crate::retry::{RetryPolicy, RetryableError};
use crate::transport::{
    Encryptor, Envelope, GZIP_ENCODING, HASH_HEADER, REAL_IP_HEADER, Signer, TransportError,
    encode_body,
};
use crate::{Metrics, MetricsBatch};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How a report is split into requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// One `POST /update/` per metric, in order
    Single,
    /// One `POST /updates/` carrying the whole report
    Batch,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to serialize metrics: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to encode request: {0}")]
    Encode(#[from] TransportError),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("hub responded with {status}: {body}")]
    Status { status: u16, body: String },
}

impl RetryableError for DispatchError {
    fn is_transient(&self) -> bool {
        match self {
            DispatchError::Request(e) => {
                e.is_connect() || e.is_timeout() || e.is_request() || e.is_body()
            }
            DispatchError::Status { status, .. } => *status >= 500,
            DispatchError::Serialize(_) | DispatchError::Encode(_) => false,
        }
    }
}

/// Sends reports to one hub
pub struct Dispatcher {
    client: reqwest::Client,
    base_url: String,
    mode: DeliveryMode,
    signer: Option<Signer>,
    encryptor: Option<Encryptor>,
    local_ip: Option<IpAddr>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl Dispatcher {
    /// Batch-mode dispatcher with the default retry schedule
    ///
    /// `base_url` is the hub root, e.g. `http://localhost:8080`.
    pub fn new(base_url: impl Into<String>, cancel: CancellationToken) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            mode: DeliveryMode::Batch,
            signer: None,
            encryptor: None,
            local_ip: None,
            policy: RetryPolicy::default(),
            cancel,
        })
    }

    pub fn with_mode(mut self, mode: DeliveryMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_signer(mut self, signer: Signer) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_encryptor(mut self, encryptor: Encryptor) -> Self {
        self.encryptor = Some(encryptor);
        self
    }

    /// Address advertised in `X-Real-IP`
    pub fn with_local_ip(mut self, local_ip: Option<IpAddr>) -> Self {
        self.local_ip = local_ip;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// Send one report using the configured delivery mode
    #[instrument(skip_all, fields(metrics = metrics.len(), mode = ?self.mode))]
    pub async fn deliver(&self, metrics: &[Metrics]) -> Result<(), DispatchError> {
        if metrics.is_empty() {
            return Ok(());
        }

        match self.mode {
            DeliveryMode::Batch => self.send_batch(metrics).await,
            DeliveryMode::Single => {
                for metric in metrics {
                    self.send_one(metric).await?;
                }
                Ok(())
            }
        }
    }

    pub async fn send_one(&self, metric: &Metrics) -> Result<(), DispatchError> {
        let payload = serde_json::to_vec(metric)?;
        self.post("/update/", &payload).await
    }

    pub async fn send_batch(&self, metrics: &[Metrics]) -> Result<(), DispatchError> {
        let payload = serde_json::to_vec(&MetricsBatch {
            metrics: metrics.to_vec(),
        })?;
        self.post("/updates/", &payload).await
    }

    async fn post(&self, path: &str, payload: &[u8]) -> Result<(), DispatchError> {
        let envelope = encode_body(payload, self.signer.as_ref(), self.encryptor.as_ref())?;
        trace!(
            "encoded {} payload bytes into {} for {}",
            payload.len(),
            envelope.body.len(),
            path
        );

        self.policy
            .run(path, &self.cancel, || self.send_once(path, &envelope))
            .await?;

        debug!("delivered to {}", path);
        Ok(())
    }

    async fn send_once(&self, path: &str, envelope: &Envelope) -> Result<(), DispatchError> {
        let mut request = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, GZIP_ENCODING)
            .body(envelope.body.clone());

        if let Some(hash) = &envelope.hash {
            request = request.header(HASH_HEADER, hash);
        }
        if let Some(ip) = self.local_ip {
            request = request.header(REAL_IP_HEADER, ip.to_string());
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(DispatchError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
