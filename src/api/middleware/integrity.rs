//! Body hash middleware
//!
//! Runs only when the hub has a key. A request carrying a hash header is
//! verified against the decoded body and rejected with 400 on mismatch,
//! before any JSON parsing; requests without the header pass unchecked.
//! Every response is signed with the same key.

use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use super::MAX_BODY_BYTES;
use crate::api::error::ApiError;
use crate::transport::{HASH_HEADER, Signer};

pub async fn integrity_middleware(
    State(signer): State<Option<Signer>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(signer) = signer else {
        return Ok(next.run(request).await);
    };

    let hash = request
        .headers()
        .get(HASH_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let request = match hash {
        Some(hash) => {
            let (parts, body) = request.into_parts();
            let bytes = to_bytes(body, MAX_BODY_BYTES).await?;

            signer.verify(&bytes, &hash).inspect_err(|_| {
                warn!("rejecting {} {}: body hash mismatch", parts.method, parts.uri);
            })?;

            Request::from_parts(parts, Body::from(bytes))
        }
        None => {
            debug!("no {} header, skipping verification", HASH_HEADER);
            request
        }
    };

    let response = next.run(request).await;
    sign_response(&signer, response).await
}

async fn sign_response(signer: &Signer, response: Response) -> Result<Response, ApiError> {
    let (mut parts, body) = response.into_parts();
    let bytes = to_bytes(body, usize::MAX)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to buffer response: {e}")))?;

    if let Ok(value) = HeaderValue::from_str(&signer.sign(&bytes)) {
        parts.headers.insert(HASH_HEADER, value);
    }

    Ok(Response::from_parts(parts, Body::from(bytes)))
}
