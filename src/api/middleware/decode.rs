//! Request body decoding middleware
//!
//! Gunzips bodies sent with `Content-Encoding: gzip` and, when the hub holds
//! a private key, decrypts them. Downstream layers and handlers only ever
//! see the plaintext JSON.

use std::sync::Arc;

use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    http::header::{CONTENT_ENCODING, CONTENT_LENGTH},
    middleware::Next,
    response::Response,
};
use tracing::trace;

use super::MAX_BODY_BYTES;
use crate::api::error::ApiError;
use crate::transport::{Decryptor, GZIP_ENCODING, decode_body};

pub async fn decode_middleware(
    State(decryptor): State<Option<Arc<Decryptor>>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let compressed = request
        .headers()
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case(GZIP_ENCODING));

    if !compressed && decryptor.is_none() {
        return Ok(next.run(request).await);
    }

    let (mut parts, body) = request.into_parts();
    let raw = to_bytes(body, MAX_BODY_BYTES).await?;
    let decoded = decode_body(&raw, compressed, decryptor.as_deref())?;
    trace!("decoded {} body bytes into {}", raw.len(), decoded.len());

    parts.headers.remove(CONTENT_ENCODING);
    parts.headers.remove(CONTENT_LENGTH);

    Ok(next.run(Request::from_parts(parts, Body::from(decoded))).await)
}
