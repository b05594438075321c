//! Gzip body compression
//!
//! The outermost transform on the way out and the first one undone on the
//! way in. A zero-length body still produces a complete gzip stream that
//! decompresses back to nothing.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use super::TransportError;

/// Value of the `Content-Encoding` header for compressed bodies
pub const GZIP_ENCODING: &str = "gzip";

pub fn compress(data: &[u8]) -> Result<Vec<u8>, TransportError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());

    encoder
        .write_all(data)
        .map_err(|e| TransportError::Compression(format!("failed to write data: {e}")))?;

    encoder
        .finish()
        .map_err(|e| TransportError::Compression(format!("failed to finish stream: {e}")))
}

pub fn decompress(compressed: &[u8]) -> Result<Vec<u8>, TransportError> {
    let mut decoder = GzDecoder::new(compressed);
    let mut decompressed = Vec::new();

    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| TransportError::Decompression(e.to_string()))?;

    Ok(decompressed)
}
