//! Request body codecs shared by the agent and the hub
//!
//! Outgoing bodies go through three layers, in this order:
//!
//! 1. **integrity**: HMAC of the plaintext JSON, sent in [`HASH_HEADER`]
//! 2. **crypto** (optional): RSA encryption with the hub's public key
//! 3. **compression**: gzip, announced with `Content-Encoding: gzip`
//!
//! The hub undoes them in reverse: decompress, decrypt, then verify the hash
//! before the JSON is parsed.

pub mod compression;
pub mod crypto;
pub mod integrity;

use thiserror::Error;

pub use compression::{GZIP_ENCODING, compress, decompress};
pub use crypto::{Decryptor, Encryptor};
pub use integrity::{HashAlgorithm, Signer};

/// Header carrying the hex-encoded body hash
pub const HASH_HEADER: &str = "HashSHA256";

/// Header carrying the sender's own IP address
pub const REAL_IP_HEADER: &str = "X-Real-IP";

/// Codec failures. None of them are transient: they mean a key mismatch,
/// a corrupted payload or a misconfiguration.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("compression failed: {0}")]
    Compression(String),

    #[error("decompression failed: {0}")]
    Decompression(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("body hash does not match")]
    IntegrityMismatch,
}

/// Encoded request body ready to be sent
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Gzip-compressed (and possibly encrypted) body
    pub body: Vec<u8>,

    /// Hash of the plaintext, present when a signer is configured
    pub hash: Option<String>,
}

/// Hash, encrypt and compress `payload`
pub fn encode_body(
    payload: &[u8],
    signer: Option<&Signer>,
    encryptor: Option<&Encryptor>,
) -> Result<Envelope, TransportError> {
    let hash = signer.map(|s| s.sign(payload));

    let body = match encryptor {
        Some(encryptor) => compress(&encryptor.encrypt(payload)?)?,
        None => compress(payload)?,
    };

    Ok(Envelope { body, hash })
}

/// Undo [`encode_body`] up to (not including) hash verification
///
/// `compressed` reflects the request's `Content-Encoding`. Empty bodies are
/// never decrypted.
pub fn decode_body(
    raw: &[u8],
    compressed: bool,
    decryptor: Option<&Decryptor>,
) -> Result<Vec<u8>, TransportError> {
    let body = if compressed {
        decompress(raw)?
    } else {
        raw.to_vec()
    };

    match decryptor {
        Some(decryptor) if !body.is_empty() => decryptor.decrypt(&body),
        _ => Ok(body),
    }
}
