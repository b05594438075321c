//! Keyed body hashing
//!
//! Bodies are signed with HMAC over the plaintext JSON and the digest is sent
//! hex-encoded in the [`HASH_HEADER`](super::HASH_HEADER) header. Verification
//! uses the MAC's constant-time comparison.

use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};

use super::TransportError;

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// Hash function used under the HMAC
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

#[derive(Clone)]
enum KeyedMac {
    Sha256(HmacSha256),
    Sha512(HmacSha512),
}

/// Computes and verifies body hashes for one shared key
#[derive(Clone)]
pub struct Signer {
    mac: KeyedMac,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let algorithm = match self.mac {
            KeyedMac::Sha256(_) => HashAlgorithm::Sha256,
            KeyedMac::Sha512(_) => HashAlgorithm::Sha512,
        };
        f.debug_struct("Signer")
            .field("algorithm", &algorithm)
            .finish_non_exhaustive()
    }
}

impl Signer {
    /// HMAC-SHA256 signer
    pub fn new(key: &[u8]) -> Result<Self, TransportError> {
        Self::with_algorithm(key, HashAlgorithm::Sha256)
    }

    pub fn with_algorithm(key: &[u8], algorithm: HashAlgorithm) -> Result<Self, TransportError> {
        let invalid = |e: hmac::digest::InvalidLength| TransportError::InvalidKey(e.to_string());

        let mac = match algorithm {
            HashAlgorithm::Sha256 => KeyedMac::Sha256(HmacSha256::new_from_slice(key).map_err(invalid)?),
            HashAlgorithm::Sha512 => KeyedMac::Sha512(HmacSha512::new_from_slice(key).map_err(invalid)?),
        };
        Ok(Self { mac })
    }

    /// Hex-encoded MAC of `body`
    pub fn sign(&self, body: &[u8]) -> String {
        match &self.mac {
            KeyedMac::Sha256(mac) => {
                let mut mac = mac.clone();
                mac.update(body);
                hex::encode(mac.finalize().into_bytes())
            }
            KeyedMac::Sha512(mac) => {
                let mut mac = mac.clone();
                mac.update(body);
                hex::encode(mac.finalize().into_bytes())
            }
        }
    }

    /// Check `hash` (hex) against the MAC of `body`
    pub fn verify(&self, body: &[u8], hash: &str) -> Result<(), TransportError> {
        let expected = hex::decode(hash.trim()).map_err(|_| TransportError::IntegrityMismatch)?;

        let verified = match &self.mac {
            KeyedMac::Sha256(mac) => {
                let mut mac = mac.clone();
                mac.update(body);
                mac.verify_slice(&expected)
            }
            KeyedMac::Sha512(mac) => {
                let mut mac = mac.clone();
                mac.update(body);
                mac.verify_slice(&expected)
            }
        };

        verified.map_err(|_| TransportError::IntegrityMismatch)
    }
}
