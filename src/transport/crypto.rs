//! Optional RSA body encryption
//!
//! The agent encrypts with the hub's public key and the hub decrypts with the
//! matching private key. Bodies longer than one RSA block are split into
//! chunks of `key_size - 11` bytes (PKCS#1 v1.5 padding overhead), each
//! encrypted to exactly `key_size` bytes and concatenated.
//!
//! Keys are read from PEM, either PKCS#8 (`BEGIN PUBLIC KEY` /
//! `BEGIN PRIVATE KEY`) or PKCS#1 (`BEGIN RSA ...`).

use std::path::Path;

use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

use super::TransportError;

/// PKCS#1 v1.5 padding overhead per block
const PADDING_OVERHEAD: usize = 11;

fn read_pem(path: &Path) -> Result<String, TransportError> {
    std::fs::read_to_string(path).map_err(|e| {
        TransportError::InvalidKey(format!("failed to read {}: {e}", path.display()))
    })
}

/// Client side of the encryption layer
#[derive(Debug, Clone)]
pub struct Encryptor {
    key: RsaPublicKey,
}

impl Encryptor {
    pub fn new(key: RsaPublicKey) -> Self {
        Self { key }
    }

    pub fn from_pem(pem: &str) -> Result<Self, TransportError> {
        let key = RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map_err(|e| TransportError::InvalidKey(format!("not an RSA public key: {e}")))?;
        Ok(Self::new(key))
    }

    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        Self::from_pem(&read_pem(path.as_ref())?)
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, TransportError> {
        let block = self.key.size();
        let chunk_size = block - PADDING_OVERHEAD;
        let mut rng = rand::thread_rng();

        let mut out = Vec::with_capacity(plaintext.len().div_ceil(chunk_size) * block);
        for chunk in plaintext.chunks(chunk_size) {
            let encrypted = self
                .key
                .encrypt(&mut rng, Pkcs1v15Encrypt, chunk)
                .map_err(|e| TransportError::Encryption(e.to_string()))?;
            out.extend_from_slice(&encrypted);
        }
        Ok(out)
    }
}

/// Server side of the encryption layer
#[derive(Debug, Clone)]
pub struct Decryptor {
    key: RsaPrivateKey,
}

impl Decryptor {
    pub fn new(key: RsaPrivateKey) -> Self {
        Self { key }
    }

    pub fn from_pem(pem: &str) -> Result<Self, TransportError> {
        let key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| TransportError::InvalidKey(format!("not an RSA private key: {e}")))?;
        Ok(Self::new(key))
    }

    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        Self::from_pem(&read_pem(path.as_ref())?)
    }

    /// Encryptor for the matching public key
    pub fn encryptor(&self) -> Encryptor {
        Encryptor::new(RsaPublicKey::from(&self.key))
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, TransportError> {
        let block = self.key.size();
        if ciphertext.len() % block != 0 {
            return Err(TransportError::Decryption(format!(
                "ciphertext length {} is not a multiple of the {block}-byte key size",
                ciphertext.len()
            )));
        }

        let mut out = Vec::with_capacity(ciphertext.len());
        for chunk in ciphertext.chunks(block) {
            let decrypted = self
                .key
                .decrypt(Pkcs1v15Encrypt, chunk)
                .map_err(|e| TransportError::Decryption(e.to_string()))?;
            out.extend_from_slice(&decrypted);
        }
        Ok(out)
    }
}
