//! Authenticated encryption for the license database blob.
//!
//! Wire format:
//!
//! ```text
//! [1 byte version][12 bytes nonce][N bytes ciphertext][16 bytes auth tag]
//! ```
//!
//! The AES-256-GCM key is derived from the master key with HKDF-SHA256, so the
//! raw master key is never used directly as a cipher key.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Current blob format version.
pub const BLOB_VERSION: u8 = 1;

const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;
const KEY_CONTEXT: &[u8] = b"licensehub:license-db";

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid master key: {0}")]
    InvalidKey(String),
    #[error("Blob too short or malformed")]
    InvalidFormat,
    #[error("Unsupported blob version: {0}")]
    UnsupportedVersion(u8),
    #[error("Encryption failed")]
    EncryptFailed,
    #[error("Decryption failed (wrong key or tampered data)")]
    DecryptFailed,
    #[error("Decrypted payload is not a valid license database: {0}")]
    InvalidPayload(String),
}

/// Master key protecting the license database at rest.
///
/// Supplied out-of-band (environment / secret store) as 32 base64-encoded bytes.
#[derive(Clone)]
pub struct StoreKey {
    cipher_key: [u8; 32],
    key_id: String,
}

impl std::fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreKey")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl StoreKey {
    pub fn from_bytes(master: [u8; 32]) -> Result<Self, CryptoError> {
        let hk = Hkdf::<Sha256>::new(None, &master);
        let mut cipher_key = [0u8; 32];
        hk.expand(KEY_CONTEXT, &mut cipher_key)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

        let digest = Sha256::digest(master);
        let key_id = hex::encode(&digest[..8]);

        Ok(Self { cipher_key, key_id })
    }

    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKey(format!("not base64: {}", e)))?;
        let master: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            CryptoError::InvalidKey(format!("expected 32 bytes, got {}", v.len()))
        })?;
        Self::from_bytes(master)
    }

    /// Generate a fresh random master key, returned base64-encoded.
    pub fn generate_base64() -> String {
        let mut master = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut master);
        BASE64.encode(master)
    }

    /// Non-secret identifier of this key, recorded in the database settings.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        encrypt(plaintext, self)
    }

    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
        decrypt(blob, self)
    }
}

/// Encrypt with a fresh random nonce; identical plaintexts never produce identical blobs.
pub fn encrypt(plaintext: &[u8], key: &StoreKey) -> Result<Vec<u8>, CryptoError> {
    let cipher =
        Aes256Gcm::new_from_slice(&key.cipher_key).map_err(|_| CryptoError::EncryptFailed)?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::EncryptFailed)?;

    let mut blob = Vec::with_capacity(1 + NONCE_SIZE + ciphertext.len());
    blob.push(BLOB_VERSION);
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Decrypt a blob produced by [`encrypt`]. Fails closed on any format or integrity error.
pub fn decrypt(blob: &[u8], key: &StoreKey) -> Result<Vec<u8>, CryptoError> {
    if blob.len() < 1 + NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::InvalidFormat);
    }

    let version = blob[0];
    if version != BLOB_VERSION {
        return Err(CryptoError::UnsupportedVersion(version));
    }

    let nonce = Nonce::from_slice(&blob[1..1 + NONCE_SIZE]);
    let cipher =
        Aes256Gcm::new_from_slice(&key.cipher_key).map_err(|_| CryptoError::DecryptFailed)?;

    cipher
        .decrypt(nonce, &blob[1 + NONCE_SIZE..])
        .map_err(|_| CryptoError::DecryptFailed)
}
