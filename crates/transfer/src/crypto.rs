//! Per-transfer symmetric encryption and content checksums.
//!
//! Every transfer gets a fresh AES-256-GCM key. Each chunk is sealed under a
//! fresh random 96-bit nonce, so a (key, nonce) pair is never reused. The key
//! travels to the peer inside `transfer-start` as base64 of its raw bytes.

use std::path::Path;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{Engine, engine::general_purpose::STANDARD};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

/// Raw key length in bytes.
pub const KEY_LEN: usize = 32;

/// Nonce (IV) length in bytes.
pub const NONCE_LEN: usize = 12;

/// Read block size for whole-file checksums.
const CHECKSUM_BLOCK: usize = 64 * 1024;

/// Errors produced by the crypto helpers.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("invalid nonce length: expected {NONCE_LEN} bytes, got {0}")]
    InvalidNonce(usize),

    #[error("encryption failed")]
    Encryption,

    /// Authentication tag mismatch: tampered data, corrupted data or wrong key.
    #[error("decryption failed: authentication tag mismatch")]
    Decryption,
}

/// Symmetric key owned by exactly one transfer.
#[derive(Clone)]
pub struct TransferKey(Key<Aes256Gcm>);

impl TransferKey {
    /// Generates a fresh random key.
    pub fn generate() -> Self {
        Self(Aes256Gcm::generate_key(&mut OsRng))
    }

    /// Serializes the key for transmission to the peer.
    pub fn export(&self) -> String {
        STANDARD.encode(self.0.as_slice())
    }

    /// Parses a key produced by [`export`](Self::export).
    pub fn import(text: &str) -> Result<Self, CryptoError> {
        let bytes = STANDARD
            .decode(text.trim())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        if bytes.len() != KEY_LEN {
            return Err(CryptoError::InvalidKey(format!(
                "expected {KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self(Key::<Aes256Gcm>::clone_from_slice(&bytes)))
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(&self.0)
    }
}

impl std::fmt::Debug for TransferKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TransferKey(..)")
    }
}

/// Generates a fresh random key.
pub fn generate_key() -> TransferKey {
    TransferKey::generate()
}

/// Serializes a key for transmission to the peer.
pub fn export_key(key: &TransferKey) -> String {
    key.export()
}

/// Parses a key received from the peer.
pub fn import_key(text: &str) -> Result<TransferKey, CryptoError> {
    TransferKey::import(text)
}

/// Seals `plaintext` under `key` with a fresh random nonce.
///
/// Returns `(ciphertext, nonce)`; the ciphertext carries the 16-byte tag.
pub fn encrypt(plaintext: &[u8], key: &TransferKey) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = key
        .cipher()
        .encrypt(&nonce, plaintext)
        .map_err(|_| CryptoError::Encryption)?;
    Ok((ciphertext, nonce.to_vec()))
}

/// Opens a chunk sealed by [`encrypt`].
///
/// Never returns unauthenticated plaintext: any tag mismatch is
/// [`CryptoError::Decryption`].
pub fn decrypt(ciphertext: &[u8], key: &TransferKey, nonce: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if nonce.len() != NONCE_LEN {
        return Err(CryptoError::InvalidNonce(nonce.len()));
    }
    key.cipher()
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::Decryption)
}

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Returns `true` if `expected` is the hex SHA-256 of `data`.
///
/// Hex case is ignored; the comparison itself is constant-time.
pub fn verify_checksum(data: &[u8], expected: &str) -> bool {
    let actual = checksum_bytes(data);
    if actual.len() != expected.len() {
        return false;
    }
    let mut diff = 0u8;
    for (a, b) in actual.bytes().zip(expected.bytes()) {
        diff |= a ^ b.to_ascii_lowercase();
    }
    diff == 0
}

/// Computes SHA-256 of an entire file without loading it into memory.
pub async fn calculate_file_checksum(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHECKSUM_BLOCK];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
