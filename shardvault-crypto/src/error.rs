//! Crypto error types.

use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// AEAD tag did not verify. Covers tampered ciphertext, tampered tag,
    /// wrong key and mismatched associated data alike.
    #[error("authentication failed (wrong key or tampered data)")]
    Authentication,

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("algorithm mismatch: expected {expected}, found {found}")]
    AlgorithmMismatch { expected: String, found: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
