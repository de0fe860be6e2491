//! Vault error taxonomy.
//!
//! Callers can always tell "no record" from "record present but damaged"
//! from "storage failed". Integrity failures (`UnwrapFailure`,
//! `AuthenticationFailure`) may indicate tampering and deserve an audit entry.

use shardvault_crypto::CryptoError;
use shardvault_storage::StorageError;
use shardvault_types::{OwnerId, OwnerIdError};
use thiserror::Error;

pub type VaultResult<T> = Result<T, VaultError>;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("no record for owner {0}")]
    NotFound(OwnerId),

    #[error("could not unwrap master key: {0}")]
    UnwrapFailure(String),

    #[error("shard {index} of owner {owner} failed authentication")]
    AuthenticationFailure { owner: OwnerId, index: u32 },

    #[error("corrupt record: {0}")]
    CorruptRecord(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("payload of {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("invalid shard count {0} (accepted range 2..=10)")]
    InvalidShardCount(u32),

    #[error("invalid owner id: {0}")]
    InvalidOwner(#[from] OwnerIdError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl VaultError {
    /// True for failures that suggest tampered or mismatched key material.
    pub fn is_integrity_violation(&self) -> bool {
        matches!(self, Self::UnwrapFailure(_) | Self::AuthenticationFailure { .. })
    }
}
