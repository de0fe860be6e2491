//! Shared types for ShardVault.
//!
//! Every persisted row (key pair, wrapped key, shard) belongs to exactly one
//! [`OwnerId`]. The id is opaque to the vault: it is whatever the account
//! layer uses to name a user or record.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum accepted owner id length in bytes.
pub const MAX_OWNER_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OwnerIdError {
    #[error("owner id must not be empty")]
    Empty,
    #[error("owner id exceeds {MAX_OWNER_LEN} bytes (got {0})")]
    TooLong(usize),
}

/// Opaque identifier of the owner of a vault record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerId(String);

impl OwnerId {
    /// Creates an owner id, rejecting empty or oversized values.
    pub fn new(id: impl Into<String>) -> Result<Self, OwnerIdError> {
        let id = id.into();
        if id.is_empty() {
            return Err(OwnerIdError::Empty);
        }
        if id.len() > MAX_OWNER_LEN {
            return Err(OwnerIdError::TooLong(id.len()));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for OwnerId {
    type Err = OwnerIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for OwnerId {
    type Error = OwnerIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for OwnerId {
    type Error = OwnerIdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OwnerId> for String {
    fn from(id: OwnerId) -> Self {
        id.0
    }
}

impl AsRef<str> for OwnerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Current wall-clock time as Unix milliseconds, the unit used for all row
/// timestamps.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
