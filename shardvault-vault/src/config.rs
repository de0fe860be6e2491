//! Vault configuration.

use crate::error::{VaultError, VaultResult};
use crate::sharding::ShardCount;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for a [`crate::VaultStore`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Number of shards per record. Out-of-range values are clamped to 2..=10.
    pub shard_count: ShardCount,

    /// Largest serialized payload accepted by `store` / `update`, in bytes.
    pub max_payload_bytes: usize,

    /// DuckDB `memory_limit` pragma for file-backed vaults.
    pub db_memory_limit: String,

    /// DuckDB `threads` pragma for file-backed vaults.
    pub db_threads: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            shard_count: ShardCount::default(),
            max_payload_bytes: 16 * 1024 * 1024, // 16 MiB
            db_memory_limit: "256MB".to_string(),
            db_threads: 2,
        }
    }
}

impl VaultConfig {
    /// Parses a JSON config; absent fields take their defaults.
    pub fn from_json(json: &str) -> VaultResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON config file.
    pub fn load(path: &Path) -> VaultResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| VaultError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    pub fn with_shard_count(mut self, n: u32) -> Self {
        self.shard_count = ShardCount::new(n);
        self
    }

    pub fn with_max_payload_bytes(mut self, limit: usize) -> Self {
        self.max_payload_bytes = limit;
        self
    }

    pub fn validate(&self) -> VaultResult<()> {
        if self.max_payload_bytes == 0 {
            return Err(VaultError::Config("max_payload_bytes must be positive".into()));
        }
        if self.db_threads == 0 {
            return Err(VaultError::Config("db_threads must be positive".into()));
        }
        Ok(())
    }
}
