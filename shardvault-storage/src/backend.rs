//! Persistence contract consumed by the vault.
//!
//! A backend hands out transactions. All reads and writes of one vault
//! operation happen inside a single transaction, and a transaction that is
//! dropped without [`VaultTransaction::commit`] is rolled back.
//!
//! Backends must serialize transactions that touch the same owner. Both
//! shipped backends serialize all transactions.

use crate::error::StorageResult;
use serde::{Deserialize, Serialize};
use shardvault_types::OwnerId;

/// `key_pairs` row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPairRecord {
    pub owner: OwnerId,
    pub algorithm: String,
    pub public_key: Vec<u8>,
    /// Private key as produced by the configured key custody.
    pub sealed_private_key: Vec<u8>,
    pub created_at: i64,
}

/// `wrapped_keys` row. One live row per owner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKeyRecord {
    pub owner: OwnerId,
    pub public_key: Vec<u8>,
    pub wrapped_master_key: Vec<u8>,
    /// Number of shards written alongside this key.
    pub shard_count: u32,
    pub created_at: i64,
}

/// `shards` row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardRecord {
    pub owner: OwnerId,
    pub index: u32,
    pub ciphertext: Vec<u8>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A transactional store for vault records.
pub trait VaultBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Opens a transaction. Blocks while another transaction is open.
    fn begin(&self) -> StorageResult<Box<dyn VaultTransaction + '_>>;
}

/// One unit of work against a [`VaultBackend`].
pub trait VaultTransaction {
    fn key_pair(&self, owner: &OwnerId) -> StorageResult<Option<KeyPairRecord>>;

    fn insert_key_pair(&mut self, record: &KeyPairRecord) -> StorageResult<()>;

    /// Returns the number of rows removed.
    fn delete_key_pair(&mut self, owner: &OwnerId) -> StorageResult<usize>;

    fn wrapped_key(&self, owner: &OwnerId) -> StorageResult<Option<WrappedKeyRecord>>;

    /// Inserts the row, replacing any existing row for the same owner.
    fn put_wrapped_key(&mut self, record: &WrappedKeyRecord) -> StorageResult<()>;

    fn delete_wrapped_key(&mut self, owner: &OwnerId) -> StorageResult<usize>;

    /// All shard rows for `owner`, ordered by index. Duplicates and gaps are
    /// returned as stored; validating the set is the caller's job.
    fn shards(&self, owner: &OwnerId) -> StorageResult<Vec<ShardRecord>>;

    fn insert_shard(&mut self, record: &ShardRecord) -> StorageResult<()>;

    fn delete_shards(&mut self, owner: &OwnerId) -> StorageResult<usize>;

    fn commit(self: Box<Self>) -> StorageResult<()>;

    fn rollback(self: Box<Self>) -> StorageResult<()>;
}
