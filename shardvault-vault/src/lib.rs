//! Sharded, envelope-encrypted record vault.
//!
//! [`VaultStore`] turns a serializable payload into a set of independently
//! encrypted shards plus a wrapped master key, persists them through a
//! [`shardvault_storage::VaultBackend`], and reverses the process on read.
//!
//! ```text
//! payload ──json──▶ bytes ──split──▶ shards ──AEAD(master key)──▶ shard rows
//!                                  master key ──KEM wrap(public key)──▶ wrapped key row
//! ```
//!
//! Integrity failures are reported as [`VaultError::UnwrapFailure`] or
//! [`VaultError::AuthenticationFailure`]; a record with missing or duplicate
//! shards is [`VaultError::CorruptRecord`].

mod config;
mod error;
pub mod sharding;
mod store;

pub use config::VaultConfig;
pub use error::{VaultError, VaultResult};
pub use sharding::{MAX_SHARDS, MIN_SHARDS, ShardCount, combine, split};
pub use store::{RecordInfo, VaultStore};
