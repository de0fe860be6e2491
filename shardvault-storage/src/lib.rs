//! Storage layer for ShardVault.
//!
//! Persists the three vault tables behind the [`VaultBackend`] trait:
//!
//! - `key_pairs`: one asymmetric key pair per owner
//! - `wrapped_keys`: the owner's live wrapped master key
//! - `shards`: the owner's encrypted shards, ordered by index
//!
//! [`DuckDbBackend`] stores them in a DuckDB file; [`MemoryBackend`] keeps them
//! in process memory.

mod backend;
mod duckdb_backend;
mod error;
mod memory;

pub use backend::{KeyPairRecord, ShardRecord, VaultBackend, VaultTransaction, WrappedKeyRecord};
pub use duckdb_backend::DuckDbBackend;
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;

use tracing::warn;

/// Open a DuckDB connection with stale WAL recovery and resource limits.
///
/// If the initial open fails and a `.wal` file exists alongside the database,
/// it is removed and the open is retried once. This handles the common case
/// where an unclean shutdown leaves a WAL file that prevents reopening.
///
/// `memory_limit` and `threads` cap per-database resource usage (DuckDB defaults
/// to ~80% of system RAM and all cores).
pub fn open_duckdb_with_wal_recovery(
    path: &std::path::Path,
    memory_limit: &str,
    threads: u32,
) -> StorageResult<duckdb::Connection> {
    let conn = match duckdb::Connection::open(path) {
        Ok(c) => c,
        Err(first_err) => {
            let wal_path = path.with_extension(
                path.extension()
                    .map(|ext| format!("{}.wal", ext.to_string_lossy()))
                    .unwrap_or_else(|| "wal".to_string()),
            );
            if wal_path.exists() {
                warn!(
                    "DuckDB open failed, removing stale WAL and retrying: {}",
                    wal_path.display()
                );
                if std::fs::remove_file(&wal_path).is_ok() {
                    let c = duckdb::Connection::open(path)?;
                    apply_resource_limits(&c, memory_limit, threads)?;
                    return Ok(c);
                }
            }
            return Err(first_err.into());
        }
    };
    apply_resource_limits(&conn, memory_limit, threads)?;
    Ok(conn)
}

/// Apply memory and thread limits to a DuckDB connection.
fn apply_resource_limits(
    conn: &duckdb::Connection,
    memory_limit: &str,
    threads: u32,
) -> StorageResult<()> {
    if memory_limit.is_empty() || !memory_limit.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(StorageError::Backend(format!(
            "invalid DuckDB memory limit: {memory_limit:?}"
        )));
    }
    conn.execute_batch(&format!(
        "PRAGMA memory_limit='{}'; PRAGMA threads={};",
        memory_limit, threads
    ))?;
    Ok(())
}
