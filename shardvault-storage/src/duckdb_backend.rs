//! DuckDB-backed vault persistence.
//!
//! Transactions hold the connection mutex from `BEGIN` until `COMMIT` or
//! `ROLLBACK`, which serializes all vault operations on one database.
//! `wrapped_keys` and `shards` carry no unique constraint: a rewrite deletes
//! and re-inserts rows with the same keys inside one transaction, and the
//! vault validates shard sets on read.

use crate::backend::{KeyPairRecord, ShardRecord, VaultBackend, VaultTransaction, WrappedKeyRecord};
use crate::error::{StorageError, StorageResult};
use duckdb::{Connection, params};
use shardvault_types::OwnerId;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

/// Vault persistence in a DuckDB database.
#[derive(Clone)]
pub struct DuckDbBackend {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbBackend {
    /// Opens or creates a database at `path` with default resource limits.
    pub fn open(path: &Path) -> StorageResult<Self> {
        Self::open_with_limits(path, "256MB", 2)
    }

    /// Opens or creates a database at `path` with explicit resource limits.
    pub fn open_with_limits(path: &Path, memory_limit: &str, threads: u32) -> StorageResult<Self> {
        let conn = crate::open_duckdb_with_wal_recovery(path, memory_limit, threads)?;
        initialize_vault_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_vault_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl VaultBackend for DuckDbBackend {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn begin(&self) -> StorageResult<Box<dyn VaultTransaction + '_>> {
        let conn = self.conn.lock().map_err(|_| StorageError::LockPoisoned)?;
        conn.execute_batch("BEGIN TRANSACTION")?;
        Ok(Box::new(DuckDbTransaction {
            conn,
            finished: false,
        }))
    }
}

struct DuckDbTransaction<'a> {
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

impl VaultTransaction for DuckDbTransaction<'_> {
    fn key_pair(&self, owner: &OwnerId) -> StorageResult<Option<KeyPairRecord>> {
        let result = self.conn.query_row(
            "SELECT algorithm, public_key, sealed_private_key, created_at \
             FROM key_pairs WHERE owner = ?",
            params![owner.as_str()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Vec<u8>>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            },
        );

        match result {
            Ok((algorithm, public_key, sealed_private_key, created_at)) => Ok(Some(KeyPairRecord {
                owner: owner.clone(),
                algorithm,
                public_key,
                sealed_private_key,
                created_at,
            })),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn insert_key_pair(&mut self, record: &KeyPairRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO key_pairs (owner, algorithm, public_key, sealed_private_key, created_at) \
             VALUES (?, ?, ?, ?, ?)",
            params![
                record.owner.as_str(),
                record.algorithm,
                record.public_key,
                record.sealed_private_key,
                record.created_at,
            ],
        )?;
        Ok(())
    }

    fn delete_key_pair(&mut self, owner: &OwnerId) -> StorageResult<usize> {
        Ok(self
            .conn
            .execute("DELETE FROM key_pairs WHERE owner = ?", params![owner.as_str()])?)
    }

    fn wrapped_key(&self, owner: &OwnerId) -> StorageResult<Option<WrappedKeyRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT public_key, wrapped_master_key, shard_count, created_at \
             FROM wrapped_keys WHERE owner = ? ORDER BY created_at DESC",
        )?;
        let rows = stmt
            .query_map(params![owner.as_str()], |row| {
                Ok((
                    row.get::<_, Vec<u8>>(0)?,
                    row.get::<_, Vec<u8>>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        if rows.len() > 1 {
            return Err(StorageError::InvalidRow {
                table: "wrapped_keys",
                reason: format!("{} live rows for owner {owner}", rows.len()),
            });
        }

        let Some((public_key, wrapped_master_key, shard_count, created_at)) =
            rows.into_iter().next()
        else {
            return Ok(None);
        };

        let shard_count = u32::try_from(shard_count).map_err(|_| StorageError::InvalidRow {
            table: "wrapped_keys",
            reason: format!("shard_count out of range: {shard_count}"),
        })?;

        Ok(Some(WrappedKeyRecord {
            owner: owner.clone(),
            public_key,
            wrapped_master_key,
            shard_count,
            created_at,
        }))
    }

    fn put_wrapped_key(&mut self, record: &WrappedKeyRecord) -> StorageResult<()> {
        self.conn.execute(
            "DELETE FROM wrapped_keys WHERE owner = ?",
            params![record.owner.as_str()],
        )?;
        self.conn.execute(
            "INSERT INTO wrapped_keys (owner, public_key, wrapped_master_key, shard_count, created_at) \
             VALUES (?, ?, ?, ?, ?)",
            params![
                record.owner.as_str(),
                record.public_key,
                record.wrapped_master_key,
                i64::from(record.shard_count),
                record.created_at,
            ],
        )?;
        Ok(())
    }

    fn delete_wrapped_key(&mut self, owner: &OwnerId) -> StorageResult<usize> {
        Ok(self
            .conn
            .execute("DELETE FROM wrapped_keys WHERE owner = ?", params![owner.as_str()])?)
    }

    fn shards(&self, owner: &OwnerId) -> StorageResult<Vec<ShardRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT shard_index, ciphertext, created_at, updated_at \
             FROM shards WHERE owner = ? ORDER BY shard_index",
        )?;
        let rows = stmt
            .query_map(params![owner.as_str()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Vec<u8>>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(index, ciphertext, created_at, updated_at)| {
                let index = u32::try_from(index).map_err(|_| StorageError::InvalidRow {
                    table: "shards",
                    reason: format!("shard_index out of range: {index}"),
                })?;
                Ok(ShardRecord {
                    owner: owner.clone(),
                    index,
                    ciphertext,
                    created_at,
                    updated_at,
                })
            })
            .collect()
    }

    fn insert_shard(&mut self, record: &ShardRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO shards (owner, shard_index, ciphertext, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
            params![
                record.owner.as_str(),
                i64::from(record.index),
                record.ciphertext,
                record.created_at,
                record.updated_at,
            ],
        )?;
        Ok(())
    }

    fn delete_shards(&mut self, owner: &OwnerId) -> StorageResult<usize> {
        Ok(self
            .conn
            .execute("DELETE FROM shards WHERE owner = ?", params![owner.as_str()])?)
    }

    fn commit(mut self: Box<Self>) -> StorageResult<()> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> StorageResult<()> {
        self.finished = true;
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

impl Drop for DuckDbTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!("rollback of abandoned vault transaction failed: {e}");
            }
        }
    }
}

fn initialize_vault_schema(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS key_pairs (
            owner VARCHAR PRIMARY KEY,
            algorithm VARCHAR NOT NULL,
            public_key BLOB NOT NULL,
            sealed_private_key BLOB NOT NULL,
            created_at BIGINT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS wrapped_keys (
            owner VARCHAR NOT NULL,
            public_key BLOB NOT NULL,
            wrapped_master_key BLOB NOT NULL,
            shard_count INTEGER NOT NULL,
            created_at BIGINT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_wrapped_keys_owner ON wrapped_keys(owner);

        CREATE TABLE IF NOT EXISTS shards (
            owner VARCHAR NOT NULL,
            shard_index INTEGER NOT NULL,
            ciphertext BLOB NOT NULL,
            created_at BIGINT NOT NULL,
            updated_at BIGINT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_shards_owner ON shards(owner, shard_index);
        "#,
    )?;
    Ok(())
}
