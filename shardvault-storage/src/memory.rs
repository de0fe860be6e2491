//! In-memory vault persistence, mainly for tests and development.
//!
//! A transaction takes the table lock for its whole lifetime. Reads go to the
//! committed tables until the first write, which snapshots them; commit swaps
//! the snapshot in and dropping the transaction discards it. Read-only
//! transactions therefore never copy, while the first write in a transaction
//! costs a copy of the whole store.

use crate::backend::{KeyPairRecord, ShardRecord, VaultBackend, VaultTransaction, WrappedKeyRecord};
use crate::error::{StorageError, StorageResult};
use shardvault_types::OwnerId;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Clone, Debug, Default)]
struct Tables {
    key_pairs: HashMap<OwnerId, KeyPairRecord>,
    wrapped_keys: HashMap<OwnerId, WrappedKeyRecord>,
    shards: HashMap<OwnerId, Vec<ShardRecord>>,
}

/// Thread-safe in-memory backend.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: Mutex<Tables>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of shard rows across all owners.
    pub fn total_shards(&self) -> StorageResult<usize> {
        let tables = self.tables.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(tables.shards.values().map(Vec::len).sum())
    }
}

impl VaultBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn begin(&self) -> StorageResult<Box<dyn VaultTransaction + '_>> {
        let guard = self.tables.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(Box::new(MemoryTransaction {
            guard,
            working: None,
        }))
    }
}

struct MemoryTransaction<'a> {
    guard: MutexGuard<'a, Tables>,
    /// Copy-on-write snapshot, taken on the first write.
    working: Option<Tables>,
}

impl MemoryTransaction<'_> {
    fn tables(&self) -> &Tables {
        self.working.as_ref().unwrap_or(&*self.guard)
    }

    fn tables_mut(&mut self) -> &mut Tables {
        let guard = &self.guard;
        self.working.get_or_insert_with(|| (**guard).clone())
    }
}

impl VaultTransaction for MemoryTransaction<'_> {
    fn key_pair(&self, owner: &OwnerId) -> StorageResult<Option<KeyPairRecord>> {
        Ok(self.tables().key_pairs.get(owner).cloned())
    }

    fn insert_key_pair(&mut self, record: &KeyPairRecord) -> StorageResult<()> {
        if self.tables().key_pairs.contains_key(&record.owner) {
            return Err(StorageError::Backend(format!(
                "key pair already exists for owner {}",
                record.owner
            )));
        }
        self.tables_mut()
            .key_pairs
            .insert(record.owner.clone(), record.clone());
        Ok(())
    }

    fn delete_key_pair(&mut self, owner: &OwnerId) -> StorageResult<usize> {
        Ok(usize::from(self.tables_mut().key_pairs.remove(owner).is_some()))
    }

    fn wrapped_key(&self, owner: &OwnerId) -> StorageResult<Option<WrappedKeyRecord>> {
        Ok(self.tables().wrapped_keys.get(owner).cloned())
    }

    fn put_wrapped_key(&mut self, record: &WrappedKeyRecord) -> StorageResult<()> {
        self.tables_mut()
            .wrapped_keys
            .insert(record.owner.clone(), record.clone());
        Ok(())
    }

    fn delete_wrapped_key(&mut self, owner: &OwnerId) -> StorageResult<usize> {
        Ok(usize::from(self.tables_mut().wrapped_keys.remove(owner).is_some()))
    }

    fn shards(&self, owner: &OwnerId) -> StorageResult<Vec<ShardRecord>> {
        let mut rows = self.tables().shards.get(owner).cloned().unwrap_or_default();
        rows.sort_by_key(|r| r.index);
        Ok(rows)
    }

    fn insert_shard(&mut self, record: &ShardRecord) -> StorageResult<()> {
        self.tables_mut()
            .shards
            .entry(record.owner.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    fn delete_shards(&mut self, owner: &OwnerId) -> StorageResult<usize> {
        Ok(self.tables_mut().shards.remove(owner).map_or(0, |rows| rows.len()))
    }

    fn commit(mut self: Box<Self>) -> StorageResult<()> {
        if let Some(working) = self.working.take() {
            *self.guard = working;
        }
        Ok(())
    }

    fn rollback(self: Box<Self>) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> OwnerId {
        OwnerId::new("u1").unwrap()
    }

    #[test]
    fn reads_do_not_snapshot() {
        let backend = MemoryBackend::new();
        let guard = backend.tables.lock().unwrap();
        let tx = MemoryTransaction {
            guard,
            working: None,
        };
        assert!(tx.key_pair(&owner()).unwrap().is_none());
        assert!(tx.shards(&owner()).unwrap().is_empty());
        assert!(tx.working.is_none());
    }

    #[test]
    fn first_write_snapshots_and_commit_publishes() {
        let backend = MemoryBackend::new();
        let mut tx = Box::new(MemoryTransaction {
            guard: backend.tables.lock().unwrap(),
            working: None,
        });
        tx.insert_shard(&ShardRecord {
            owner: owner(),
            index: 0,
            ciphertext: vec![1],
            created_at: 0,
            updated_at: 0,
        })
        .unwrap();
        assert!(tx.working.is_some());
        assert!(tx.guard.shards.is_empty());
        assert_eq!(tx.shards(&owner()).unwrap().len(), 1);
        tx.commit().unwrap();

        assert_eq!(backend.total_shards().unwrap(), 1);
    }
}
