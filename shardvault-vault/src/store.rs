//! Record orchestration: serialize, shard, encrypt, wrap and persist.
//!
//! Each write draws a fresh master key, encrypts every shard under it and
//! wraps it for the owner's public key. The key pair, wrapped key and shard
//! rows are written in one backend transaction, so a record is either fully
//! replaced or left untouched.

use crate::config::VaultConfig;
use crate::error::{VaultError, VaultResult};
use crate::sharding::{MAX_SHARDS, MIN_SHARDS, ShardCount, combine, split};
use serde::Serialize;
use serde::de::DeserializeOwned;
use shardvault_crypto::{
    EncryptedData, Envelope, Kem, KeyCustody, MlKem1024Kem, StoredKeyCustody, SymmetricKey,
    decrypt_with_aad, encrypt_with_aad,
};
use shardvault_storage::{
    DuckDbBackend, KeyPairRecord, MemoryBackend, ShardRecord, VaultBackend, VaultTransaction,
    WrappedKeyRecord,
};
use shardvault_types::{OwnerId, now_millis};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

const SHARD_AAD_DOMAIN: &[u8] = b"shardvault/shard/v1";
const WRAP_CONTEXT_DOMAIN: &[u8] = b"shardvault/master-key/v1:";

/// Metadata about a stored record, read without decrypting anything.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RecordInfo {
    pub owner: OwnerId,
    /// KEM that wrapped the master key.
    pub algorithm: String,
    pub shard_count: u32,
    /// When the owner's key pair was generated.
    pub key_created_at: i64,
    /// When the record was first written.
    pub created_at: i64,
    /// When the record was last rewritten.
    pub updated_at: i64,
}

/// Envelope-encrypted, sharded record store.
pub struct VaultStore {
    backend: Arc<dyn VaultBackend>,
    envelope: Envelope,
    custody: Arc<dyn KeyCustody>,
    config: VaultConfig,
}

impl VaultStore {
    pub fn new(
        backend: Arc<dyn VaultBackend>,
        kem: Arc<dyn Kem>,
        custody: Arc<dyn KeyCustody>,
        config: VaultConfig,
    ) -> Self {
        info!(
            backend = backend.name(),
            kem = kem.algorithm(),
            custody = custody.name(),
            shard_count = config.shard_count.get(),
            "vault store ready"
        );
        Self {
            backend,
            envelope: Envelope::new(kem),
            custody,
            config,
        }
    }

    /// Opens a DuckDB-backed store with ML-KEM-1024 and stored-key custody.
    pub fn open(path: &Path, config: VaultConfig) -> VaultResult<Self> {
        config.validate()?;
        let backend =
            DuckDbBackend::open_with_limits(path, &config.db_memory_limit, config.db_threads)?;
        Ok(Self::new(
            Arc::new(backend),
            Arc::new(MlKem1024Kem),
            Arc::new(StoredKeyCustody),
            config,
        ))
    }

    /// A store over [`MemoryBackend`], for tests and development.
    pub fn in_memory(config: VaultConfig) -> VaultResult<Self> {
        config.validate()?;
        Ok(Self::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(MlKem1024Kem),
            Arc::new(StoredKeyCustody),
            config,
        ))
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Stores `payload` for `owner`, replacing any existing record.
    pub fn store<T: Serialize + ?Sized>(&self, owner: &OwnerId, payload: &T) -> VaultResult<()> {
        self.write_record(owner, payload, "store")
    }

    /// Replaces the owner's record. Old shards are deleted and new ones
    /// inserted in the same transaction; on failure the old record survives.
    pub fn update<T: Serialize + ?Sized>(&self, owner: &OwnerId, payload: &T) -> VaultResult<()> {
        self.write_record(owner, payload, "update")
    }

    /// Reconstructs and deserializes the owner's record.
    pub fn retrieve<T: DeserializeOwned>(&self, owner: &OwnerId) -> VaultResult<T> {
        let raw = self.retrieve_raw(owner)?;
        serde_json::from_slice(&raw).map_err(|e| {
            let err = VaultError::CorruptRecord(format!(
                "owner {owner}: reconstructed payload does not deserialize: {e}"
            ));
            audit(owner, &err);
            err
        })
    }

    /// Reconstructs the owner's record as serialized JSON bytes.
    pub fn retrieve_raw(&self, owner: &OwnerId) -> VaultResult<Zeroizing<Vec<u8>>> {
        let (key_pair, wrapped, shards) = {
            let tx = self.backend.begin()?;
            let rows = (tx.key_pair(owner)?, tx.wrapped_key(owner)?, tx.shards(owner)?);
            tx.rollback()?;
            rows
        };

        let (Some(key_pair), Some(wrapped)) = (key_pair, wrapped) else {
            return Err(VaultError::NotFound(owner.clone()));
        };

        let result = self.reconstruct(owner, &key_pair, &wrapped, &shards);
        if let Err(err) = &result {
            audit(owner, err);
        }
        let plaintext = result?;

        debug!(owner = %owner, shards = shards.len(), bytes = plaintext.len(), "record retrieved");
        Ok(plaintext)
    }

    /// Removes the owner's shards, wrapped key and key pair. Deleting an
    /// absent record is not an error.
    pub fn delete(&self, owner: &OwnerId) -> VaultResult<()> {
        let (shards, wrapped, key_pairs) = self.in_transaction(|tx| {
            Ok((
                tx.delete_shards(owner)?,
                tx.delete_wrapped_key(owner)?,
                tx.delete_key_pair(owner)?,
            ))
        })?;
        debug!(owner = %owner, shards, wrapped, key_pairs, "record deleted");
        Ok(())
    }

    /// Whether the owner has a live record.
    pub fn exists(&self, owner: &OwnerId) -> VaultResult<bool> {
        let tx = self.backend.begin()?;
        let present = tx.wrapped_key(owner)?.is_some();
        tx.rollback()?;
        Ok(present)
    }

    pub fn describe(&self, owner: &OwnerId) -> VaultResult<RecordInfo> {
        let (key_pair, wrapped, shards) = {
            let tx = self.backend.begin()?;
            let rows = (tx.key_pair(owner)?, tx.wrapped_key(owner)?, tx.shards(owner)?);
            tx.rollback()?;
            rows
        };

        let (Some(key_pair), Some(wrapped)) = (key_pair, wrapped) else {
            return Err(VaultError::NotFound(owner.clone()));
        };

        Ok(RecordInfo {
            owner: owner.clone(),
            algorithm: key_pair.algorithm,
            shard_count: wrapped.shard_count,
            key_created_at: key_pair.created_at,
            created_at: shards.iter().map(|s| s.created_at).min().unwrap_or(wrapped.created_at),
            updated_at: shards.iter().map(|s| s.updated_at).max().unwrap_or(wrapped.created_at),
        })
    }

    fn write_record<T: Serialize + ?Sized>(
        &self,
        owner: &OwnerId,
        payload: &T,
        operation: &'static str,
    ) -> VaultResult<()> {
        let plaintext = Zeroizing::new(serde_json::to_vec(payload)?);
        if plaintext.len() > self.config.max_payload_bytes {
            return Err(VaultError::PayloadTooLarge {
                size: plaintext.len(),
                limit: self.config.max_payload_bytes,
            });
        }

        let master_key = SymmetricKey::generate();
        let shard_count = self.config.shard_count;
        let sealed = seal_shards(owner, &plaintext, &master_key, shard_count)?;

        let replaced = self.in_transaction(|tx| {
            let public_key = self.load_or_create_key_pair(tx, owner)?;
            let context = wrap_context(owner);
            let wrapped_master_key = self.envelope.wrap(&master_key, &public_key, &context)?;

            let now = now_millis();
            let previous = tx.shards(owner)?;
            let created_at = previous.iter().map(|s| s.created_at).min().unwrap_or(now);

            let replaced = tx.delete_shards(owner)?;
            tx.put_wrapped_key(&WrappedKeyRecord {
                owner: owner.clone(),
                public_key,
                wrapped_master_key,
                shard_count: shard_count.get(),
                created_at: now,
            })?;
            for (index, ciphertext) in (0u32..).zip(sealed) {
                tx.insert_shard(&ShardRecord {
                    owner: owner.clone(),
                    index,
                    ciphertext,
                    created_at,
                    updated_at: now,
                })?;
            }
            Ok(replaced)
        })?;

        debug!(
            owner = %owner,
            operation,
            shards = shard_count.get(),
            replaced,
            bytes = plaintext.len(),
            "record written"
        );
        Ok(())
    }

    /// Returns the owner's public key, generating and persisting a key pair
    /// on first write.
    fn load_or_create_key_pair(
        &self,
        tx: &mut dyn VaultTransaction,
        owner: &OwnerId,
    ) -> VaultResult<Vec<u8>> {
        if let Some(existing) = tx.key_pair(owner)? {
            if existing.algorithm != self.envelope.algorithm() {
                return Err(VaultError::Crypto(
                    shardvault_crypto::CryptoError::AlgorithmMismatch {
                        expected: self.envelope.algorithm().to_string(),
                        found: existing.algorithm,
                    },
                ));
            }
            return Ok(existing.public_key);
        }

        let pair = self.envelope.generate_key_pair()?;
        let sealed_private_key = self.custody.seal(owner.as_str(), &pair.private_key)?;
        tx.insert_key_pair(&KeyPairRecord {
            owner: owner.clone(),
            algorithm: self.envelope.algorithm().to_string(),
            public_key: pair.public_key.clone(),
            sealed_private_key,
            created_at: now_millis(),
        })?;
        info!(owner = %owner, algorithm = self.envelope.algorithm(), "generated key pair");
        Ok(pair.public_key)
    }

    fn reconstruct(
        &self,
        owner: &OwnerId,
        key_pair: &KeyPairRecord,
        wrapped: &WrappedKeyRecord,
        shards: &[ShardRecord],
    ) -> VaultResult<Zeroizing<Vec<u8>>> {
        if wrapped.public_key != key_pair.public_key {
            return Err(VaultError::UnwrapFailure(format!(
                "owner {owner}: wrapped key was sealed for a different public key"
            )));
        }

        let private_key = self
            .custody
            .open(owner.as_str(), &key_pair.sealed_private_key)
            .map_err(|e| VaultError::UnwrapFailure(format!("owner {owner}: private key: {e}")))?;
        let master_key = self
            .envelope
            .unwrap(&wrapped.wrapped_master_key, &private_key, &wrap_context(owner))
            .map_err(|e| VaultError::UnwrapFailure(format!("owner {owner}: {e}")))?;

        if shards.is_empty() {
            return Err(VaultError::NotFound(owner.clone()));
        }
        check_complete(owner, shards, wrapped.shard_count)?;

        let mut plain = Vec::with_capacity(shards.len());
        for shard in shards {
            let aad = shard_aad(owner, shard.index, wrapped.shard_count);
            let auth_failure = || VaultError::AuthenticationFailure {
                owner: owner.clone(),
                index: shard.index,
            };
            let data = EncryptedData::from_bytes(&shard.ciphertext).map_err(|_| auth_failure())?;
            plain.push(decrypt_with_aad(&master_key, &data, &aad).map_err(|_| auth_failure())?);
        }

        let views: Vec<&[u8]> = plain.iter().map(|p| p.as_slice()).collect();
        Ok(Zeroizing::new(combine(&views)))
    }

    /// Runs `work` in one backend transaction, committing on success and
    /// rolling back on any error.
    fn in_transaction<R>(
        &self,
        work: impl FnOnce(&mut dyn VaultTransaction) -> VaultResult<R>,
    ) -> VaultResult<R> {
        let mut tx = self.backend.begin()?;
        match work(&mut *tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!("rollback failed after {err}: {rollback_err}");
                }
                Err(err)
            }
        }
    }
}

/// Splits and encrypts `plaintext`, returning the serialized shard triples in
/// index order.
fn seal_shards(
    owner: &OwnerId,
    plaintext: &[u8],
    master_key: &SymmetricKey,
    shard_count: ShardCount,
) -> VaultResult<Vec<Vec<u8>>> {
    let total = shard_count.get();
    (0u32..)
        .zip(split(plaintext, shard_count))
        .map(|(index, chunk)| -> VaultResult<Vec<u8>> {
            let encrypted = encrypt_with_aad(master_key, chunk, &shard_aad(owner, index, total))?;
            Ok(encrypted.to_bytes())
        })
        .collect()
}

/// Shard indices must be exactly `0..expected`.
fn check_complete(owner: &OwnerId, shards: &[ShardRecord], expected: u32) -> VaultResult<()> {
    if !(MIN_SHARDS..=MAX_SHARDS).contains(&expected) {
        return Err(VaultError::CorruptRecord(format!(
            "owner {owner}: recorded shard count {expected} out of range"
        )));
    }
    if shards.len() != expected as usize {
        return Err(VaultError::CorruptRecord(format!(
            "owner {owner}: expected {expected} shards, found {}",
            shards.len()
        )));
    }
    for (position, shard) in (0u32..).zip(shards) {
        if shard.index != position {
            return Err(VaultError::CorruptRecord(format!(
                "owner {owner}: shard index {} at position {position}",
                shard.index
            )));
        }
    }
    Ok(())
}

// Length-prefixed owner so that ("ab", 1) and ("a", ...) never collide.
fn shard_aad(owner: &OwnerId, index: u32, total: u32) -> Vec<u8> {
    let owner = owner.as_bytes();
    let mut aad = Vec::with_capacity(SHARD_AAD_DOMAIN.len() + 12 + owner.len());
    aad.extend_from_slice(SHARD_AAD_DOMAIN);
    aad.extend_from_slice(&(owner.len() as u32).to_be_bytes());
    aad.extend_from_slice(owner);
    aad.extend_from_slice(&index.to_be_bytes());
    aad.extend_from_slice(&total.to_be_bytes());
    aad
}

fn wrap_context(owner: &OwnerId) -> Vec<u8> {
    let mut context = WRAP_CONTEXT_DOMAIN.to_vec();
    context.extend_from_slice(owner.as_bytes());
    context
}

fn audit(owner: &OwnerId, err: &VaultError) {
    if err.is_integrity_violation() || matches!(err, VaultError::CorruptRecord(_)) {
        warn!(owner = %owner, error = %err, "record integrity check failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(id: &str) -> OwnerId {
        OwnerId::new(id).unwrap()
    }

    fn shard(index: u32) -> ShardRecord {
        ShardRecord {
            owner: owner("u1"),
            index,
            ciphertext: Vec::new(),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn shard_aad_separates_owner_and_position() {
        assert_ne!(shard_aad(&owner("u1"), 0, 3), shard_aad(&owner("u2"), 0, 3));
        assert_ne!(shard_aad(&owner("u1"), 0, 3), shard_aad(&owner("u1"), 1, 3));
        assert_ne!(shard_aad(&owner("u1"), 0, 3), shard_aad(&owner("u1"), 0, 4));
    }

    #[test]
    fn complete_set_accepted() {
        let shards: Vec<_> = (0..3).map(shard).collect();
        assert!(check_complete(&owner("u1"), &shards, 3).is_ok());
    }

    #[test]
    fn missing_trailing_shard_rejected() {
        let shards: Vec<_> = (0..2).map(shard).collect();
        assert!(matches!(
            check_complete(&owner("u1"), &shards, 3),
            Err(VaultError::CorruptRecord(_))
        ));
    }

    #[test]
    fn gap_and_duplicate_rejected() {
        let gap = vec![shard(0), shard(2), shard(3)];
        let dup = vec![shard(0), shard(1), shard(1)];
        assert!(check_complete(&owner("u1"), &gap, 3).is_err());
        assert!(check_complete(&owner("u1"), &dup, 3).is_err());
    }

    #[test]
    fn stored_shards_reject_unrelated_key() {
        let vault = VaultStore::in_memory(VaultConfig::default()).unwrap();
        let u1 = owner("u1");
        vault.store(&u1, "secret").unwrap();

        let tx = vault.backend.begin().unwrap();
        let shards = tx.shards(&u1).unwrap();
        tx.rollback().unwrap();

        let stranger = SymmetricKey::generate();
        for shard in &shards {
            let data = EncryptedData::from_bytes(&shard.ciphertext).unwrap();
            let aad = shard_aad(&u1, shard.index, shards.len() as u32);
            assert!(matches!(
                decrypt_with_aad(&stranger, &data, &aad),
                Err(shardvault_crypto::CryptoError::Authentication)
            ));
        }
    }

    #[test]
    fn sealed_shards_are_one_per_index() {
        let key = SymmetricKey::generate();
        let sealed = seal_shards(&owner("u1"), b"hello world", &key, ShardCount::new(4)).unwrap();
        assert_eq!(sealed.len(), 4);

        let first = EncryptedData::from_bytes(&sealed[0]).unwrap();
        let plain = decrypt_with_aad(&key, &first, &shard_aad(&owner("u1"), 0, 4)).unwrap();
        assert_eq!(plain.as_slice(), b"hel");
    }
}
