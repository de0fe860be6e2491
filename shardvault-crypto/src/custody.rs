//! Private key custody.
//!
//! The vault persists private keys through a [`KeyCustody`] so that the party
//! storing rows does not automatically hold usable key material.
//! [`StoredKeyCustody`] keeps the key as-is; [`PassphraseCustody`] seals it
//! under an Argon2id-derived key that never reaches the database.

use crate::cipher::{EncryptedData, decrypt_with_aad, encrypt_with_aad};
use crate::error::CryptoResult;
use crate::key::{KdfParams, Salt, SymmetricKey, derive_key};
use zeroize::Zeroizing;

/// Protects private keys at rest.
pub trait KeyCustody: Send + Sync {
    /// Short name recorded in logs.
    fn name(&self) -> &'static str;

    /// Turns a raw private key into the bytes that get persisted.
    fn seal(&self, owner: &str, private_key: &[u8]) -> CryptoResult<Vec<u8>>;

    /// Inverse of [`KeyCustody::seal`].
    fn open(&self, owner: &str, sealed: &[u8]) -> CryptoResult<Zeroizing<Vec<u8>>>;
}

/// Persists private keys unmodified.
#[derive(Clone, Copy, Debug, Default)]
pub struct StoredKeyCustody;

impl KeyCustody for StoredKeyCustody {
    fn name(&self) -> &'static str {
        "stored"
    }

    fn seal(&self, _owner: &str, private_key: &[u8]) -> CryptoResult<Vec<u8>> {
        Ok(private_key.to_vec())
    }

    fn open(&self, _owner: &str, sealed: &[u8]) -> CryptoResult<Zeroizing<Vec<u8>>> {
        Ok(Zeroizing::new(sealed.to_vec()))
    }
}

/// Seals private keys with a key derived from an operator passphrase.
///
/// The owner id is bound as associated data, so a sealed key copied onto
/// another owner's row fails to open.
pub struct PassphraseCustody {
    key: SymmetricKey,
}

impl PassphraseCustody {
    /// Derives the custody key once; Argon2id is deliberately slow.
    pub fn new(passphrase: &str, salt: &Salt, params: &KdfParams) -> CryptoResult<Self> {
        let key = derive_key(passphrase, salt, params)?;
        Ok(Self { key })
    }

    /// Uses an already-derived custody key.
    pub fn from_key(key: SymmetricKey) -> Self {
        Self { key }
    }
}

impl KeyCustody for PassphraseCustody {
    fn name(&self) -> &'static str {
        "passphrase"
    }

    fn seal(&self, owner: &str, private_key: &[u8]) -> CryptoResult<Vec<u8>> {
        let encrypted = encrypt_with_aad(&self.key, private_key, owner.as_bytes())?;
        Ok(encrypted.to_bytes())
    }

    fn open(&self, owner: &str, sealed: &[u8]) -> CryptoResult<Zeroizing<Vec<u8>>> {
        let encrypted = EncryptedData::from_bytes(sealed)?;
        decrypt_with_aad(&self.key, &encrypted, owner.as_bytes())
    }
}
