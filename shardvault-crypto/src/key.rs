//! Symmetric key material and passphrase-based key derivation.

use crate::error::{CryptoError, CryptoResult};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Symmetric key size in bytes (256-bit).
pub const KEY_SIZE: usize = 32;

/// Argon2id salt size in bytes.
pub const SALT_SIZE: usize = 16;

/// A 256-bit symmetric key. Zeroized when dropped.
///
/// Used for per-record master keys, key-encryption keys derived from a KEM
/// shared secret, and custody keys derived from a passphrase.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_SIZE]);

impl SymmetricKey {
    /// Generates a fresh random key from the thread-local CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Builds a key from a slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey([REDACTED])")
    }
}

/// Random salt for Argon2id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Salt([u8; SALT_SIZE]);

impl Salt {
    pub fn random() -> Self {
        let mut bytes = [0u8; SALT_SIZE];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; SALT_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SALT_SIZE] {
        &self.0
    }
}

/// Argon2id cost parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        // OWASP minimum recommendation for Argon2id
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Derives a 256-bit key from a passphrase with Argon2id.
pub fn derive_key(passphrase: &str, salt: &Salt, params: &KdfParams) -> CryptoResult<SymmetricKey> {
    let argon2 = Argon2::new(
        Algorithm::Argon2id,
        Version::V0x13,
        Params::new(
            params.memory_kib,
            params.iterations,
            params.parallelism,
            Some(KEY_SIZE),
        )
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?,
    );

    let mut out = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(passphrase.as_bytes(), salt.as_bytes(), &mut out)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    let key = SymmetricKey::from_bytes(out);
    out.zeroize();
    Ok(key)
}
