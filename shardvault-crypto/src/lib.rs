//! Encryption layer for ShardVault.
//!
//! Provides the primitives behind per-record envelope encryption:
//! - ChaCha20-Poly1305 for authenticated encryption of shards
//! - ML-KEM-1024 key encapsulation for wrapping master keys
//! - Argon2id for deriving custody keys from passphrases
//! - Zeroization of key material on drop
//!
//! # Architecture
//!
//! Each record uses a two-tier key system:
//!
//! 1. **Master Key**: A random 256-bit key generated per write. It encrypts
//!    every shard of the record and is never stored in clear.
//!
//! 2. **Key Pair**: An ML-KEM-1024 pair per owner. The master key is wrapped
//!    under the public key; the private key is held by a [`KeyCustody`].
//!
//! Rewriting a record draws a new master key, so old and new shards never
//! share key material.

mod cipher;
pub mod custody;
pub mod envelope;
mod error;
pub mod kem;
mod key;

pub use cipher::{
    EncryptedData, NONCE_SIZE, TAG_SIZE, decrypt, decrypt_with_aad, encrypt, encrypt_with_aad,
};
pub use custody::{KeyCustody, PassphraseCustody, StoredKeyCustody};
pub use envelope::{ENVELOPE_VERSION, Envelope, WrappedKeyBlob};
pub use error::{CryptoError, CryptoResult};
pub use kem::{Encapsulation, Kem, KeyPair, MlKem1024Kem};
pub use key::{KEY_SIZE, KdfParams, SALT_SIZE, Salt, SymmetricKey, derive_key};
