//! Envelope encryption of per-record master keys.
//!
//! A master key is wrapped for a recipient public key by encapsulating a fresh
//! shared secret with the [`Kem`], deriving a key-encryption key from it, and
//! sealing the master key with ChaCha20-Poly1305. Only the holder of the
//! matching private key can recompute the key-encryption key.
//!
//! The KEK is HKDF-SHA256 over the shared secret, salted with the KEM
//! ciphertext, which binds it to the exact encapsulation that produced it.

use crate::cipher::{EncryptedData, decrypt_with_aad, encrypt_with_aad};
use crate::error::{CryptoError, CryptoResult};
use crate::kem::{Kem, KeyPair};
use crate::key::SymmetricKey;
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use zeroize::Zeroize;

/// Current wrapped-key format version.
pub const ENVELOPE_VERSION: u8 = 1;

const KEK_DOMAIN: &[u8] = b"shardvault/envelope/kek/v1";

/// Serialized form of a wrapped master key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WrappedKeyBlob {
    pub version: u8,
    /// KEM that produced `kem_ciphertext`.
    pub algorithm: String,
    pub kem_ciphertext: Vec<u8>,
    /// Master key sealed under the derived KEK.
    pub sealed_key: EncryptedData,
}

/// Wraps and unwraps master keys with a pluggable [`Kem`].
#[derive(Clone)]
pub struct Envelope {
    kem: Arc<dyn Kem>,
}

impl Envelope {
    pub fn new(kem: Arc<dyn Kem>) -> Self {
        Self { kem }
    }

    pub fn algorithm(&self) -> &'static str {
        self.kem.algorithm()
    }

    /// Generates a key pair compatible with this envelope's KEM.
    pub fn generate_key_pair(&self) -> CryptoResult<KeyPair> {
        self.kem.generate_key_pair()
    }

    /// Wraps `master_key` for `public_key`. `context` is bound as associated
    /// data and must be supplied again to unwrap.
    pub fn wrap(
        &self,
        master_key: &SymmetricKey,
        public_key: &[u8],
        context: &[u8],
    ) -> CryptoResult<Vec<u8>> {
        let encapsulation = self.kem.encapsulate(public_key)?;
        let kek = derive_kek(&encapsulation.shared_secret, &encapsulation.ciphertext)?;
        let sealed_key = encrypt_with_aad(&kek, master_key.as_bytes(), context)?;

        let blob = WrappedKeyBlob {
            version: ENVELOPE_VERSION,
            algorithm: self.kem.algorithm().to_string(),
            kem_ciphertext: encapsulation.ciphertext,
            sealed_key,
        };
        Ok(serde_json::to_vec(&blob)?)
    }

    /// Recovers the master key from a blob produced by [`Envelope::wrap`].
    ///
    /// Fails with [`CryptoError::Authentication`] when `private_key` does not
    /// belong to the wrapping public key or `context` differs, and with
    /// [`CryptoError::MalformedEnvelope`] when the blob cannot be parsed.
    pub fn unwrap(
        &self,
        wrapped: &[u8],
        private_key: &[u8],
        context: &[u8],
    ) -> CryptoResult<SymmetricKey> {
        let blob: WrappedKeyBlob = serde_json::from_slice(wrapped)
            .map_err(|e| CryptoError::MalformedEnvelope(e.to_string()))?;

        if blob.version != ENVELOPE_VERSION {
            return Err(CryptoError::MalformedEnvelope(format!(
                "unsupported envelope version {}",
                blob.version
            )));
        }
        if blob.algorithm != self.kem.algorithm() {
            return Err(CryptoError::AlgorithmMismatch {
                expected: self.kem.algorithm().to_string(),
                found: blob.algorithm,
            });
        }

        let shared_secret = self.kem.decapsulate(private_key, &blob.kem_ciphertext)?;
        let kek = derive_kek(&shared_secret, &blob.kem_ciphertext)?;
        let key_bytes = decrypt_with_aad(&kek, &blob.sealed_key, context)?;
        SymmetricKey::from_slice(&key_bytes)
    }
}

fn derive_kek(shared_secret: &[u8], kem_ciphertext: &[u8]) -> CryptoResult<SymmetricKey> {
    let hk = Hkdf::<Sha256>::new(Some(kem_ciphertext), shared_secret);
    let mut okm = [0u8; 32];
    hk.expand(KEK_DOMAIN, &mut okm)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    let kek = SymmetricKey::from_bytes(okm);
    okm.zeroize();
    Ok(kek)
}
