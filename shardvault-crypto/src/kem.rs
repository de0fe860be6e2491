//! Key encapsulation.
//!
//! [`Kem`] is the pluggable asymmetric primitive behind the envelope. The
//! shipped implementation is ML-KEM-1024 (FIPS 203, NIST security category 5).

use crate::error::{CryptoError, CryptoResult};
use chacha20poly1305::aead::OsRng;
use ml_kem::kem::{Decapsulate, Encapsulate};
use ml_kem::{Ciphertext, Encoded, EncodedSizeUser, KemCore, MlKem1024};
use std::fmt;
use zeroize::Zeroizing;

/// An asymmetric key pair as raw encoded bytes.
pub struct KeyPair {
    pub public_key: Vec<u8>,
    pub private_key: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key_len", &self.public_key.len())
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// Result of encapsulating to a public key.
pub struct Encapsulation {
    /// Sent alongside the wrapped data; only the private key holder can
    /// recover the shared secret from it.
    pub ciphertext: Vec<u8>,
    pub shared_secret: Zeroizing<Vec<u8>>,
}

/// Key-encapsulation mechanism.
///
/// Decapsulating with a private key that does not match the public key used
/// for encapsulation must not return the sender's secret. For implicitly
/// rejecting KEMs (ML-KEM) it returns an unrelated secret; the envelope's
/// AEAD layer turns that into an error.
pub trait Kem: Send + Sync {
    /// Stable algorithm name recorded in wrapped key blobs.
    fn algorithm(&self) -> &'static str;

    fn generate_key_pair(&self) -> CryptoResult<KeyPair>;

    fn encapsulate(&self, public_key: &[u8]) -> CryptoResult<Encapsulation>;

    fn decapsulate(
        &self,
        private_key: &[u8],
        ciphertext: &[u8],
    ) -> CryptoResult<Zeroizing<Vec<u8>>>;
}

type Ek = <MlKem1024 as KemCore>::EncapsulationKey;
type Dk = <MlKem1024 as KemCore>::DecapsulationKey;

/// ML-KEM-1024.
#[derive(Clone, Copy, Debug, Default)]
pub struct MlKem1024Kem;

impl MlKem1024Kem {
    pub const ALGORITHM: &'static str = "ML-KEM-1024";
}

impl Kem for MlKem1024Kem {
    fn algorithm(&self) -> &'static str {
        Self::ALGORITHM
    }

    fn generate_key_pair(&self) -> CryptoResult<KeyPair> {
        let (dk, ek) = MlKem1024::generate(&mut OsRng);
        Ok(KeyPair {
            public_key: ek.as_bytes().to_vec(),
            private_key: Zeroizing::new(dk.as_bytes().to_vec()),
        })
    }

    fn encapsulate(&self, public_key: &[u8]) -> CryptoResult<Encapsulation> {
        let encoded = Encoded::<Ek>::try_from(public_key).map_err(|_| {
            CryptoError::InvalidKeyMaterial(format!(
                "ML-KEM-1024 public key has wrong length ({} bytes)",
                public_key.len()
            ))
        })?;
        let ek = Ek::from_bytes(&encoded);

        let (ct, shared) = ek
            .encapsulate(&mut OsRng)
            .map_err(|_| CryptoError::Encryption("ML-KEM encapsulation failed".into()))?;

        Ok(Encapsulation {
            ciphertext: ct.to_vec(),
            shared_secret: Zeroizing::new(shared.to_vec()),
        })
    }

    fn decapsulate(
        &self,
        private_key: &[u8],
        ciphertext: &[u8],
    ) -> CryptoResult<Zeroizing<Vec<u8>>> {
        let encoded = Encoded::<Dk>::try_from(private_key).map_err(|_| {
            CryptoError::InvalidKeyMaterial(format!(
                "ML-KEM-1024 private key has wrong length ({} bytes)",
                private_key.len()
            ))
        })?;
        let dk = Dk::from_bytes(&encoded);

        let ct = Ciphertext::<MlKem1024>::try_from(ciphertext).map_err(|_| {
            CryptoError::MalformedEnvelope(format!(
                "ML-KEM-1024 ciphertext has wrong length ({} bytes)",
                ciphertext.len()
            ))
        })?;

        let shared = dk
            .decapsulate(&ct)
            .map_err(|_| CryptoError::Authentication)?;
        Ok(Zeroizing::new(shared.to_vec()))
    }
}
