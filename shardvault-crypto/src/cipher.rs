//! ChaCha20-Poly1305 authenticated encryption.
//!
//! Every call draws a fresh 96-bit nonce, so a key can encrypt many shards
//! without nonce reuse. The tag is kept detached from the ciphertext so that
//! each stored triple `{nonce, tag, ciphertext}` can be inspected on its own.

use crate::error::{CryptoError, CryptoResult};
use crate::key::SymmetricKey;
use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce, Tag};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Nonce size in bytes.
pub const NONCE_SIZE: usize = 12;

/// Poly1305 tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// Output of one AEAD encryption.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    pub nonce: [u8; NONCE_SIZE],
    pub tag: [u8; TAG_SIZE],
    pub ciphertext: Vec<u8>,
}

impl EncryptedData {
    /// Compact storage layout: `nonce || tag || ciphertext`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_SIZE + TAG_SIZE + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.tag);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parses the layout written by [`EncryptedData::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::MalformedEnvelope(format!(
                "encrypted data too short: {} bytes",
                bytes.len()
            )));
        }
        let (nonce, rest) = bytes.split_at(NONCE_SIZE);
        let (tag, ciphertext) = rest.split_at(TAG_SIZE);

        let mut data = EncryptedData {
            nonce: [0u8; NONCE_SIZE],
            tag: [0u8; TAG_SIZE],
            ciphertext: ciphertext.to_vec(),
        };
        data.nonce.copy_from_slice(nonce);
        data.tag.copy_from_slice(tag);
        Ok(data)
    }
}

/// Encrypts `plaintext` under `key` with no associated data.
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> CryptoResult<EncryptedData> {
    encrypt_with_aad(key, plaintext, &[])
}

/// Decrypts data produced by [`encrypt`].
pub fn decrypt(key: &SymmetricKey, data: &EncryptedData) -> CryptoResult<Zeroizing<Vec<u8>>> {
    decrypt_with_aad(key, data, &[])
}

/// Encrypts `plaintext`, binding `aad` into the tag.
pub fn encrypt_with_aad(
    key: &SymmetricKey,
    plaintext: &[u8],
    aad: &[u8],
) -> CryptoResult<EncryptedData> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    let mut nonce = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce);

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&nonce), aad, &mut buffer)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut tag_bytes = [0u8; TAG_SIZE];
    tag_bytes.copy_from_slice(tag.as_slice());

    Ok(EncryptedData {
        nonce,
        tag: tag_bytes,
        ciphertext: buffer,
    })
}

/// Decrypts and verifies `data`. Returns [`CryptoError::Authentication`] on
/// any mismatch; no plaintext is released unless the tag verifies.
pub fn decrypt_with_aad(
    key: &SymmetricKey,
    data: &EncryptedData,
    aad: &[u8],
) -> CryptoResult<Zeroizing<Vec<u8>>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    let mut buffer = Zeroizing::new(data.ciphertext.clone());
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(&data.nonce),
            aad,
            buffer.as_mut_slice(),
            Tag::from_slice(&data.tag),
        )
        .map_err(|_| CryptoError::Authentication)?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let key = SymmetricKey::generate();
        let enc = encrypt(&key, b"shard bytes").unwrap();
        assert_eq!(enc.ciphertext.len(), b"shard bytes".len());
        assert_eq!(decrypt(&key, &enc).unwrap().as_slice(), b"shard bytes");
    }

    #[test]
    fn empty_plaintext_roundtrips() {
        let key = SymmetricKey::generate();
        let enc = encrypt(&key, b"").unwrap();
        assert!(enc.ciphertext.is_empty());
        assert!(decrypt(&key, &enc).unwrap().is_empty());
    }

    #[test]
    fn nonce_is_fresh_per_call() {
        let key = SymmetricKey::generate();
        let a = encrypt(&key, b"same").unwrap();
        let b = encrypt(&key, b"same").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn wrong_key_fails() {
        let enc = encrypt(&SymmetricKey::generate(), b"data").unwrap();
        let err = decrypt(&SymmetricKey::generate(), &enc).unwrap_err();
        assert!(matches!(err, CryptoError::Authentication));
    }

    #[test]
    fn tampered_tag_fails() {
        let key = SymmetricKey::generate();
        let mut enc = encrypt(&key, b"data").unwrap();
        enc.tag[TAG_SIZE - 1] ^= 0x01;
        assert!(matches!(decrypt(&key, &enc), Err(CryptoError::Authentication)));
    }

    #[test]
    fn aad_mismatch_fails() {
        let key = SymmetricKey::generate();
        let enc = encrypt_with_aad(&key, b"data", b"owner-a|0").unwrap();
        assert!(decrypt_with_aad(&key, &enc, b"owner-a|0").is_ok());
        assert!(matches!(
            decrypt_with_aad(&key, &enc, b"owner-b|0"),
            Err(CryptoError::Authentication)
        ));
    }

    #[test]
    fn storage_encoding_roundtrip() {
        let key = SymmetricKey::generate();
        let enc = encrypt(&key, b"payload").unwrap();
        let bytes = enc.to_bytes();
        assert_eq!(bytes.len(), NONCE_SIZE + TAG_SIZE + b"payload".len());
        let back = EncryptedData::from_bytes(&bytes).unwrap();
        assert_eq!(back, enc);
        assert!(matches!(
            EncryptedData::from_bytes(&bytes[..NONCE_SIZE + TAG_SIZE - 1]),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }
}
