use shardvault_crypto::{
    CryptoError, EncryptedData, Envelope, Kem, MlKem1024Kem, SymmetricKey, WrappedKeyBlob,
};
use std::sync::Arc;

fn envelope() -> Envelope {
    Envelope::new(Arc::new(MlKem1024Kem))
}

/// A KEM that claims a different algorithm name but otherwise delegates.
struct RenamedKem;

impl Kem for RenamedKem {
    fn algorithm(&self) -> &'static str {
        "X-TEST-KEM"
    }

    fn generate_key_pair(&self) -> shardvault_crypto::CryptoResult<shardvault_crypto::KeyPair> {
        MlKem1024Kem.generate_key_pair()
    }

    fn encapsulate(
        &self,
        public_key: &[u8],
    ) -> shardvault_crypto::CryptoResult<shardvault_crypto::Encapsulation> {
        MlKem1024Kem.encapsulate(public_key)
    }

    fn decapsulate(
        &self,
        private_key: &[u8],
        ciphertext: &[u8],
    ) -> shardvault_crypto::CryptoResult<zeroize::Zeroizing<Vec<u8>>> {
        MlKem1024Kem.decapsulate(private_key, ciphertext)
    }
}

#[test]
fn keypair_generation_produces_distinct_halves() {
    let kp = envelope().generate_key_pair().unwrap();
    assert!(!kp.public_key.is_empty());
    assert!(!kp.private_key.is_empty());
    assert_ne!(kp.public_key.as_slice(), kp.private_key.as_slice());
}

#[test]
fn wrap_unwrap_roundtrip() {
    let env = envelope();
    let kp = env.generate_key_pair().unwrap();
    let master = SymmetricKey::generate();

    let wrapped = env.wrap(&master, &kp.public_key, b"u1").unwrap();
    let recovered = env.unwrap(&wrapped, &kp.private_key, b"u1").unwrap();

    assert_eq!(recovered.as_bytes(), master.as_bytes());
}

#[test]
fn wrong_private_key_fails_to_unwrap() {
    let env = envelope();
    let target = env.generate_key_pair().unwrap();
    let wrong = env.generate_key_pair().unwrap();
    let master = SymmetricKey::generate();

    let wrapped = env.wrap(&master, &target.public_key, b"u1").unwrap();
    let result = env.unwrap(&wrapped, &wrong.private_key, b"u1");

    assert!(matches!(result, Err(CryptoError::Authentication)));
}

#[test]
fn context_mismatch_fails_to_unwrap() {
    let env = envelope();
    let kp = env.generate_key_pair().unwrap();
    let wrapped = env.wrap(&SymmetricKey::generate(), &kp.public_key, b"u1").unwrap();

    assert!(matches!(
        env.unwrap(&wrapped, &kp.private_key, b"u2"),
        Err(CryptoError::Authentication)
    ));
}

#[test]
fn tampered_sealed_key_fails() {
    let env = envelope();
    let kp = env.generate_key_pair().unwrap();
    let wrapped = env.wrap(&SymmetricKey::generate(), &kp.public_key, b"u1").unwrap();

    let mut blob: WrappedKeyBlob = serde_json::from_slice(&wrapped).unwrap();
    blob.sealed_key.ciphertext[0] ^= 0xFF;
    let tampered = serde_json::to_vec(&blob).unwrap();

    assert!(env.unwrap(&tampered, &kp.private_key, b"u1").is_err());
}

#[test]
fn tampered_kem_ciphertext_fails() {
    let env = envelope();
    let kp = env.generate_key_pair().unwrap();
    let wrapped = env.wrap(&SymmetricKey::generate(), &kp.public_key, b"u1").unwrap();

    let mut blob: WrappedKeyBlob = serde_json::from_slice(&wrapped).unwrap();
    blob.kem_ciphertext[7] ^= 0x01;
    let tampered = serde_json::to_vec(&blob).unwrap();

    assert!(matches!(
        env.unwrap(&tampered, &kp.private_key, b"u1"),
        Err(CryptoError::Authentication)
    ));
}

#[test]
fn malformed_blob_is_reported() {
    let env = envelope();
    let kp = env.generate_key_pair().unwrap();
    assert!(matches!(
        env.unwrap(b"definitely not an envelope", &kp.private_key, b"u1"),
        Err(CryptoError::MalformedEnvelope(_))
    ));
}

#[test]
fn unsupported_version_is_malformed() {
    let env = envelope();
    let kp = env.generate_key_pair().unwrap();
    let wrapped = env.wrap(&SymmetricKey::generate(), &kp.public_key, b"u1").unwrap();

    let mut blob: WrappedKeyBlob = serde_json::from_slice(&wrapped).unwrap();
    blob.version = 9;
    let bumped = serde_json::to_vec(&blob).unwrap();

    assert!(matches!(
        env.unwrap(&bumped, &kp.private_key, b"u1"),
        Err(CryptoError::MalformedEnvelope(_))
    ));
}

#[test]
fn algorithm_mismatch_is_rejected() {
    let mlkem = envelope();
    let renamed = Envelope::new(Arc::new(RenamedKem));
    let kp = mlkem.generate_key_pair().unwrap();

    let wrapped = renamed.wrap(&SymmetricKey::generate(), &kp.public_key, b"u1").unwrap();
    let err = mlkem.unwrap(&wrapped, &kp.private_key, b"u1").unwrap_err();

    match err {
        CryptoError::AlgorithmMismatch { expected, found } => {
            assert_eq!(expected, "ML-KEM-1024");
            assert_eq!(found, "X-TEST-KEM");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn each_wrap_produces_different_blob() {
    let env = envelope();
    let kp = env.generate_key_pair().unwrap();
    let master = SymmetricKey::generate();

    let w1 = env.wrap(&master, &kp.public_key, b"u1").unwrap();
    let w2 = env.wrap(&master, &kp.public_key, b"u1").unwrap();
    assert_ne!(w1, w2);

    // Both still open to the same key
    assert_eq!(
        env.unwrap(&w1, &kp.private_key, b"u1").unwrap().as_bytes(),
        env.unwrap(&w2, &kp.private_key, b"u1").unwrap().as_bytes()
    );
}

#[test]
fn blob_records_algorithm() {
    let env = envelope();
    let kp = env.generate_key_pair().unwrap();
    let wrapped = env.wrap(&SymmetricKey::generate(), &kp.public_key, b"u1").unwrap();
    let blob: WrappedKeyBlob = serde_json::from_slice(&wrapped).unwrap();

    assert_eq!(blob.algorithm, "ML-KEM-1024");
    assert_eq!(blob.version, shardvault_crypto::ENVELOPE_VERSION);
    assert_eq!(blob.kem_ciphertext.len(), 1568);
}

#[test]
fn encrypted_data_serialization_roundtrip() {
    let key = SymmetricKey::generate();
    let enc = shardvault_crypto::encrypt(&key, b"serialize me").unwrap();

    let json = serde_json::to_string(&enc).unwrap();
    let back: EncryptedData = serde_json::from_str(&json).unwrap();

    assert_eq!(
        shardvault_crypto::decrypt(&key, &back).unwrap().as_slice(),
        b"serialize me"
    );
}

// Property-based tests
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn aead_always_roundtrips(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let key = SymmetricKey::generate();
            let enc = shardvault_crypto::encrypt(&key, &data).unwrap();
            let dec = shardvault_crypto::decrypt(&key, &enc).unwrap();
            prop_assert_eq!(dec.as_slice(), data.as_slice());
        }

        #[test]
        fn any_ciphertext_bit_flip_is_detected(
            data in proptest::collection::vec(any::<u8>(), 1..128),
            pos in any::<proptest::sample::Index>(),
            bit in 0u8..8,
        ) {
            let key = SymmetricKey::generate();
            let mut enc = shardvault_crypto::encrypt(&key, &data).unwrap();
            let i = pos.index(enc.ciphertext.len());
            enc.ciphertext[i] ^= 1 << bit;
            prop_assert!(matches!(
                shardvault_crypto::decrypt(&key, &enc),
                Err(CryptoError::Authentication)
            ));
        }
    }
}
