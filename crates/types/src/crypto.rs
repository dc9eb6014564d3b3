//! Key-pair generation and account id derivation.
//!
//! Accounts are identified by the blake2b-256 digest of their ed25519 public
//! key, hex-encoded.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::FactoryError;

type Blake2b256 = Blake2b<U32>;

/// An ed25519 key pair with hex-encoded keys, as stored in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    /// Hex-encoded 32 byte secret key.
    pub private_key: String,
    /// Hex-encoded 32 byte public key.
    pub public_key: String,
}

impl KeyPair {
    /// Generate a fresh key pair.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let signing = SigningKey::generate(rng);
        Self::from_signing_key(&signing)
    }

    /// Rebuild a key pair from a hex-encoded secret key.
    pub fn from_private_hex(private_key: &str) -> Result<Self, FactoryError> {
        let signing = decode_signing_key(private_key)?;
        Ok(Self::from_signing_key(&signing))
    }

    fn from_signing_key(signing: &SigningKey) -> Self {
        Self {
            private_key: hex::encode(signing.to_bytes()),
            public_key: hex::encode(signing.verifying_key().to_bytes()),
        }
    }

    /// Account id derived from the public key.
    pub fn account_id(&self) -> Result<String, FactoryError> {
        account_id_from_public_hex(&self.public_key)
    }

    /// Sign a message, returning the hex-encoded signature.
    pub fn sign(&self, message: &[u8]) -> Result<String, FactoryError> {
        let signing = decode_signing_key(&self.private_key)?;
        Ok(hex::encode(signing.sign(message).to_bytes()))
    }
}

/// Hex-encoded blake2b-256 digest of a public key.
pub fn account_id_from_public_key(public_key: &[u8]) -> String {
    hex::encode(Blake2b256::digest(public_key))
}

/// Account id for a hex-encoded public key.
pub fn account_id_from_public_hex(public_key: &str) -> Result<String, FactoryError> {
    let bytes = hex::decode(public_key).map_err(|e| FactoryError::InvalidKey(e.to_string()))?;
    Ok(account_id_from_public_key(&bytes))
}

/// Hex-encoded blake2b-256 digest of arbitrary bytes, used for deploy hashes.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Blake2b256::digest(bytes))
}

/// Verify a hex-encoded signature against a hex-encoded public key.
pub fn verify_signature(public_key: &str, message: &[u8], signature: &str) -> bool {
    let Ok(pk) = hex::decode(public_key) else {
        return false;
    };
    let Ok(pk) = <[u8; 32]>::try_from(pk.as_slice()) else {
        return false;
    };
    let Ok(verifying) = VerifyingKey::from_bytes(&pk) else {
        return false;
    };
    let Ok(sig) = hex::decode(signature) else {
        return false;
    };
    let Ok(sig) = <[u8; 64]>::try_from(sig.as_slice()) else {
        return false;
    };
    verifying
        .verify_strict(message, &ed25519_dalek::Signature::from_bytes(&sig))
        .is_ok()
}

fn decode_signing_key(private_key: &str) -> Result<SigningKey, FactoryError> {
    let bytes = hex::decode(private_key).map_err(|e| FactoryError::InvalidKey(e.to_string()))?;
    let bytes: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| FactoryError::InvalidKey(format!("expected 32 bytes, got {}", bytes.len())))?;
    Ok(SigningKey::from_bytes(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_account_id_is_stable() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let kp = KeyPair::generate(&mut rng);
        let rebuilt = KeyPair::from_private_hex(&kp.private_key).unwrap();
        assert_eq!(kp, rebuilt);
        assert_eq!(kp.account_id().unwrap(), rebuilt.account_id().unwrap());
        assert_eq!(kp.account_id().unwrap().len(), 64);
    }

    #[test]
    fn test_sign_and_verify() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let kp = KeyPair::generate(&mut rng);
        let sig = kp.sign(b"payload").unwrap();
        assert!(verify_signature(&kp.public_key, b"payload", &sig));
        assert!(!verify_signature(&kp.public_key, b"tampered", &sig));
    }

    #[test]
    fn test_rejects_short_key() {
        assert!(matches!(
            KeyPair::from_private_hex("abcd"),
            Err(FactoryError::InvalidKey(_))
        ));
    }
}
