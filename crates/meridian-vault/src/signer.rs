//! Ed25519 signing for ledger entries and rationales.
//!
//! Signatures (64 bytes), public keys (32 bytes), and seeds (32 bytes) are
//! exchanged as lowercase hex.

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;

use crate::error::VaultError;

pub const SEED_LENGTH: usize = 32;

/// Service signing identity.
#[derive(Clone)]
pub struct Ed25519Signer {
    signing_key: SigningKey,
}

impl Ed25519Signer {
    /// Generates a fresh keypair from the OS entropy source.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Restores the identity from a 64-char hex seed.
    pub fn from_seed_hex(seed_hex: &str) -> Result<Self, VaultError> {
        let bytes = hex::decode(seed_hex.trim())
            .map_err(|e| VaultError::InvalidKey(format!("seed is not hex: {e}")))?;
        let seed: [u8; SEED_LENGTH] = bytes.try_into().map_err(|b: Vec<u8>| {
            VaultError::InvalidKey(format!("seed must be {SEED_LENGTH} bytes, got {}", b.len()))
        })?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&seed),
        })
    }

    /// Signs `data` and returns the 128-char lowercase hex signature.
    pub fn sign_hex(&self, data: &[u8]) -> String {
        hex::encode(self.signing_key.sign(data).to_bytes())
    }

    /// Verifies a hex signature over `data` under this identity's key.
    pub fn verify_hex(&self, data: &[u8], signature_hex: &str) -> bool {
        verify_with_key_hex(&self.public_key_hex(), data, signature_hex)
    }

    /// 64-char lowercase hex public key.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }
}

/// Verifies a hex signature over `data` under an arbitrary hex public key,
/// as stored per ledger entry.
pub fn verify_with_key_hex(public_key_hex: &str, data: &[u8], signature_hex: &str) -> bool {
    let Ok(key_bytes) = hex::decode(public_key_hex) else {
        return false;
    };
    let Ok(key_array) = <[u8; 32]>::try_from(key_bytes.as_slice()) else {
        return false;
    };
    let Ok(key) = VerifyingKey::from_bytes(&key_array) else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&sig_bytes) else {
        return false;
    };
    key.verify(data, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_round_trip() {
        let signer = Ed25519Signer::generate();
        let sig = signer.sign_hex(b"the chain holds");
        assert_eq!(sig.len(), 128);
        assert!(signer.verify_hex(b"the chain holds", &sig));
    }

    #[test]
    fn flipping_a_bit_of_the_message_fails_verification() {
        let signer = Ed25519Signer::generate();
        let sig = signer.sign_hex(b"the chain holds");
        assert!(!signer.verify_hex(b"the chain folds", &sig));
    }

    #[test]
    fn corrupting_the_signature_fails_verification() {
        let signer = Ed25519Signer::generate();
        let mut sig = signer.sign_hex(b"payload").into_bytes();
        sig[0] = if sig[0] == b'0' { b'1' } else { b'0' };
        let corrupted = String::from_utf8(sig).unwrap();
        assert!(!signer.verify_hex(b"payload", &corrupted));
    }

    #[test]
    fn seed_round_trip_restores_the_same_identity() {
        let seed = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";
        let a = Ed25519Signer::from_seed_hex(seed).unwrap();
        let b = Ed25519Signer::from_seed_hex(seed).unwrap();
        assert_eq!(a.public_key_hex(), b.public_key_hex());
        assert_eq!(a.public_key_hex().len(), 64);
    }

    #[test]
    fn malformed_seeds_are_rejected() {
        assert!(Ed25519Signer::from_seed_hex("not-hex").is_err());
        assert!(Ed25519Signer::from_seed_hex("abcd").is_err());
    }

    #[test]
    fn verification_under_a_different_key_fails() {
        let signer = Ed25519Signer::generate();
        let other = Ed25519Signer::generate();
        let sig = signer.sign_hex(b"payload");
        assert!(!verify_with_key_hex(&other.public_key_hex(), b"payload", &sig));
    }
}
