//! Per-tenant key derivation.
//!
//! Tenant-scoped data keys are derived from the service master key with
//! HKDF-SHA256, using the tenant id as the `info` input. Derivation is
//! deterministic per (master, tenant) and distinct across tenants.

use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use meridian_core::CoreError;

pub const MASTER_KEY_LENGTH: usize = 32;
pub const DERIVED_KEY_LENGTH: usize = 32;

/// Holds the 32-byte master key and derives tenant-scoped keys from it.
pub struct TenantKeyDeriver {
    master: [u8; MASTER_KEY_LENGTH],
}

impl TenantKeyDeriver {
    /// Generates a fresh master key from the OS entropy source.
    pub fn generate() -> Self {
        let mut master = [0u8; MASTER_KEY_LENGTH];
        OsRng.fill_bytes(&mut master);
        Self { master }
    }

    /// Restores the deriver from a 64-char hex master key.
    pub fn from_hex(master_hex: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(master_hex.trim())
            .map_err(|e| CoreError::InvalidInput(format!("master key is not hex: {e}")))?;
        let master: [u8; MASTER_KEY_LENGTH] = bytes.try_into().map_err(|b: Vec<u8>| {
            CoreError::InvalidInput(format!(
                "master key must be {MASTER_KEY_LENGTH} bytes, got {}",
                b.len()
            ))
        })?;
        Ok(Self { master })
    }

    /// Derives the tenant's data key.
    pub fn derive(&self, tenant_id: &str) -> Result<[u8; DERIVED_KEY_LENGTH], CoreError> {
        let hk = Hkdf::<Sha256>::new(None, &self.master);
        let mut okm = [0u8; DERIVED_KEY_LENGTH];
        hk.expand(tenant_id.as_bytes(), &mut okm)
            .map_err(|e| CoreError::Fatal(format!("hkdf expand failed: {e}")))?;
        Ok(okm)
    }

    /// Hex form of the tenant's data key.
    pub fn derive_hex(&self, tenant_id: &str) -> Result<String, CoreError> {
        Ok(hex::encode(self.derive(tenant_id)?))
    }
}
