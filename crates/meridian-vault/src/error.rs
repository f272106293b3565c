//! Vault error kinds.

/// Failures inside the ledger and rationale store.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("canonical serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Ledger payloads are JSON object mappings by contract.
    #[error("ledger payload must be a JSON object")]
    PayloadNotObject,

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// The freshly produced signature did not verify; the append is aborted
    /// and the chain left unchanged. Invariant violation, never recovered.
    #[error("signature self-check failed for entry {0}")]
    SignatureSelfCheck(String),

    #[error("rationale {0} not found")]
    RationaleNotFound(String),
}

impl VaultError {
    /// True for violated invariants that must be surfaced, not retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, VaultError::SignatureSelfCheck(_))
    }
}
