//! Sovereign vault: Ed25519 signing, the hash-chained ledger, the rationale
//! store, and their HTTP surface.

pub mod anchor;
pub mod api;
pub mod canonical;
pub mod error;
pub mod ledger;
pub mod rationale;
pub mod signer;

pub use anchor::{anchor_stage_event, run_pipeline_anchor, PIPELINE_COMPLETE_ENTRY_TYPE};
pub use api::{build_router, VaultState};
pub use canonical::{canonical_bytes, canonicalize, sha256_hex};
pub use error::VaultError;
pub use ledger::{compute_hash, ChainVerification, Ledger, GENESIS_ENTRY_TYPE};
pub use rationale::{NewRationale, RationaleStore, RationaleUpdate, DECISION_ENTRY_TYPE};
pub use signer::{verify_with_key_hex, Ed25519Signer, SEED_LENGTH};
