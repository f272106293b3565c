//! Append-only, hash-chained, signed ledger.
//!
//! Every entry links to its predecessor by hash; the hash is recomputable
//! from (entry_type, payload, previous_hash, timestamp) in canonical form,
//! and the signature covers the hex hash. Appends are strictly serialized;
//! readers receive deep copies.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use meridian_core::{new_id, LedgerEntry, GENESIS_PREVIOUS_HASH};

use crate::canonical::{canonical_bytes, canonicalize, sha256_hex};
use crate::error::VaultError;
use crate::signer::{verify_with_key_hex, Ed25519Signer};

pub const GENESIS_ENTRY_TYPE: &str = "genesis";

/// Result of a full chain walk.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct ChainVerification {
    pub valid: bool,
    pub entries: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_index: Option<usize>,
}

/// The sovereign ledger: a signed hash chain starting at a genesis entry.
pub struct Ledger {
    signer: Ed25519Signer,
    chain: RwLock<Vec<LedgerEntry>>,
}

impl Ledger {
    /// Constructs the ledger with its signed genesis entry.
    pub fn new(signer: Ed25519Signer) -> Result<Self, VaultError> {
        let ledger = Self {
            signer,
            chain: RwLock::new(Vec::new()),
        };
        let genesis = ledger.build_entry(
            GENESIS_ENTRY_TYPE,
            json!({"message": "meridian sovereign ledger initialized"}),
            GENESIS_PREVIOUS_HASH.to_string(),
        )?;
        ledger.write().push(genesis);
        Ok(ledger)
    }

    /// Appends a new signed entry. Single-writer: the whole link-hash-sign
    /// sequence happens under the write lock. A signature self-check
    /// failure aborts the append and leaves the chain unchanged.
    pub fn append(&self, entry_type: &str, payload: Value) -> Result<LedgerEntry, VaultError> {
        let mut chain = self.write();
        let previous_hash = chain
            .last()
            .map(|entry| entry.hash.clone())
            .unwrap_or_else(|| GENESIS_PREVIOUS_HASH.to_string());

        let entry = self.build_entry(entry_type, payload, previous_hash)?;
        chain.push(entry.clone());
        tracing::info!(hash = %entry.hash, entry_type, "ledger entry appended");
        Ok(entry)
    }

    /// Walks the chain from index 1: predecessor linkage, hash
    /// recomputation, and signature verification. Returns the first bad
    /// index, if any.
    pub fn verify(&self) -> ChainVerification {
        let chain = self.read();
        for i in 1..chain.len() {
            let entry = &chain[i];
            if entry.previous_hash != chain[i - 1].hash {
                return failed_at(i, chain.len());
            }
            match compute_hash(
                &entry.entry_type,
                &entry.payload,
                &entry.previous_hash,
                entry.timestamp,
            ) {
                Ok(expected) if expected == entry.hash => {}
                _ => return failed_at(i, chain.len()),
            }
            if !verify_with_key_hex(&entry.public_key, entry.hash.as_bytes(), &entry.signature) {
                return failed_at(i, chain.len());
            }
        }
        ChainVerification {
            valid: true,
            entries: chain.len(),
            failed_index: None,
        }
    }

    /// Linear lookup by entry hash.
    pub fn get_by_hash(&self, hash: &str) -> Option<LedgerEntry> {
        self.read().iter().find(|e| e.hash == hash).cloned()
    }

    /// Deep copies of the whole chain, in order.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        // The genesis entry exists from construction on.
        false
    }

    pub fn public_key_hex(&self) -> String {
        self.signer.public_key_hex()
    }

    fn build_entry(
        &self,
        entry_type: &str,
        payload: Value,
        previous_hash: String,
    ) -> Result<LedgerEntry, VaultError> {
        if !payload.is_object() {
            return Err(VaultError::PayloadNotObject);
        }
        let id = new_id();
        let timestamp = Utc::now();
        let hash = compute_hash(entry_type, &payload, &previous_hash, timestamp)?;
        let signature = self.signer.sign_hex(hash.as_bytes());
        if !self.signer.verify_hex(hash.as_bytes(), &signature) {
            return Err(VaultError::SignatureSelfCheck(id));
        }
        Ok(LedgerEntry {
            id,
            entry_type: entry_type.to_string(),
            payload: canonicalize(&payload),
            previous_hash,
            hash,
            signature,
            public_key: self.signer.public_key_hex(),
            timestamp,
        })
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<LedgerEntry>> {
        match self.chain.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<LedgerEntry>> {
        match self.chain.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn failed_at(index: usize, entries: usize) -> ChainVerification {
    ChainVerification {
        valid: false,
        entries,
        failed_index: Some(index),
    }
}

/// SHA-256 over the canonical serialization of
/// `{entry_type, payload, previous_hash, timestamp}` with the timestamp as
/// unix seconds.
pub fn compute_hash(
    entry_type: &str,
    payload: &Value,
    previous_hash: &str,
    timestamp: DateTime<Utc>,
) -> Result<String, serde_json::Error> {
    let document = json!({
        "entry_type": entry_type,
        "payload": payload,
        "previous_hash": previous_hash,
        "timestamp": timestamp.timestamp(),
    });
    Ok(sha256_hex(&canonical_bytes(&document)?))
}
