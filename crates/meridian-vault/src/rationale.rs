//! Signed architectural-decision records, anchored into the ledger.
//!
//! Every create and update re-signs `id ‖ body` and appends a `decision`
//! ledger entry describing the mutation; the mutation is committed to the
//! store only after its anchor is in the chain.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use meridian_core::{new_id, Rationale, RationaleFilter};

use crate::error::VaultError;
use crate::ledger::Ledger;
use crate::signer::Ed25519Signer;

pub const DECISION_ENTRY_TYPE: &str = "decision";

/// Creation request.
#[derive(Clone, Debug, Deserialize)]
pub struct NewRationale {
    pub org_id: String,
    pub repo_id: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub related_files: Vec<String>,
    #[serde(default)]
    pub created_by: String,
}

/// Partial update; absent fields keep their current value.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RationaleUpdate {
    pub title: Option<String>,
    pub body: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub related_files: Option<Vec<String>>,
}

/// In-memory rationale store co-resident with the ledger.
pub struct RationaleStore {
    signer: Ed25519Signer,
    ledger: Arc<Ledger>,
    items: RwLock<HashMap<String, Rationale>>,
}

impl RationaleStore {
    pub fn new(signer: Ed25519Signer, ledger: Arc<Ledger>) -> Self {
        Self {
            signer,
            ledger,
            items: RwLock::new(HashMap::new()),
        }
    }

    pub fn create(&self, req: NewRationale) -> Result<Rationale, VaultError> {
        let now = Utc::now();
        let id = new_id();
        let rationale = Rationale {
            signature: self.sign(&id, &req.body),
            id: id.clone(),
            org_id: req.org_id,
            repo_id: req.repo_id,
            title: req.title,
            body: req.body,
            category: req.category,
            tags: req.tags,
            related_files: req.related_files,
            created_by: req.created_by,
            created_at: now,
            updated_at: now,
        };

        self.anchor("rationale-created", &rationale)?;
        self.write().insert(id.clone(), rationale.clone());
        tracing::info!(id = %id, title = %rationale.title, "rationale created");
        Ok(rationale)
    }

    pub fn update(&self, id: &str, update: RationaleUpdate) -> Result<Rationale, VaultError> {
        let mut candidate = self
            .get(id)
            .ok_or_else(|| VaultError::RationaleNotFound(id.to_string()))?;

        if let Some(title) = update.title.filter(|t| !t.is_empty()) {
            candidate.title = title;
        }
        if let Some(body) = update.body.filter(|b| !b.is_empty()) {
            candidate.body = body;
        }
        if let Some(category) = update.category.filter(|c| !c.is_empty()) {
            candidate.category = category;
        }
        if let Some(tags) = update.tags {
            candidate.tags = tags;
        }
        if let Some(related_files) = update.related_files {
            candidate.related_files = related_files;
        }
        candidate.updated_at = Utc::now();
        candidate.signature = self.sign(&candidate.id, &candidate.body);

        self.anchor("rationale-updated", &candidate)?;
        self.write().insert(candidate.id.clone(), candidate.clone());
        Ok(candidate)
    }

    pub fn get(&self, id: &str) -> Option<Rationale> {
        self.read().get(id).cloned()
    }

    pub fn list(&self, filter: &RationaleFilter) -> Vec<Rationale> {
        self.read()
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect()
    }

    fn sign(&self, id: &str, body: &str) -> String {
        self.signer.sign_hex(format!("{id}{body}").as_bytes())
    }

    /// Appends the ledger entry anchoring a mutation; called before the
    /// store commit so a failed anchor leaves the record untouched.
    fn anchor(&self, action: &str, rationale: &Rationale) -> Result<(), VaultError> {
        self.ledger.append(
            DECISION_ENTRY_TYPE,
            json!({
                "action": action,
                "rationale_id": rationale.id,
                "org_id": rationale.org_id,
                "repo_id": rationale.repo_id,
                "title": rationale.title,
                "signature": rationale.signature,
            }),
        )?;
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Rationale>> {
        match self.items.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Rationale>> {
        match self.items.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (Arc<Ledger>, RationaleStore) {
        let signer = Ed25519Signer::generate();
        let ledger = Arc::new(Ledger::new(signer.clone()).unwrap());
        (ledger.clone(), RationaleStore::new(signer, ledger))
    }

    fn request() -> NewRationale {
        NewRationale {
            org_id: "org-1".into(),
            repo_id: "repo-1".into(),
            title: "split the parser out".into(),
            body: "parsing load interferes with request latency".into(),
            category: "architecture".into(),
            tags: vec!["performance".into()],
            related_files: vec!["src/parser.rs".into()],
            created_by: "alex".into(),
        }
    }

    #[test]
    fn create_signs_and_anchors() {
        let (ledger, store) = store();
        let rationale = store.create(request()).unwrap();

        assert_eq!(rationale.signature.len(), 128);
        assert_eq!(ledger.len(), 2);
        let anchor = &ledger.entries()[1];
        assert_eq!(anchor.entry_type, DECISION_ENTRY_TYPE);
        assert_eq!(anchor.payload["rationale_id"], rationale.id.as_str());
        assert_eq!(anchor.payload["action"], "rationale-created");
    }

    #[test]
    fn update_re_signs_and_anchors_again() {
        let (ledger, store) = store();
        let created = store.create(request()).unwrap();

        let updated = store
            .update(
                &created.id,
                RationaleUpdate {
                    body: Some("parsing now dominates p99 latency".into()),
                    ..RationaleUpdate::default()
                },
            )
            .unwrap();

        assert_ne!(updated.signature, created.signature);
        assert!(updated.updated_at >= created.updated_at);
        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.entries()[2].payload["action"], "rationale-updated");
        assert!(ledger.verify().valid);
    }

    #[test]
    fn update_unknown_id_is_not_found() {
        let (_, store) = store();
        let err = store.update("missing", RationaleUpdate::default()).unwrap_err();
        assert!(matches!(err, VaultError::RationaleNotFound(_)));
    }

    #[test]
    fn list_filters_by_org_and_repo() {
        let (_, store) = store();
        store.create(request()).unwrap();
        store
            .create(NewRationale {
                org_id: "org-2".into(),
                ..request()
            })
            .unwrap();

        assert_eq!(store.list(&RationaleFilter::default()).len(), 2);
        let filtered = store.list(&RationaleFilter {
            org_id: Some("org-2".into()),
            repo_id: None,
        });
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].org_id, "org-2");
    }

    #[test]
    fn empty_update_fields_keep_current_values() {
        let (_, store) = store();
        let created = store.create(request()).unwrap();
        let updated = store
            .update(
                &created.id,
                RationaleUpdate {
                    title: Some(String::new()),
                    ..RationaleUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(updated.title, created.title);
    }
}
