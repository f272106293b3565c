//! Persistence port for the control plane.
//!
//! The cores run over in-memory state; this trait is the seam a durable
//! backend plugs into. Write discipline (write-through vs write-behind) is
//! left to implementations; the in-memory store is trivially write-through.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::CoreError;
use crate::identity::RunId;
use crate::models::{LedgerEntry, PipelineRun, Rationale, StageResult};

/// Pass-through filter for rationale listings. An empty field matches every
/// record.
#[derive(Clone, Debug, Default)]
pub struct RationaleFilter {
    pub org_id: Option<String>,
    pub repo_id: Option<String>,
}

impl RationaleFilter {
    pub fn matches(&self, rationale: &Rationale) -> bool {
        if let Some(org_id) = &self.org_id {
            if &rationale.org_id != org_id {
                return false;
            }
        }
        if let Some(repo_id) = &self.repo_id {
            if &rationale.repo_id != repo_id {
                return false;
            }
        }
        true
    }
}

/// Storage seam for runs, ledger entries, and rationales.
///
/// **Constraints (must hold in all implementations):**
/// - `append_stage` preserves the order stages were appended in.
/// - `append_ledger` preserves chain order; `range_ledger` returns entries
///   in that order.
/// - Readers receive deep copies, never shared references.
pub trait ControlPlaneStore: Send + Sync {
    fn get_run(&self, id: &RunId) -> Result<Option<PipelineRun>, CoreError>;
    fn put_run(&self, run: PipelineRun) -> Result<(), CoreError>;
    fn append_stage(&self, id: &RunId, result: StageResult) -> Result<(), CoreError>;

    fn append_ledger(&self, entry: LedgerEntry) -> Result<(), CoreError>;
    /// Returns ledger entries with chain index in `[from, to)`.
    fn range_ledger(&self, from: usize, to: usize) -> Result<Vec<LedgerEntry>, CoreError>;

    fn put_rationale(&self, rationale: Rationale) -> Result<(), CoreError>;
    fn get_rationale(&self, id: &str) -> Result<Option<Rationale>, CoreError>;
    fn list_rationales(&self, filter: &RationaleFilter) -> Result<Vec<Rationale>, CoreError>;
}

/// In-memory store, one lock per record family.
#[derive(Default)]
pub struct InMemoryStore {
    runs: RwLock<HashMap<RunId, PipelineRun>>,
    ledger: RwLock<Vec<LedgerEntry>>,
    rationales: RwLock<HashMap<String, Rationale>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(what: &str) -> CoreError {
    CoreError::Fatal(format!("{what} lock poisoned"))
}

impl ControlPlaneStore for InMemoryStore {
    fn get_run(&self, id: &RunId) -> Result<Option<PipelineRun>, CoreError> {
        let runs = self.runs.read().map_err(|_| poisoned("run index"))?;
        Ok(runs.get(id).cloned())
    }

    fn put_run(&self, run: PipelineRun) -> Result<(), CoreError> {
        let mut runs = self.runs.write().map_err(|_| poisoned("run index"))?;
        runs.insert(run.id.clone(), run);
        Ok(())
    }

    fn append_stage(&self, id: &RunId, result: StageResult) -> Result<(), CoreError> {
        let mut runs = self.runs.write().map_err(|_| poisoned("run index"))?;
        let run = runs
            .get_mut(id)
            .ok_or_else(|| CoreError::NotFound(format!("run {id}")))?;
        run.stages.push(result);
        Ok(())
    }

    fn append_ledger(&self, entry: LedgerEntry) -> Result<(), CoreError> {
        let mut ledger = self.ledger.write().map_err(|_| poisoned("ledger"))?;
        ledger.push(entry);
        Ok(())
    }

    fn range_ledger(&self, from: usize, to: usize) -> Result<Vec<LedgerEntry>, CoreError> {
        let ledger = self.ledger.read().map_err(|_| poisoned("ledger"))?;
        let to = to.min(ledger.len());
        if from >= to {
            return Ok(Vec::new());
        }
        Ok(ledger[from..to].to_vec())
    }

    fn put_rationale(&self, rationale: Rationale) -> Result<(), CoreError> {
        let mut rationales = self
            .rationales
            .write()
            .map_err(|_| poisoned("rationale store"))?;
        rationales.insert(rationale.id.clone(), rationale);
        Ok(())
    }

    fn get_rationale(&self, id: &str) -> Result<Option<Rationale>, CoreError> {
        let rationales = self
            .rationales
            .read()
            .map_err(|_| poisoned("rationale store"))?;
        Ok(rationales.get(id).cloned())
    }

    fn list_rationales(&self, filter: &RationaleFilter) -> Result<Vec<Rationale>, CoreError> {
        let rationales = self
            .rationales
            .read()
            .map_err(|_| poisoned("rationale store"))?;
        Ok(rationales
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }
}
