//! Domain models shared by the orchestrator, the ledger, and the ports.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identity::{new_id, OrgId, RepoId, RunId};

/// Predecessor hash of the genesis ledger entry: 64 zero characters.
pub const GENESIS_PREVIOUS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// One named work unit of the analysis workflow. The enumeration is closed;
/// the orchestrator never interprets a stage beyond its block membership.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Upload,
    Authentication,
    WasmParsing,
    StructuralAst,
    GeminiAnalysis,
    RuleEvaluation,
    AuditTrail,
    SovereignLedger,
    DashboardUpdate,
    SecurityAlerts,
    ComplianceReports,
    StrategicInsights,
}

/// The sequential block, in execution order. Each stage depends on all of
/// its predecessors; any failure aborts the run.
pub const SEQUENTIAL_STAGES: [Stage; 8] = [
    Stage::Upload,
    Stage::Authentication,
    Stage::WasmParsing,
    Stage::StructuralAst,
    Stage::GeminiAnalysis,
    Stage::RuleEvaluation,
    Stage::AuditTrail,
    Stage::SovereignLedger,
];

/// The parallel block, launched after the sequential block completes.
/// Mutually independent; failures are recorded but never fail the run.
pub const PARALLEL_STAGES: [Stage; 4] = [
    Stage::DashboardUpdate,
    Stage::SecurityAlerts,
    Stage::ComplianceReports,
    Stage::StrategicInsights,
];

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Upload => "upload",
            Stage::Authentication => "authentication",
            Stage::WasmParsing => "wasm_parsing",
            Stage::StructuralAst => "structural_ast",
            Stage::GeminiAnalysis => "gemini_analysis",
            Stage::RuleEvaluation => "rule_evaluation",
            Stage::AuditTrail => "audit_trail",
            Stage::SovereignLedger => "sovereign_ledger",
            Stage::DashboardUpdate => "dashboard_update",
            Stage::SecurityAlerts => "security_alerts",
            Stage::ComplianceReports => "compliance_reports",
            Stage::StrategicInsights => "strategic_insights",
        }
    }

    /// True for members of the parallel fan-out block.
    pub fn is_parallel(self) -> bool {
        PARALLEL_STAGES.contains(&self)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a run or of one stage attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

/// Outcome of one attempt of one stage within a run. Appended to the run's
/// stage sequence exactly once per executed stage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: Stage,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One execution of the analysis workflow for one repository.
///
/// Owned exclusively by the orchestrator; every value handed out is a deep
/// copy. Status transitions terminally to completed, failed, or cancelled.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: RunId,
    pub repo_id: RepoId,
    pub org_id: OrgId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    pub branch: String,
    pub status: RunStatus,
    pub stages: Vec<StageResult>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub total_duration_ms: f64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl PipelineRun {
    /// Allocates a new run in the running state with a fresh id.
    pub fn new(
        repo_id: impl Into<RepoId>,
        org_id: impl Into<OrgId>,
        commit_sha: Option<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id(),
            repo_id: repo_id.into(),
            org_id: org_id.into(),
            commit_sha,
            branch: branch.into(),
            status: RunStatus::Running,
            stages: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
            total_duration_ms: 0.0,
            metadata: HashMap::new(),
        }
    }
}

/// One link in the sovereign ledger's hash chain.
///
/// Invariants: `previous_hash` equals the predecessor's `hash`; `hash` is
/// recomputable from (entry_type, payload, previous_hash, timestamp);
/// `signature` verifies over the hex `hash` under `public_key`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub entry_type: String,
    pub payload: Value,
    pub previous_hash: String,
    pub hash: String,
    pub signature: String,
    pub public_key: String,
    pub timestamp: DateTime<Utc>,
}

/// A signed architectural-decision record, optionally anchored into the
/// ledger. The signature covers `id ‖ body` and is refreshed on every
/// mutation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Rationale {
    pub id: String,
    pub org_id: OrgId,
    pub repo_id: RepoId,
    pub title: String,
    pub body: String,
    pub category: String,
    pub tags: Vec<String>,
    pub related_files: Vec<String>,
    pub signature: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_wire_names_are_snake_case() {
        let json = serde_json::to_string(&Stage::WasmParsing).unwrap();
        assert_eq!(json, "\"wasm_parsing\"");
        let back: Stage = serde_json::from_str("\"gemini_analysis\"").unwrap();
        assert_eq!(back, Stage::GeminiAnalysis);
        assert_eq!(Stage::SovereignLedger.to_string(), "sovereign_ledger");
    }

    #[test]
    fn blocks_partition_the_enumeration() {
        for stage in SEQUENTIAL_STAGES {
            assert!(!stage.is_parallel());
        }
        for stage in PARALLEL_STAGES {
            assert!(stage.is_parallel());
        }
        assert_eq!(SEQUENTIAL_STAGES.len() + PARALLEL_STAGES.len(), 12);
    }

    #[test]
    fn new_run_starts_running_with_empty_stages() {
        let run = PipelineRun::new("repo-1", "org-1", Some("abc123".into()), "main");
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.stages.is_empty());
        assert!(run.completed_at.is_none());
        assert_eq!(run.total_duration_ms, 0.0);
    }

    #[test]
    fn terminal_statuses() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::Pending.is_terminal());
    }

    #[test]
    fn genesis_sentinel_is_64_zeros() {
        assert_eq!(GENESIS_PREVIOUS_HASH.len(), 64);
        assert!(GENESIS_PREVIOUS_HASH.chars().all(|c| c == '0'));
    }
}
