//! Pipeline anchoring: the vault consumes stage events from the bus and
//! appends a `pipeline-complete` entry when a run's terminal sequential
//! stage succeeds.

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use meridian_core::{BusMessage, BusReceiver, CoreError, PipelineRun, RunStatus, Stage, StageResult};

use crate::error::VaultError;
use crate::ledger::Ledger;

pub const PIPELINE_COMPLETE_ENTRY_TYPE: &str = "pipeline-complete";

/// Consumer loop: reads stage events until the ambient signal fires.
/// Transient gaps are logged and the loop keeps reading.
pub async fn run_pipeline_anchor(
    mut rx: BusReceiver,
    ledger: Arc<Ledger>,
    cancel: CancellationToken,
) {
    loop {
        match rx.read(&cancel).await {
            Ok(msg) => {
                if let Err(err) = anchor_stage_event(&ledger, &msg) {
                    tracing::warn!(error = %err, "failed to anchor stage event");
                }
            }
            Err(CoreError::Cancelled) => {
                tracing::info!("pipeline anchor consumer stopped");
                return;
            }
            Err(CoreError::Transient(detail)) => {
                tracing::warn!(detail, "pipeline anchor consumer lagged");
            }
            Err(err) => {
                tracing::warn!(error = %err, "pipeline anchor consumer closed");
                return;
            }
        }
    }
}

/// Appends the anchor when the event is the successful `sovereign_ledger`
/// stage. Other events are acknowledged without effect.
pub fn anchor_stage_event(ledger: &Ledger, msg: &BusMessage) -> Result<bool, VaultError> {
    let run: PipelineRun = match serde_json::from_value(msg.payload["run"].clone()) {
        Ok(run) => run,
        Err(_) => return Ok(false),
    };
    let result: StageResult = match serde_json::from_value(msg.payload["result"].clone()) {
        Ok(result) => result,
        Err(_) => return Ok(false),
    };

    if result.stage != Stage::SovereignLedger || result.status != RunStatus::Completed {
        return Ok(false);
    }

    ledger.append(
        PIPELINE_COMPLETE_ENTRY_TYPE,
        json!({
            "run_id": run.id,
            "repo_id": run.repo_id,
            "org_id": run.org_id,
            "commit_sha": run.commit_sha,
            "branch": run.branch,
        }),
    )?;
    Ok(true)
}
