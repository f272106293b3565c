//! Pipeline orchestrator: per-run state, sequential and fan-out execution,
//! and stage-event notification.
//!
//! Concurrency discipline: the run index is guarded by one reader-writer
//! lock; stage results are appended under the write lock and every value
//! handed out is a clone. Listener fan-out goes through one bounded channel
//! drained by a dedicated notifier task, so listeners never run under the
//! orchestrator's lock and cannot mutate a run.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use meridian_core::{
    PipelineRun, RunId, RunStatus, Stage, StageResult, PARALLEL_STAGES, SEQUENTIAL_STAGES,
};

use crate::executor::StageExecutor;

/// Capacity of the stage-event channel; the orchestrator backpressures on a
/// slow notifier rather than dropping events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Run metadata key carrying the terminal failure reason.
pub const FAILURE_REASON_KEY: &str = "failure_reason";

/// A stage finished (either outcome). `run` is the post-append snapshot.
#[derive(Clone, Debug)]
pub struct StageEvent {
    pub run: PipelineRun,
    pub result: StageResult,
}

/// Stage-completion observer. Receives clones; reads of the orchestrator
/// are allowed, mutation is impossible by construction.
pub type StageListener = Arc<dyn Fn(&PipelineRun, &StageResult) + Send + Sync>;

/// Coordinates the full analysis workflow across runs.
#[derive(Clone)]
pub struct Orchestrator {
    executor: Arc<dyn StageExecutor>,
    runs: Arc<RwLock<HashMap<RunId, PipelineRun>>>,
    listeners: Arc<std::sync::RwLock<Vec<StageListener>>>,
    events_tx: mpsc::Sender<StageEvent>,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Builds an orchestrator and spawns its notifier task. `cancel` is the
    /// ambient cancellation signal, honored between stages.
    pub fn new(executor: Arc<dyn StageExecutor>, cancel: CancellationToken) -> Self {
        let (events_tx, mut events_rx) = mpsc::channel::<StageEvent>(EVENT_CHANNEL_CAPACITY);
        let listeners: Arc<std::sync::RwLock<Vec<StageListener>>> =
            Arc::new(std::sync::RwLock::new(Vec::new()));

        let notifier_listeners = listeners.clone();
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                let snapshot: Vec<StageListener> = {
                    match notifier_listeners.read() {
                        Ok(guard) => guard.clone(),
                        Err(poisoned) => poisoned.into_inner().clone(),
                    }
                };
                for listener in snapshot {
                    listener(&event.run, &event.result);
                }
            }
        });

        Self {
            executor,
            runs: Arc::new(RwLock::new(HashMap::new())),
            listeners,
            events_tx,
            cancel,
        }
    }

    /// Registers a stage-completion observer. Invoked after every executed
    /// stage, succeeded or failed, in stage-append order.
    pub fn on_stage_complete(&self, listener: StageListener) {
        match self.listeners.write() {
            Ok(mut guard) => guard.push(listener),
            Err(poisoned) => poisoned.into_inner().push(listener),
        }
    }

    /// Registers a new run and starts executing it asynchronously. Returns
    /// the registered snapshot immediately.
    pub async fn start(
        &self,
        repo_id: impl Into<String>,
        org_id: impl Into<String>,
        commit_sha: Option<String>,
        branch: impl Into<String>,
    ) -> PipelineRun {
        let run = PipelineRun::new(repo_id, org_id, commit_sha, branch);
        {
            let mut runs = self.runs.write().await;
            runs.insert(run.id.clone(), run.clone());
        }

        tracing::info!(
            pipeline_id = %run.id,
            repo_id = %run.repo_id,
            org_id = %run.org_id,
            commit = run.commit_sha.as_deref().unwrap_or(""),
            "pipeline started"
        );

        let this = self.clone();
        let run_id = run.id.clone();
        tokio::spawn(async move { this.execute_run(run_id).await });
        run
    }

    /// Returns a copy of the run, if known.
    pub async fn get(&self, id: &str) -> Option<PipelineRun> {
        self.runs.read().await.get(id).cloned()
    }

    /// Returns copies of all known runs.
    pub async fn list(&self) -> Vec<PipelineRun> {
        self.runs.read().await.values().cloned().collect()
    }

    async fn execute_run(&self, run_id: RunId) {
        for stage in SEQUENTIAL_STAGES {
            if self.cancel.is_cancelled() {
                self.fail_run(&run_id, "pipeline cancelled").await;
                return;
            }

            let Some(result) = self.execute_stage(&run_id, stage).await else {
                return;
            };
            if result.status == RunStatus::Failed {
                let reason = format!(
                    "stage {stage} failed: {}",
                    result.error.as_deref().unwrap_or("unknown error")
                );
                self.fail_run(&run_id, &reason).await;
                return;
            }
        }

        // Parallel fan-out: best-effort post-processing, recorded but never
        // failing the run.
        let mut join = JoinSet::new();
        for stage in PARALLEL_STAGES {
            let this = self.clone();
            let id = run_id.clone();
            join.spawn(async move {
                this.execute_stage(&id, stage).await;
            });
        }
        while join.join_next().await.is_some() {}

        let completed = {
            let mut runs = self.runs.write().await;
            let Some(run) = runs.get_mut(&run_id) else {
                return;
            };
            let now = Utc::now();
            run.status = RunStatus::Completed;
            run.completed_at = Some(now);
            run.total_duration_ms = duration_ms_between(run.created_at, now);
            run.clone()
        };

        tracing::info!(
            pipeline_id = %run_id,
            duration_ms = completed.total_duration_ms,
            stages = completed.stages.len(),
            "pipeline completed"
        );
    }

    /// Executes one stage, appends its result under the write lock, and
    /// posts the stage event. Returns `None` when the run is unknown.
    async fn execute_stage(&self, run_id: &RunId, stage: Stage) -> Option<StageResult> {
        let snapshot = self.get(run_id).await?;
        let started = Utc::now();
        tracing::debug!(pipeline_id = %run_id, stage = %stage, "stage started");

        let outcome = self.executor.execute(stage, &snapshot, &self.cancel).await;
        let ended = Utc::now();
        let duration_ms = duration_ms_between(started, ended);

        let result = match outcome {
            Ok(output) => {
                tracing::debug!(
                    pipeline_id = %run_id,
                    stage = %stage,
                    duration_ms,
                    "stage completed"
                );
                StageResult {
                    stage,
                    status: RunStatus::Completed,
                    started_at: started,
                    ended_at: Some(ended),
                    duration_ms,
                    output: Some(output),
                    error: None,
                }
            }
            Err(err) => {
                tracing::warn!(
                    pipeline_id = %run_id,
                    stage = %stage,
                    error = %err,
                    "stage failed"
                );
                StageResult {
                    stage,
                    status: RunStatus::Failed,
                    started_at: started,
                    ended_at: Some(ended),
                    duration_ms,
                    output: None,
                    error: Some(err.to_string()),
                }
            }
        };

        {
            // Emission order must equal append order, so the event goes into
            // the channel under the same write-lock scope as the append. The
            // notifier drains independently and never takes this lock.
            let mut runs = self.runs.write().await;
            let run = runs.get_mut(run_id)?;
            run.stages.push(result.clone());
            let event_run = run.clone();
            let _ = self
                .events_tx
                .send(StageEvent {
                    run: event_run,
                    result: result.clone(),
                })
                .await;
        }

        Some(result)
    }

    async fn fail_run(&self, run_id: &RunId, reason: &str) {
        let mut runs = self.runs.write().await;
        if let Some(run) = runs.get_mut(run_id) {
            let now = Utc::now();
            run.status = RunStatus::Failed;
            run.completed_at = Some(now);
            run.total_duration_ms = duration_ms_between(run.created_at, now);
            run.metadata
                .insert(FAILURE_REASON_KEY.to_string(), reason.to_string());
        }
        tracing::error!(pipeline_id = %run_id, reason, "pipeline failed");
    }
}

fn duration_ms_between(from: chrono::DateTime<Utc>, to: chrono::DateTime<Utc>) -> f64 {
    let delta = to - from;
    delta
        .num_microseconds()
        .map(|us| us as f64 / 1_000.0)
        .unwrap_or_else(|| delta.num_milliseconds() as f64)
}
