//! End-to-end orchestrator behavior over the full stage enumeration.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use meridian_core::{
    CoreError, PipelineRun, RunStatus, Stage, PARALLEL_STAGES, SEQUENTIAL_STAGES,
};
use meridian_pipeline::{Orchestrator, StageExecutor};

/// Fast executor with optional per-stage failures.
struct FastStages {
    fail_at: Vec<Stage>,
}

impl FastStages {
    fn flawless() -> Self {
        Self { fail_at: vec![] }
    }
}

#[async_trait]
impl StageExecutor for FastStages {
    async fn execute(
        &self,
        stage: Stage,
        _run: &PipelineRun,
        _cancel: &CancellationToken,
    ) -> Result<Value, CoreError> {
        // A short sleep keeps parallel completion order genuinely racy.
        tokio::time::sleep(Duration::from_millis(2)).await;
        if self.fail_at.contains(&stage) {
            return Err(CoreError::Transient(format!("{stage} unavailable")));
        }
        Ok(json!({"stage": stage.as_str()}))
    }
}

async fn wait_terminal(orchestrator: &Orchestrator, id: &str) -> PipelineRun {
    for _ in 0..500 {
        if let Some(run) = orchestrator.get(id).await {
            if run.status.is_terminal() {
                return run;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("run {id} did not reach a terminal status");
}

#[tokio::test]
async fn happy_path_runs_all_twelve_stages_in_block_order() {
    let orchestrator = Orchestrator::new(Arc::new(FastStages::flawless()), CancellationToken::new());

    let run = orchestrator
        .start("repo-1", "org-1", Some("e3b0c442".into()), "main")
        .await;
    assert_eq!(run.status, RunStatus::Running);

    let done = wait_terminal(&orchestrator, &run.id).await;
    assert_eq!(done.status, RunStatus::Completed);
    assert!(done.total_duration_ms > 0.0);
    assert!(done.completed_at.is_some());
    assert_eq!(done.stages.len(), 12);

    // First eight in the exact sequential order.
    let first_eight: Vec<Stage> = done.stages[..8].iter().map(|s| s.stage).collect();
    assert_eq!(first_eight, SEQUENTIAL_STAGES.to_vec());

    // Last four are the parallel block in some completion order.
    let mut last_four: Vec<Stage> = done.stages[8..].iter().map(|s| s.stage).collect();
    last_four.sort_by_key(|s| s.as_str().to_string());
    let mut expected = PARALLEL_STAGES.to_vec();
    expected.sort_by_key(|s| s.as_str().to_string());
    assert_eq!(last_four, expected);

    for stage in &done.stages {
        assert_eq!(stage.status, RunStatus::Completed);
        assert!(stage.ended_at.is_some());
        assert!(stage.output.is_some());
    }
}

#[tokio::test]
async fn parallel_failures_are_recorded_but_do_not_fail_the_run() {
    let orchestrator = Orchestrator::new(
        Arc::new(FastStages {
            fail_at: vec![Stage::SecurityAlerts, Stage::StrategicInsights],
        }),
        CancellationToken::new(),
    );

    let run = orchestrator.start("repo-1", "org-1", None, "main").await;
    let done = wait_terminal(&orchestrator, &run.id).await;

    assert_eq!(done.status, RunStatus::Completed);
    assert_eq!(done.stages.len(), 12);

    let failed: Vec<Stage> = done
        .stages
        .iter()
        .filter(|s| s.status == RunStatus::Failed)
        .map(|s| s.stage)
        .collect();
    assert_eq!(failed.len(), 2);
    assert!(failed.contains(&Stage::SecurityAlerts));
    assert!(failed.contains(&Stage::StrategicInsights));
}

#[tokio::test]
async fn listeners_observe_events_in_stage_append_order() {
    let orchestrator = Orchestrator::new(Arc::new(FastStages::flawless()), CancellationToken::new());

    let seen: Arc<Mutex<Vec<Stage>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    orchestrator.on_stage_complete(Arc::new(move |_run, result| {
        sink.lock().unwrap().push(result.stage);
    }));

    let run = orchestrator.start("repo-1", "org-1", None, "main").await;
    let done = wait_terminal(&orchestrator, &run.id).await;

    // Give the notifier a beat to drain the channel.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let events = seen.lock().unwrap().clone();
    assert_eq!(events.len(), 12);
    assert_eq!(&events[..8], &SEQUENTIAL_STAGES[..]);

    let appended: Vec<Stage> = done.stages.iter().map(|s| s.stage).collect();
    assert_eq!(events, appended);
}

#[tokio::test]
async fn independent_runs_execute_concurrently() {
    let orchestrator = Orchestrator::new(Arc::new(FastStages::flawless()), CancellationToken::new());

    let a = orchestrator.start("repo-a", "org-1", None, "main").await;
    let b = orchestrator.start("repo-b", "org-2", None, "develop").await;

    let done_a = wait_terminal(&orchestrator, &a.id).await;
    let done_b = wait_terminal(&orchestrator, &b.id).await;
    assert_eq!(done_a.status, RunStatus::Completed);
    assert_eq!(done_b.status, RunStatus::Completed);

    let all = orchestrator.list().await;
    assert_eq!(all.len(), 2);
}
