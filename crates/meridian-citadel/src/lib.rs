//! Citadel intake: consumes pipeline stage events from the bus and keeps
//! per-repository health tallies.
//!
//! Consumer contract: a message is acknowledged by advancing only after it
//! processed successfully; a processing failure routes the raw payload into
//! the dead-letter queue and the loop keeps reading.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use meridian_core::{
    BusMessage, BusReceiver, CoreError, PipelineRun, RunStatus, StageResult,
};
use meridian_resilience::{DeadLetterMessage, DeadLetterQueue};

/// Per-repository intake counters.
#[derive(Clone, Debug, Default, Serialize)]
pub struct StageTally {
    pub repo_id: String,
    pub completed_stages: u64,
    pub failed_stages: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event_at: Option<DateTime<Utc>>,
}

/// Event intake for the drift detector. Analysis itself lives elsewhere;
/// this holds the raw per-repo signal.
pub struct CitadelMonitor {
    tallies: RwLock<HashMap<String, StageTally>>,
    dlq: Arc<DeadLetterQueue>,
}

impl CitadelMonitor {
    pub fn new(dlq: Arc<DeadLetterQueue>) -> Self {
        Self {
            tallies: RwLock::new(HashMap::new()),
            dlq,
        }
    }

    /// Consumes stage events until the ambient signal fires.
    pub async fn consume(&self, mut rx: BusReceiver, cancel: CancellationToken) {
        loop {
            match rx.read(&cancel).await {
                Ok(msg) => {
                    if let Err(err) = self.process(&msg) {
                        tracing::warn!(
                            message_id = %msg.id,
                            error = %err,
                            "stage event processing failed, routing to DLQ"
                        );
                        self.dlq.enqueue(DeadLetterMessage::new(
                            msg.id.clone(),
                            msg.topic.clone(),
                            msg.payload.clone(),
                            err.to_string(),
                        ));
                    }
                }
                Err(CoreError::Cancelled) => {
                    tracing::info!("citadel consumer stopped");
                    return;
                }
                Err(CoreError::Transient(detail)) => {
                    tracing::warn!(detail, "citadel consumer lagged");
                }
                Err(err) => {
                    tracing::warn!(error = %err, "citadel consumer closed");
                    return;
                }
            }
        }
    }

    fn process(&self, msg: &BusMessage) -> Result<(), CoreError> {
        let run: PipelineRun = serde_json::from_value(msg.payload["run"].clone())
            .map_err(|e| CoreError::InvalidInput(format!("malformed stage event run: {e}")))?;
        let result: StageResult = serde_json::from_value(msg.payload["result"].clone())
            .map_err(|e| CoreError::InvalidInput(format!("malformed stage event result: {e}")))?;

        let mut tallies = self.write();
        let tally = tallies
            .entry(run.repo_id.clone())
            .or_insert_with(|| StageTally {
                repo_id: run.repo_id.clone(),
                ..StageTally::default()
            });
        match result.status {
            RunStatus::Failed => tally.failed_stages += 1,
            _ => tally.completed_stages += 1,
        }
        tally.last_event_at = Some(msg.published_at);
        Ok(())
    }

    /// Snapshot of every repository tally, sorted by repo id.
    pub fn tallies(&self) -> Vec<StageTally> {
        let mut all: Vec<StageTally> = self.read().values().cloned().collect();
        all.sort_by(|a, b| a.repo_id.cmp(&b.repo_id));
        all
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, StageTally>> {
        match self.tallies.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, StageTally>> {
        match self.tallies.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use meridian_core::{EventBus, InMemoryBus, Stage, PIPELINE_STAGES_TOPIC};
    use serde_json::json;

    fn stage_event(repo: &str, status: RunStatus) -> serde_json::Value {
        let run = PipelineRun::new(repo, "org-1", None, "main");
        let result = StageResult {
            stage: Stage::Upload,
            status,
            started_at: Utc::now(),
            ended_at: Some(Utc::now()),
            duration_ms: 1.0,
            output: None,
            error: None,
        };
        json!({"run": run, "result": result})
    }

    #[tokio::test]
    async fn tallies_split_completed_and_failed() {
        let dlq = Arc::new(DeadLetterQueue::new());
        let monitor = Arc::new(CitadelMonitor::new(dlq));
        let bus = InMemoryBus::new();
        let rx = bus.subscribe(PIPELINE_STAGES_TOPIC);
        let cancel = CancellationToken::new();

        let consumer = monitor.clone();
        tokio::spawn(async move { consumer.consume(rx, cancel).await });

        bus.publish(PIPELINE_STAGES_TOPIC, stage_event("repo-1", RunStatus::Completed))
            .unwrap();
        bus.publish(PIPELINE_STAGES_TOPIC, stage_event("repo-1", RunStatus::Failed))
            .unwrap();
        bus.publish(PIPELINE_STAGES_TOPIC, stage_event("repo-2", RunStatus::Completed))
            .unwrap();

        for _ in 0..100 {
            if monitor.tallies().len() == 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let tallies = monitor.tallies();
        assert_eq!(tallies.len(), 2);
        assert_eq!(tallies[0].repo_id, "repo-1");
        assert_eq!(tallies[0].completed_stages, 1);
        assert_eq!(tallies[0].failed_stages, 1);
        assert_eq!(tallies[1].completed_stages, 1);
    }

    #[tokio::test]
    async fn poisoned_payload_lands_in_the_dlq_and_consumption_continues() {
        let dlq = Arc::new(DeadLetterQueue::new());
        let monitor = Arc::new(CitadelMonitor::new(dlq.clone()));
        let bus = InMemoryBus::new();
        let rx = bus.subscribe(PIPELINE_STAGES_TOPIC);
        let cancel = CancellationToken::new();

        let consumer = monitor.clone();
        tokio::spawn(async move { consumer.consume(rx, cancel).await });

        bus.publish(PIPELINE_STAGES_TOPIC, json!({"garbage": true}))
            .unwrap();
        bus.publish(PIPELINE_STAGES_TOPIC, stage_event("repo-1", RunStatus::Completed))
            .unwrap();

        for _ in 0..100 {
            if dlq.size() == 1 && !monitor.tallies().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        assert_eq!(dlq.size(), 1);
        let poisoned = &dlq.list()[0];
        assert_eq!(poisoned.original_topic, PIPELINE_STAGES_TOPIC);
        assert!(poisoned.error.contains("malformed stage event"));
        assert_eq!(monitor.tallies().len(), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_the_consumer() {
        let dlq = Arc::new(DeadLetterQueue::new());
        let monitor = Arc::new(CitadelMonitor::new(dlq));
        let bus = InMemoryBus::new();
        let rx = bus.subscribe(PIPELINE_STAGES_TOPIC);
        let cancel = CancellationToken::new();

        let consumer = monitor.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { consumer.consume(rx, token).await });

        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("consumer should stop on cancellation")
            .unwrap();
    }
}
