//! Bounded in-memory dead-letter queue.
//!
//! Failed units of asynchronous work are held here for inspection or
//! requeue. The queue is keyed by message id and bounded; at capacity the
//! message with the earliest `first_failed` is evicted, atomically with the
//! insertion.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_MAX_SIZE: usize = 10_000;

/// A failed unit of asynchronous work.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeadLetterMessage {
    pub id: String,
    pub original_topic: String,
    pub payload: Value,
    pub error: String,
    pub retry_count: u32,
    pub max_retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_failed: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failed: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl DeadLetterMessage {
    pub fn new(
        id: impl Into<String>,
        original_topic: impl Into<String>,
        payload: Value,
        error: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            original_topic: original_topic.into(),
            payload,
            error: error.into(),
            retry_count: 0,
            max_retries: 3,
            first_failed: None,
            last_failed: None,
            metadata: HashMap::new(),
        }
    }
}

/// Queue statistics, including per-topic counts.
#[derive(Clone, Debug, Serialize)]
pub struct DlqStats {
    pub total_messages: usize,
    pub max_size: usize,
    pub by_topic: HashMap<String, usize>,
}

/// Bounded dead-letter queue; all operations are concurrency-safe.
pub struct DeadLetterQueue {
    messages: Mutex<HashMap<String, DeadLetterMessage>>,
    max_size: usize,
}

impl DeadLetterQueue {
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_MAX_SIZE)
    }

    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            messages: Mutex::new(HashMap::new()),
            max_size: if max_size == 0 {
                DEFAULT_MAX_SIZE
            } else {
                max_size
            },
        }
    }

    /// Adds a failed message: stamps `last_failed`, keeps the original
    /// `first_failed`, and bumps the retry counter. When the queue is full
    /// the oldest message by `first_failed` is evicted first.
    pub fn enqueue(&self, mut msg: DeadLetterMessage) {
        let mut messages = self.lock();

        if !messages.contains_key(&msg.id) && messages.len() >= self.max_size {
            tracing::warn!(max_size = self.max_size, "DLQ at capacity, dropping oldest message");
            Self::evict_oldest(&mut messages);
        }

        let now = Utc::now();
        msg.last_failed = Some(now);
        if msg.first_failed.is_none() {
            msg.first_failed = Some(now);
        }
        msg.retry_count += 1;

        tracing::info!(
            id = %msg.id,
            topic = %msg.original_topic,
            retry_count = msg.retry_count,
            error = %msg.error,
            "message added to DLQ"
        );
        messages.insert(msg.id.clone(), msg);
    }

    /// Removes and returns a message for reprocessing.
    pub fn dequeue(&self, id: &str) -> Option<DeadLetterMessage> {
        self.lock().remove(id)
    }

    pub fn list(&self) -> Vec<DeadLetterMessage> {
        self.lock().values().cloned().collect()
    }

    pub fn size(&self) -> usize {
        self.lock().len()
    }

    pub fn stats(&self) -> DlqStats {
        let messages = self.lock();
        let mut by_topic: HashMap<String, usize> = HashMap::new();
        for msg in messages.values() {
            *by_topic.entry(msg.original_topic.clone()).or_default() += 1;
        }
        DlqStats {
            total_messages: messages.len(),
            max_size: self.max_size,
            by_topic,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, DeadLetterMessage>> {
        match self.messages.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn evict_oldest(messages: &mut HashMap<String, DeadLetterMessage>) {
        let oldest = messages
            .values()
            .min_by_key(|m| m.first_failed)
            .map(|m| m.id.clone());
        if let Some(id) = oldest {
            messages.remove(&id);
        }
    }
}

impl Default for DeadLetterQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg(id: &str, topic: &str) -> DeadLetterMessage {
        DeadLetterMessage::new(id, topic, json!({"n": id}), "consumer failed")
    }

    #[test]
    fn enqueue_stamps_timestamps_and_retry_count() {
        let dlq = DeadLetterQueue::new();
        dlq.enqueue(msg("m1", "pipeline.stages"));

        let stored = dlq.dequeue("m1").unwrap();
        assert_eq!(stored.retry_count, 1);
        assert!(stored.first_failed.is_some());
        assert_eq!(stored.first_failed, stored.last_failed);
    }

    #[test]
    fn re_enqueue_keeps_first_failed_and_bumps_retries() {
        let dlq = DeadLetterQueue::new();
        dlq.enqueue(msg("m1", "pipeline.stages"));
        let first = dlq.dequeue("m1").unwrap();

        dlq.enqueue(first.clone());
        let second = dlq.dequeue("m1").unwrap();
        assert_eq!(second.retry_count, 2);
        assert_eq!(second.first_failed, first.first_failed);
    }

    #[test]
    fn bound_holds_and_evicts_the_oldest_first_failed() {
        let dlq = DeadLetterQueue::with_max_size(3);
        for i in 0..5 {
            dlq.enqueue(msg(&format!("m{i}"), "pipeline.stages"));
            // first_failed ordering needs distinct timestamps.
            std::thread::sleep(std::time::Duration::from_millis(2));
        }

        assert_eq!(dlq.size(), 3);
        assert!(dlq.dequeue("m0").is_none());
        assert!(dlq.dequeue("m1").is_none());
        assert!(dlq.dequeue("m4").is_some());
    }

    #[test]
    fn stats_count_per_topic() {
        let dlq = DeadLetterQueue::new();
        dlq.enqueue(msg("a", "pipeline.stages"));
        dlq.enqueue(msg("b", "pipeline.stages"));
        dlq.enqueue(msg("c", "mesh.health"));

        let stats = dlq.stats();
        assert_eq!(stats.total_messages, 3);
        assert_eq!(stats.by_topic["pipeline.stages"], 2);
        assert_eq!(stats.by_topic["mesh.health"], 1);
    }

    #[test]
    fn dequeue_unknown_id_is_none() {
        let dlq = DeadLetterQueue::new();
        assert!(dlq.dequeue("missing").is_none());
    }
}
