//! Event-bus port for the control plane.
//!
//! The production collaborator is an at-least-once message stream with
//! per-topic consumer groups; the in-memory implementation fans out over
//! broadcast channels to every live subscriber. Consumers acknowledge by
//! advancing only after successful processing; failed payloads are routed
//! to the dead-letter queue by the consumer, not the bus.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::error::CoreError;
use crate::identity::new_id;

/// Capacity of each per-topic channel; a subscriber that lags beyond this
/// observes a `Transient` gap error and keeps reading.
const TOPIC_CHANNEL_CAPACITY: usize = 256;

/// Topic carrying every pipeline stage event published by the gateway.
pub const PIPELINE_STAGES_TOPIC: &str = "pipeline.stages";

/// One message on the bus.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BusMessage {
    pub id: String,
    pub topic: String,
    pub payload: Value,
    pub published_at: DateTime<Utc>,
}

/// Publisher/subscriber seam over the platform's message stream.
pub trait EventBus: Send + Sync {
    /// Publishes a payload to a topic. Publishing to a topic with no live
    /// subscribers succeeds and the message is dropped.
    fn publish(&self, topic: &str, payload: Value) -> Result<(), CoreError>;

    /// Opens a subscription on a topic. Messages published after this call
    /// are delivered at least once to the returned receiver.
    fn subscribe(&self, topic: &str) -> BusReceiver;
}

/// Receiving half of one subscription.
pub struct BusReceiver {
    topic: String,
    inner: broadcast::Receiver<BusMessage>,
}

impl BusReceiver {
    /// Blocks until the next message or the ambient cancellation signal.
    ///
    /// Returns `Cancelled` when the token fires, `Transient` when the
    /// subscriber lagged and messages were dropped (the caller decides
    /// whether to continue), and `NotFound` when the topic was torn down.
    pub async fn read(&mut self, cancel: &CancellationToken) -> Result<BusMessage, CoreError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(CoreError::Cancelled),
            received = self.inner.recv() => match received {
                Ok(msg) => Ok(msg),
                Err(broadcast::error::RecvError::Lagged(skipped)) => Err(CoreError::Transient(
                    format!("subscriber lagged on '{}', {skipped} messages dropped", self.topic),
                )),
                Err(broadcast::error::RecvError::Closed) => {
                    Err(CoreError::NotFound(format!("topic '{}' closed", self.topic)))
                }
            },
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// In-memory bus: one broadcast channel per topic, created on first use.
#[derive(Default)]
pub struct InMemoryBus {
    topics: RwLock<HashMap<String, broadcast::Sender<BusMessage>>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, topic: &str) -> Result<broadcast::Sender<BusMessage>, CoreError> {
        {
            let topics = self
                .topics
                .read()
                .map_err(|_| CoreError::Fatal("bus lock poisoned".into()))?;
            if let Some(tx) = topics.get(topic) {
                return Ok(tx.clone());
            }
        }
        let mut topics = self
            .topics
            .write()
            .map_err(|_| CoreError::Fatal("bus lock poisoned".into()))?;
        Ok(topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CHANNEL_CAPACITY).0)
            .clone())
    }
}

impl EventBus for InMemoryBus {
    fn publish(&self, topic: &str, payload: Value) -> Result<(), CoreError> {
        let tx = self.sender(topic)?;
        let msg = BusMessage {
            id: new_id(),
            topic: topic.to_string(),
            payload,
            published_at: Utc::now(),
        };
        // A send error only means nobody is subscribed right now.
        let receivers = tx.send(msg).unwrap_or(0);
        tracing::trace!(topic, receivers, "bus message published");
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> BusReceiver {
        let inner = match self.sender(topic) {
            Ok(tx) => tx.subscribe(),
            // Lock poisoning surfaces as an immediately-closed channel.
            Err(_) => broadcast::channel(1).0.subscribe(),
        };
        BusReceiver {
            topic: topic.to_string(),
            inner,
        }
    }
}
