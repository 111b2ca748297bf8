//! In-memory transport that records every publication.
//!
//! Stands in for a broker when exercising publishers and pipelines. A
//! bounded transport behaves like the client's request queue: recorded
//! messages hold a slot until [`MemoryTransport::drain`] takes them.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::error::{BridgeError, Result};
use crate::publisher::MqttTransport;

/// A message captured by [`MemoryTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

impl PublishedMessage {
    /// Payload decoded as UTF-8 (lossy).
    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Recording transport.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    messages: Mutex<Vec<PublishedMessage>>,
    failing_topics: Mutex<HashSet<String>>,
    /// Free queue slots; `None` is unbounded.
    slots: Option<Semaphore>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport holding at most `capacity` undrained messages.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Some(Semaphore::new(capacity)),
            ..Self::default()
        }
    }

    /// Make every publish to `topic` fail.
    pub fn fail_topic(&self, topic: impl Into<String>) {
        lock(&self.failing_topics).insert(topic.into());
    }

    /// All recorded messages, in publication order.
    pub fn messages(&self) -> Vec<PublishedMessage> {
        lock(&self.messages).clone()
    }

    /// Recorded messages for a single topic.
    pub fn messages_for(&self, topic: &str) -> Vec<PublishedMessage> {
        lock(&self.messages)
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Topics of all recorded messages, in publication order.
    pub fn topics(&self) -> Vec<String> {
        lock(&self.messages)
            .iter()
            .map(|m| m.topic.clone())
            .collect()
    }

    /// Payload of the most recent message on `topic`.
    pub fn last_payload(&self, topic: &str) -> Option<String> {
        lock(&self.messages)
            .iter()
            .rev()
            .find(|m| m.topic == topic)
            .map(PublishedMessage::payload_str)
    }

    pub fn clear(&self) {
        self.drain();
    }

    /// Take every recorded message, freeing its queue slot.
    pub fn drain(&self) -> Vec<PublishedMessage> {
        let drained = std::mem::take(&mut *lock(&self.messages));
        if let Some(slots) = &self.slots {
            slots.add_permits(drained.len());
        }
        drained
    }

    fn check_topic(&self, topic: &str) -> Result<()> {
        if lock(&self.failing_topics).contains(topic) {
            return Err(BridgeError::publish(topic, "rejected by memory transport"));
        }
        Ok(())
    }

    fn record(&self, topic: &str, payload: Vec<u8>, retain: bool) {
        lock(&self.messages).push(PublishedMessage {
            topic: topic.to_string(),
            payload,
            retain,
        });
    }
}

#[async_trait]
impl MqttTransport for MemoryTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()> {
        self.check_topic(topic)?;
        if let Some(slots) = &self.slots {
            slots
                .acquire()
                .await
                .map_err(|e| BridgeError::publish(topic, e.to_string()))?
                .forget();
        }
        self.record(topic, payload, retain);
        Ok(())
    }

    fn try_publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()> {
        self.check_topic(topic)?;
        if let Some(slots) = &self.slots {
            slots
                .try_acquire()
                .map_err(|_| BridgeError::publish(topic, "queue full"))?
                .forget();
        }
        self.record(topic, payload, retain);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
