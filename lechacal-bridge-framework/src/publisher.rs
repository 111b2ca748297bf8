//! MQTT publisher and the transport seam it publishes through.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use rumqttc::{AsyncClient, QoS};

use crate::error::{BridgeError, Result};

/// Anything that can put a payload on an MQTT topic.
///
/// Implementations queue the message; neither method waits for the broker.
/// [`publish`](MqttTransport::publish) waits for room in a full queue,
/// [`try_publish`](MqttTransport::try_publish) fails instead.
///
/// Implemented for [`rumqttc::AsyncClient`]; tests use
/// [`MemoryTransport`](crate::MemoryTransport).
#[async_trait]
pub trait MqttTransport: Send + Sync + fmt::Debug {
    /// Queue a message, waiting for queue capacity if needed.
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()>;

    /// Queue a message without waiting. Fails when the queue is full.
    fn try_publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()>;
}

#[async_trait]
impl MqttTransport for AsyncClient {
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()> {
        AsyncClient::publish(self, topic, QoS::AtMostOnce, retain, payload)
            .await
            .map_err(|e| BridgeError::publish(topic, e.to_string()))
    }

    fn try_publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()> {
        AsyncClient::try_publish(self, topic, QoS::AtMostOnce, retain, payload)
            .map_err(|e| BridgeError::publish(topic, e.to_string()))
    }
}

/// Publisher for sending payloads to the broker.
///
/// Cheap to clone; every clone shares the same transport.
#[derive(Clone, Debug)]
pub struct Publisher {
    transport: Arc<dyn MqttTransport>,
}

impl Publisher {
    /// Create a new publisher.
    pub fn new(transport: Arc<dyn MqttTransport>) -> Self {
        Self { transport }
    }

    /// Publish a transient (non-retained) payload.
    pub async fn publish(&self, topic: &str, payload: impl Into<Vec<u8>>) -> Result<()> {
        self.transport.publish(topic, payload.into(), false).await
    }

    /// Publish a retained payload, replayed by the broker to late subscribers.
    pub async fn publish_retained(&self, topic: &str, payload: impl Into<Vec<u8>>) -> Result<()> {
        self.transport.publish(topic, payload.into(), true).await
    }

    /// Publish a transient payload without waiting for queue capacity.
    pub fn try_publish(&self, topic: &str, payload: impl Into<Vec<u8>>) -> Result<()> {
        self.transport.try_publish(topic, payload.into(), false)
    }

    /// Publish a batch of transient payloads without waiting.
    ///
    /// Every message is attempted; failures are logged and counted.
    pub fn publish_batch<I>(&self, messages: I) -> PublishStats
    where
        I: IntoIterator<Item = (String, Vec<u8>)>,
    {
        let mut stats = PublishStats::default();

        for (topic, payload) in messages {
            match self.try_publish(&topic, payload) {
                Ok(()) => stats.success += 1,
                Err(e) => {
                    stats.failed += 1;
                    tracing::warn!(error = %e, "Failed to publish message");
                }
            }
        }

        stats
    }
}

/// Statistics from a batch publish operation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishStats {
    /// Number of successfully published messages.
    pub success: usize,
    /// Number of failed publishes.
    pub failed: usize,
}
