//! Publishing of decoded values to per-field state topics.

use lechacal_bridge_framework::{PublishStats, Publisher, Result, SensorValue, TopicBuilder};

use crate::decoder::DecodedReading;

/// Publishes field values to their state topics, non-retained.
///
/// Publishing never waits for queue capacity: a reading that does not fit is
/// dropped and counted, and the next line carries fresh values.
#[derive(Debug, Clone)]
pub struct ReadingPublisher {
    publisher: Publisher,
    topics: TopicBuilder,
}

impl ReadingPublisher {
    pub fn new(publisher: Publisher, topics: TopicBuilder) -> Self {
        Self { publisher, topics }
    }

    /// Publish one field's value.
    pub fn publish(&self, field: &str, value: &SensorValue) -> Result<()> {
        self.publisher
            .try_publish(&self.topics.state_topic(field), value.to_payload())
    }

    /// Publish every value of a reading, in schema order.
    ///
    /// Failures are logged per field and counted; the other fields are still
    /// published.
    pub fn publish_reading(&self, reading: &DecodedReading) -> PublishStats {
        let messages: Vec<(String, Vec<u8>)> = reading
            .iter()
            .map(|(field, value)| (self.topics.state_topic(field), value.to_payload()))
            .collect();

        let stats = self.publisher.publish_batch(messages);
        tracing::trace!(
            published = stats.success,
            failed = stats.failed,
            "Published reading"
        );
        stats
    }
}
