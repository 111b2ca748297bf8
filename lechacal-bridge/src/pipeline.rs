//! Line pipeline: read, decode, publish, record arrival.

use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use lechacal_bridge_framework::{ArrivalTracker, ConnectionWatcher, PublishStats};

use crate::decoder::{DecodedReading, FieldError, LineDecoder};
use crate::readings::ReadingPublisher;

/// Errors that end the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to read from line source: {0}")]
    Read(#[from] std::io::Error),
    #[error("Line source closed after {lines} lines")]
    SourceClosed { lines: u64 },
}

/// What happened to one processed line.
#[derive(Debug, Clone, PartialEq)]
pub struct LineOutcome {
    pub reading: DecodedReading,
    pub errors: Vec<FieldError>,
    pub publish: PublishStats,
}

/// Running totals of the pipeline.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    /// Non-blank lines processed.
    pub lines: u64,
    /// Field errors across all lines.
    pub field_errors: u64,
    /// Values published.
    pub published: u64,
    /// Values that failed to publish.
    pub publish_failures: u64,
    /// Lines decoded while the broker was not connected, whose values were
    /// dropped.
    pub skipped_lines: u64,
}

/// Sequential per-line processing. Lines are handled in arrival order.
#[derive(Debug)]
pub struct Pipeline {
    decoder: LineDecoder,
    readings: ReadingPublisher,
    arrivals: Arc<ArrivalTracker>,
    connection: Option<ConnectionWatcher>,
    dropping: bool,
    stats: PipelineStats,
}

impl Pipeline {
    pub fn new(
        decoder: LineDecoder,
        readings: ReadingPublisher,
        arrivals: Arc<ArrivalTracker>,
    ) -> Self {
        Self {
            decoder,
            readings,
            arrivals,
            connection: None,
            dropping: false,
            stats: PipelineStats::default(),
        }
    }

    /// Only publish readings while the broker link is connected.
    ///
    /// Readings taken while disconnected are dropped instead of filling the
    /// client's request queue ahead of the discovery announcements that
    /// follow the reconnection.
    pub fn with_connection(mut self, connection: ConnectionWatcher) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Decode and publish one line, then record its arrival.
    ///
    /// Blank lines are skipped and return `None`. A line that arrives while
    /// the broker is not connected still counts as an arrival.
    pub fn process_line(&mut self, line: &str) -> Option<LineOutcome> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            tracing::trace!("Skipping blank line");
            return None;
        }

        if self.stats.lines == 0 {
            tracing::info!(line = %line, "Received first line from device");
        } else {
            tracing::debug!(line = %line, "Received line");
        }

        let (reading, errors) = self.decoder.decode(line);
        let publish = if self.link_is_up() {
            self.readings.publish_reading(&reading)
        } else {
            self.stats.skipped_lines += 1;
            PublishStats::default()
        };
        self.arrivals.record_arrival();

        self.stats.lines += 1;
        self.stats.field_errors += errors.len() as u64;
        self.stats.published += publish.success as u64;
        self.stats.publish_failures += publish.failed as u64;

        Some(LineOutcome {
            reading,
            errors,
            publish,
        })
    }

    fn link_is_up(&mut self) -> bool {
        let connected = self
            .connection
            .as_ref()
            .is_none_or(|connection| connection.state().is_connected());

        if connected && self.dropping {
            tracing::info!(
                skipped = self.stats.skipped_lines,
                "Broker connected, publishing readings"
            );
        } else if !connected && !self.dropping {
            tracing::warn!("Broker not connected, dropping readings");
        }
        self.dropping = !connected;
        connected
    }

    /// Process lines until the source reaches end of input.
    ///
    /// Bytes that are not valid UTF-8 are replaced rather than rejected, so
    /// line noise cannot end the pipeline. A read error does.
    pub async fn run<R>(mut self, mut reader: R) -> Result<PipelineStats, PipelineError>
    where
        R: AsyncBufRead + Unpin,
    {
        tracing::info!(
            model = %self.decoder.schema().model(),
            fields = self.decoder.schema().len(),
            "Reading telemetry lines"
        );

        let mut buf = Vec::with_capacity(256);
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                tracing::warn!(lines = self.stats.lines, "Line source reached end of input");
                return Ok(self.stats);
            }

            let line = String::from_utf8_lossy(&buf);
            self.process_line(&line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use lechacal_bridge_framework::{
        LinkState, MemoryTransport, Publisher, SensorValue, TopicBuilder, link_channel,
    };

    use crate::decoder::{FieldDecoder, NormalizationConfig};
    use crate::schema::{DeviceSchema, FieldSpec, FieldType};

    fn pipeline(transport: Arc<MemoryTransport>, arrivals: Arc<ArrivalTracker>) -> Pipeline {
        let schema = DeviceSchema::new(
            "test",
            vec![
                FieldSpec::new("NodeID", FieldType::Integer),
                FieldSpec::new("RP1", FieldType::Float),
            ],
        )
        .unwrap();
        Pipeline::new(
            LineDecoder::new(
                Arc::new(schema),
                FieldDecoder::new(NormalizationConfig::default()),
            ),
            ReadingPublisher::new(
                Publisher::new(transport),
                TopicBuilder::new("homeassistant", "lechacal"),
            ),
            arrivals,
        )
    }

    #[test]
    fn test_blank_line_is_not_an_arrival() {
        let transport = Arc::new(MemoryTransport::new());
        let arrivals = Arc::new(ArrivalTracker::new());
        let mut pipeline = pipeline(transport.clone(), arrivals.clone());

        assert!(pipeline.process_line("  \r\n").is_none());
        assert!(transport.messages().is_empty());
        assert_eq!(arrivals.last_arrival(), None);
        assert_eq!(pipeline.stats().lines, 0);
    }

    #[test]
    fn test_line_records_arrival() {
        let transport = Arc::new(MemoryTransport::new());
        let arrivals = Arc::new(ArrivalTracker::new());
        let mut pipeline = pipeline(transport.clone(), arrivals.clone());

        let outcome = pipeline.process_line("11 208.6\r\n").unwrap();

        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.publish.success, 2);
        assert_eq!(outcome.reading.get("RP1"), Some(&SensorValue::Float(208.6)));
        assert!(arrivals.last_arrival().is_some());
    }

    #[test]
    fn test_readings_follow_link_state() {
        let transport = Arc::new(MemoryTransport::new());
        let arrivals = Arc::new(ArrivalTracker::new());
        let (link_tx, link) = link_channel();
        let mut pipeline = pipeline(transport.clone(), arrivals.clone())
            .with_connection(ConnectionWatcher::new(link));

        let outcome = pipeline.process_line("11 1.5\n").unwrap();
        assert_eq!(outcome.publish, PublishStats::default());
        assert!(transport.messages().is_empty());
        assert!(arrivals.last_arrival().is_some());

        link_tx.send_replace(LinkState::Connected { session: 1 });
        pipeline.process_line("11 2.5\n").unwrap();
        assert_eq!(transport.messages().len(), 2);

        link_tx.send_replace(LinkState::Disconnected);
        pipeline.process_line("11 3.5\n").unwrap();
        assert_eq!(transport.messages().len(), 2);

        let stats = pipeline.stats();
        assert_eq!(stats.lines, 3);
        assert_eq!(stats.skipped_lines, 2);
        assert_eq!(stats.published, 2);
    }

    #[tokio::test]
    async fn test_run_reads_until_end_of_input() {
        let transport = Arc::new(MemoryTransport::new());
        let arrivals = Arc::new(ArrivalTracker::new());

        let input: &[u8] = b"11 1.5\n\n11 abc\n11\xff 2\n";
        let stats = pipeline(transport.clone(), arrivals)
            .run(input)
            .await
            .unwrap();

        assert_eq!(stats.lines, 3);
        assert_eq!(stats.field_errors, 1);
        assert_eq!(stats.published, 6);
        assert_eq!(
            transport.last_payload("homeassistant/sensor/lechacal_RP1").as_deref(),
            Some("2")
        );
    }

    #[tokio::test]
    async fn test_read_error_ends_run() {
        let transport = Arc::new(MemoryTransport::new());
        let reader = tokio_test::io::Builder::new()
            .read(b"11 1.5\n")
            .read_error(std::io::Error::other("device unplugged"))
            .build();

        let result = pipeline(transport.clone(), Arc::new(ArrivalTracker::new()))
            .run(tokio::io::BufReader::new(reader))
            .await;

        assert!(matches!(result, Err(PipelineError::Read(_))));
        assert_eq!(transport.messages().len(), 2);
    }
}
