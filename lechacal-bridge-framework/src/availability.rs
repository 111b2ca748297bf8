//! Bridge availability reporting.
//!
//! Availability is level-triggered: the monitor republishes the current state
//! on every tick, whether or not it changed, so a hub that missed an update
//! catches up within one interval.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, MissedTickBehavior};

use crate::Result;
use crate::publisher::Publisher;

/// Payload published while telemetry is flowing.
pub const PAYLOAD_ONLINE: &str = "online";
/// Payload published once telemetry went stale.
pub const PAYLOAD_OFFLINE: &str = "offline";

/// Availability of the bridged device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    /// A line arrived within the staleness window.
    Online,
    /// No line yet, or the last one is older than the staleness window.
    Offline,
}

impl Availability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Availability::Online => PAYLOAD_ONLINE,
            Availability::Offline => PAYLOAD_OFFLINE,
        }
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timestamp of the most recent telemetry arrival.
///
/// Shared between the line pipeline (writer) and the availability check
/// (reader). Stored as epoch milliseconds; `0` means nothing arrived yet.
#[derive(Debug, Default)]
pub struct ArrivalTracker {
    last_arrival_ms: AtomicI64,
}

impl ArrivalTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an arrival now.
    pub fn record_arrival(&self) {
        self.record_arrival_at(Utc::now().timestamp_millis());
    }

    /// Record an arrival at an explicit epoch-millisecond instant.
    pub fn record_arrival_at(&self, timestamp_ms: i64) {
        self.last_arrival_ms.store(timestamp_ms, Ordering::Release);
    }

    /// Epoch milliseconds of the last arrival, if any.
    pub fn last_arrival(&self) -> Option<i64> {
        match self.last_arrival_ms.load(Ordering::Acquire) {
            0 => None,
            ts => Some(ts),
        }
    }

    /// Availability as seen at `now_ms` with the given staleness window.
    pub fn availability_at(&self, now_ms: i64, staleness_window: Duration) -> Availability {
        let window_ms = i64::try_from(staleness_window.as_millis()).unwrap_or(i64::MAX);

        match self.last_arrival() {
            Some(last) if now_ms.saturating_sub(last) < window_ms => Availability::Online,
            _ => Availability::Offline,
        }
    }
}

/// Timing of the availability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailabilityConfig {
    /// How often the current state is republished.
    pub check_interval: Duration,
    /// Maximum age of the last arrival for the device to count as online.
    pub staleness_window: Duration,
}

impl Default for AvailabilityConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(300),
            staleness_window: Duration::from_secs(300),
        }
    }
}

/// Periodically publishes `online`/`offline` to the availability topic.
#[derive(Debug, Clone)]
pub struct AvailabilityMonitor {
    tracker: Arc<ArrivalTracker>,
    publisher: Publisher,
    topic: String,
    config: AvailabilityConfig,
}

impl AvailabilityMonitor {
    pub fn new(
        tracker: Arc<ArrivalTracker>,
        publisher: Publisher,
        topic: impl Into<String>,
        config: AvailabilityConfig,
    ) -> Self {
        Self {
            tracker,
            publisher,
            topic: topic.into(),
            config,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Mark that a line was processed just now.
    pub fn record_arrival(&self) {
        self.tracker.record_arrival();
    }

    /// Current availability.
    pub fn status(&self) -> Availability {
        self.tracker
            .availability_at(Utc::now().timestamp_millis(), self.config.staleness_window)
    }

    /// Publish the current availability once.
    pub async fn publish_current(&self) -> Result<Availability> {
        let status = self.status();
        self.publisher.publish(&self.topic, status.as_str()).await?;
        tracing::debug!(topic = %self.topic, status = %status, "Published availability");
        Ok(status)
    }

    /// Republish availability every check interval, forever.
    ///
    /// The first check happens one interval after start.
    pub async fn run(self) {
        let period = self.config.check_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            topic = %self.topic,
            interval_secs = period.as_secs(),
            window_secs = self.config.staleness_window.as_secs(),
            "Starting availability monitor"
        );

        let mut last = None;
        loop {
            ticker.tick().await;
            match self.publish_current().await {
                Ok(status) => {
                    if last != Some(status) {
                        tracing::info!(status = %status, "Availability changed");
                        last = Some(status);
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Failed to publish availability"),
            }
        }
    }
}
