//! LeChacal Bridge Framework
//!
//! Common abstractions for bridges that publish telemetry to an MQTT broker.
//!
//! # Overview
//!
//! This framework provides:
//! - [`BridgeArgs`] for logging and broker CLI/environment arguments
//! - [`BridgeRunner`] for managing bridge lifecycle (startup, shutdown, signal handling)
//! - [`Publisher`] for publishing payloads through an [`MqttTransport`]
//! - [`AvailabilityMonitor`] for level-triggered `online`/`offline` reporting
//! - [`ConnectionWatcher`] for reacting to broker (re)connections
//! - [`MemoryTransport`] for exercising publishers without a broker
//!
//! # Example
//!
//! ```ignore
//! use lechacal_bridge_framework::{BridgeArgs, BridgeRunner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = MyArgs::parse();
//!     let mut runner = BridgeRunner::new_with_args("mybridge", &args.bridge, "mybridge")?;
//!
//!     // Spawn background workers
//!     runner.spawn(my_worker(runner.publisher()));
//!
//!     // Run until the main worker ends or Ctrl+C
//!     runner.run_until(read_lines(runner.publisher())).await?;
//!     Ok(())
//! }
//! ```

mod args;
mod availability;
mod connection;
mod error;
mod memory;
mod publisher;
mod runner;

pub use args::BridgeArgs;
pub use availability::{
    ArrivalTracker, Availability, AvailabilityConfig, AvailabilityMonitor, PAYLOAD_OFFLINE,
    PAYLOAD_ONLINE,
};
pub use connection::{ConnectionWatcher, LinkState, drive_event_loop, link_channel};
pub use error::{BridgeError, Result};
pub use memory::{MemoryTransport, PublishedMessage};
pub use publisher::{MqttTransport, PublishStats, Publisher};
pub use runner::BridgeRunner;

// Re-export commonly used types from lechacal-common
pub use lechacal_common::{LogFormat, LoggingConfig, MqttConfig, SensorValue, TopicBuilder};
