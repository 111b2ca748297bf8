//! LeChacal Common Library
//!
//! This crate provides shared types and utilities for the LeChacal MQTT bridge:
//!
//! - [`telemetry`] - Decoded sensor values (`SensorValue`)
//! - [`config`] - Logging and MQTT configuration, JSON5 loading
//! - [`session`] - Broker URL parsing and MQTT client construction
//! - [`topic`] - MQTT topic builders for discovery, state and availability
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod session;
pub mod telemetry;
pub mod topic;

// Re-export commonly used types at the crate root
pub use config::{LogFormat, LoggingConfig, MqttConfig, load_config, parse_config};
pub use error::{Error, Result};
pub use session::{BrokerAddress, connect, parse_broker_url};
pub use telemetry::SensorValue;
pub use topic::{AVAILABILITY_ROOT, TopicBuilder};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// `RUST_LOG` takes precedence over the configured level when set.
///
/// # Example
///
/// ```ignore
/// use lechacal_common::{LoggingConfig, LogFormat, init_tracing};
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: LogFormat::Json,
/// };
/// init_tracing(&config)?;
/// ```
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
