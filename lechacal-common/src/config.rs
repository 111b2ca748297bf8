use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};

/// MQTT broker connection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttConfig {
    /// Broker URL, e.g. `mqtt://localhost:1883` or `mqtts://broker:8883`.
    pub url: String,

    /// Optional username.
    pub username: Option<String>,

    /// Optional password.
    pub password: Option<String>,

    /// Client identifier presented to the broker.
    pub client_id: String,

    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u64,

    /// Capacity of the client request queue.
    pub request_capacity: usize,
}

fn default_url() -> String {
    "mqtt://localhost:1883".to_string()
}

fn default_client_id() -> String {
    "lechacal".to_string()
}

fn default_keep_alive_secs() -> u64 {
    30
}

fn default_request_capacity() -> usize {
    100
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            username: None,
            password: None,
            client_id: default_client_id(),
            keep_alive_secs: default_keep_alive_secs(),
            request_capacity: default_request_capacity(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!(
                "unknown log format '{}' (expected 'text' or 'json')",
                other
            )),
        }
    }
}

/// Common logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,

    /// Log output format: "text" or "json".
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Load a file in JSON5 format (plain JSON is accepted too).
pub fn load_config<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    json5::from_str(&content).map_err(|e| {
        Error::Config(format!(
            "Failed to parse config file '{}': {}",
            path.display(),
            e
        ))
    })
}

/// Load a configuration from a JSON5 string.
pub fn parse_config<T: for<'de> Deserialize<'de>>(content: &str) -> Result<T> {
    json5::from_str(content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
}
