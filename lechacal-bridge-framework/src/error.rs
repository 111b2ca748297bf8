//! Error types for the bridge framework.

use thiserror::Error;

/// Result type alias using [`BridgeError`].
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur in a bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// MQTT client error.
    #[error("MQTT error: {0}")]
    Mqtt(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Publishing error.
    #[error("Failed to publish to {topic}: {message}")]
    Publish { topic: String, message: String },

    /// Worker error.
    #[error("Worker error: {0}")]
    Worker(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a worker error.
    pub fn worker(msg: impl Into<String>) -> Self {
        Self::Worker(msg.into())
    }

    /// Create a publish error for a topic.
    pub fn publish(topic: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Publish {
            topic: topic.into(),
            message: msg.into(),
        }
    }
}

impl From<lechacal_common::Error> for BridgeError {
    fn from(err: lechacal_common::Error) -> Self {
        match err {
            lechacal_common::Error::Io(e) => Self::Io(e),
            lechacal_common::Error::Mqtt(e) => Self::Mqtt(e.to_string()),
            lechacal_common::Error::Json(e) => Self::Serialization(e.to_string()),
            other => Self::Config(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_error_display() {
        let err = BridgeError::publish("homeassistant/sensor/x", "queue full");
        assert_eq!(
            err.to_string(),
            "Failed to publish to homeassistant/sensor/x: queue full"
        );
    }

    #[test]
    fn test_from_common_error() {
        let err: BridgeError = lechacal_common::parse_broker_url("nope").unwrap_err().into();
        assert!(matches!(err, BridgeError::Config(_)));
    }
}
