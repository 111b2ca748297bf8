use thiserror::Error;

/// Common error type for LeChacal bridge components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("MQTT client error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid broker URL '{url}': {reason}")]
    BrokerUrl { url: String, reason: String },
}

impl Error {
    pub(crate) fn broker_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::BrokerUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
