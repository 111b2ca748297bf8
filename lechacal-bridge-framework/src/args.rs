//! CLI argument parsing shared by bridges.
//!
//! Every option can also be provided through the environment variable named
//! next to it, which is how container deployments configure the bridge.

use clap::Args;
use lechacal_common::{LogFormat, LoggingConfig, MqttConfig};

/// Logging and broker arguments common to all bridges.
///
/// Flatten into a bridge's own `clap::Parser` with `#[command(flatten)]`.
#[derive(Args, Debug, Clone)]
pub struct BridgeArgs {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format (text, json).
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: LogFormat,

    /// MQTT broker URL.
    #[arg(long, env = "MQTT_URL", default_value = "mqtt://localhost:1883")]
    pub mqtt_url: String,

    /// MQTT username.
    #[arg(long, env = "MQTT_USER")]
    pub mqtt_user: Option<String>,

    /// MQTT password.
    #[arg(long, env = "MQTT_PASSWORD", hide_env_values = true)]
    pub mqtt_password: Option<String>,

    /// MQTT client id (defaults to a bridge-specific id).
    #[arg(long, env = "MQTT_CLIENT_ID")]
    pub mqtt_client_id: Option<String>,

    /// MQTT keep-alive interval in seconds.
    #[arg(long, env = "MQTT_KEEP_ALIVE_SECS", default_value_t = 30)]
    pub mqtt_keep_alive_secs: u64,
}

impl BridgeArgs {
    /// Logging configuration.
    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level.clone(),
            format: self.log_format,
        }
    }

    /// MQTT configuration, using `default_client_id` unless one was given.
    pub fn mqtt(&self, default_client_id: &str) -> MqttConfig {
        MqttConfig {
            url: self.mqtt_url.clone(),
            username: self.mqtt_user.clone(),
            password: self.mqtt_password.clone(),
            client_id: self
                .mqtt_client_id
                .clone()
                .unwrap_or_else(|| default_client_id.to_string()),
            keep_alive_secs: self.mqtt_keep_alive_secs,
            ..MqttConfig::default()
        }
    }
}
