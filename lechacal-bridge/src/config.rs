//! Configuration for the LeChacal bridge.
//!
//! Every option is a command-line flag with an environment variable fallback.

use std::path::PathBuf;
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use thiserror::Error;

use lechacal_bridge_framework::{AvailabilityConfig, BridgeArgs, TopicBuilder};

use crate::decoder::NormalizationConfig;

/// Largest accepted `FRACTION_DIGITS`; f64 carries no more significant digits.
pub const MAX_FRACTION_DIGITS: usize = 15;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(String),
}

/// LeChacal RPICT serial telemetry to MQTT bridge.
#[derive(Parser, Debug, Clone)]
#[command(name = "lechacal-mqtt-bridge")]
#[command(about = "Publishes LeChacal RPICT serial telemetry to MQTT with Home Assistant discovery")]
#[command(version)]
pub struct BridgeConfig {
    #[command(flatten)]
    pub bridge: BridgeArgs,

    /// Serial device the RPICT board writes to.
    #[arg(long, env = "SERIAL", default_value = "/dev/ttyAMA0")]
    pub serial: String,

    /// Serial baud rate.
    #[arg(long, env = "BAUD_RATE", default_value_t = 38400)]
    pub baud_rate: u32,

    /// Device mapping file name.
    #[arg(long, env = "DEVICE_MAPPING", default_value = "RPICT7V1.json")]
    pub device_mapping: String,

    /// Directory holding the device mapping files.
    #[arg(long, env = "DEVICE_MAPPING_DIR", default_value = "device-mapping")]
    pub device_mapping_dir: PathBuf,

    /// Digits kept after the decimal point for float fields.
    #[arg(long, env = "FRACTION_DIGITS", default_value_t = 2)]
    pub fraction_digits: usize,

    /// Replace negative values with their absolute value.
    #[arg(
        long,
        env = "INVERT_NEGATIVE_VALUES",
        default_value_t = false,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub invert_negative_values: bool,

    /// Numeric values strictly below this are published as zero.
    #[arg(
        long,
        env = "SENSOR_VALUE_THRESHOLD",
        default_value_t = 0.0,
        allow_negative_numbers = true
    )]
    pub sensor_value_threshold: f64,

    /// Device identifier used in topics and unique ids.
    #[arg(long, env = "IDENTIFIER", default_value = "lechacal")]
    pub identifier: String,

    /// Home Assistant discovery prefix.
    #[arg(long, env = "DISCOVERY_PREFIX", default_value = "homeassistant")]
    pub discovery_prefix: String,

    /// Seconds between availability publications.
    #[arg(long, env = "AVAILABILITY_INTERVAL_SECS", default_value_t = 300)]
    pub availability_interval_secs: u64,

    /// Seconds without a line after which the device is offline.
    #[arg(long, env = "AVAILABILITY_TIMEOUT_SECS", default_value_t = 300)]
    pub availability_timeout_secs: u64,

    /// Seconds between discovery refreshes.
    #[arg(long, env = "DISCOVERY_REFRESH_SECS", default_value_t = 3600)]
    pub discovery_refresh_secs: u64,
}

impl BridgeConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.trim().is_empty() {
            return Err(ConfigError::Validation("serial port cannot be empty".to_string()));
        }

        if self.baud_rate == 0 {
            return Err(ConfigError::Validation("baud rate must be > 0".to_string()));
        }

        if self.device_mapping.trim().is_empty() {
            return Err(ConfigError::Validation(
                "device mapping cannot be empty".to_string(),
            ));
        }

        if self.fraction_digits > MAX_FRACTION_DIGITS {
            return Err(ConfigError::Validation(format!(
                "fraction digits must be at most {}",
                MAX_FRACTION_DIGITS
            )));
        }

        if !self.sensor_value_threshold.is_finite() {
            return Err(ConfigError::Validation(
                "sensor value threshold must be a finite number".to_string(),
            ));
        }

        validate_topic_segment("identifier", &self.identifier, false)?;
        validate_topic_segment("discovery prefix", &self.discovery_prefix, true)?;

        for (name, secs) in [
            ("availability interval", self.availability_interval_secs),
            ("availability timeout", self.availability_timeout_secs),
            ("discovery refresh", self.discovery_refresh_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::Validation(format!("{} must be > 0", name)));
            }
        }

        Ok(())
    }

    /// Path of the device mapping file.
    pub fn mapping_path(&self) -> PathBuf {
        self.device_mapping_dir.join(&self.device_mapping)
    }

    /// Client id used unless `MQTT_CLIENT_ID` is set.
    pub fn default_client_id(&self) -> String {
        format!("lechacal-{}", self.identifier)
    }

    pub fn normalization(&self) -> NormalizationConfig {
        NormalizationConfig {
            fraction_digits: self.fraction_digits,
            invert_negative_values: self.invert_negative_values,
            sensor_value_threshold: self.sensor_value_threshold,
        }
    }

    pub fn availability(&self) -> AvailabilityConfig {
        AvailabilityConfig {
            check_interval: Duration::from_secs(self.availability_interval_secs),
            staleness_window: Duration::from_secs(self.availability_timeout_secs),
        }
    }

    pub fn discovery_refresh(&self) -> Duration {
        Duration::from_secs(self.discovery_refresh_secs)
    }

    pub fn topics(&self) -> TopicBuilder {
        TopicBuilder::new(&self.discovery_prefix, &self.identifier)
    }
}

/// Reject empty values and MQTT wildcards. `allow_levels` permits `/`.
fn validate_topic_segment(name: &str, value: &str, allow_levels: bool) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
    }
    if value.contains(['+', '#']) {
        return Err(ConfigError::Validation(format!(
            "{} cannot contain MQTT wildcards: '{}'",
            name, value
        )));
    }
    if !allow_levels && value.contains('/') {
        return Err(ConfigError::Validation(format!(
            "{} cannot contain '/': '{}'",
            name, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> BridgeConfig {
        BridgeConfig::parse_from(std::iter::once("lechacal-mqtt-bridge").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]);
        assert!(config.validate().is_ok());
        assert_eq!(config.serial, "/dev/ttyAMA0");
        assert_eq!(config.baud_rate, 38400);
        assert_eq!(
            config.mapping_path(),
            PathBuf::from("device-mapping/RPICT7V1.json")
        );
        assert_eq!(config.normalization(), NormalizationConfig::default());
        assert_eq!(config.availability(), AvailabilityConfig::default());
        assert_eq!(config.discovery_refresh(), Duration::from_secs(3600));
        assert_eq!(config.default_client_id(), "lechacal-lechacal");
        assert_eq!(
            config.topics().availability_topic(),
            "lechacal/lechacal/availability"
        );
    }

    #[test]
    fn test_normalization_flags() {
        let config = parse(&[
            "--fraction-digits",
            "0",
            "--invert-negative-values",
            "yes",
            "--sensor-value-threshold",
            "-2.5",
        ]);
        assert!(config.validate().is_ok());

        let normalization = config.normalization();
        assert_eq!(normalization.fraction_digits, 0);
        assert!(normalization.invert_negative_values);
        assert_eq!(normalization.sensor_value_threshold, -2.5);
    }

    #[test]
    fn test_validation_errors() {
        assert!(parse(&["--identifier", "house/1"]).validate().is_err());
        assert!(parse(&["--identifier", "a+b"]).validate().is_err());
        assert!(parse(&["--discovery-prefix", ""]).validate().is_err());
        assert!(parse(&["--fraction-digits", "16"]).validate().is_err());
        assert!(parse(&["--baud-rate", "0"]).validate().is_err());
        assert!(parse(&["--availability-interval-secs", "0"]).validate().is_err());
        assert!(parse(&["--sensor-value-threshold", "NaN"]).validate().is_err());
    }

    #[test]
    fn test_nested_discovery_prefix_is_allowed() {
        let config = parse(&["--discovery-prefix", "ha/discovery"]);
        assert!(config.validate().is_ok());
        assert_eq!(
            config.topics().config_topic("RP1"),
            "ha/discovery/sensor/lechacal_RP1/config"
        );
    }
}
