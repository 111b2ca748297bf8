//! Bridge from LeChacal RPICT serial telemetry to MQTT.
//!
//! The RPICT board writes one line of whitespace or comma separated values
//! per sample. A device mapping names the value at each position. Every value
//! is published to its own state topic, and every field is announced to Home
//! Assistant through MQTT discovery.
//!
//! # Topics
//!
//! ```text
//! <discovery_prefix>/sensor/<identifier>_<field>          live value
//! <discovery_prefix>/sensor/<identifier>_<field>/config   discovery (retained)
//! lechacal/<identifier>/availability                      online / offline
//! ```

pub mod config;
pub mod decoder;
pub mod discovery;
pub mod pipeline;
pub mod readings;
pub mod schema;
pub mod serial;

pub use config::BridgeConfig;
pub use decoder::{DecodedReading, FieldDecoder, FieldError, LineDecoder, NormalizationConfig};
pub use discovery::{DeviceIdentity, DiscoveryPublisher};
pub use pipeline::{Pipeline, PipelineError, PipelineStats};
pub use readings::ReadingPublisher;
pub use schema::{DeviceSchema, FieldSpec, FieldType, SchemaError, ValueTransform};
