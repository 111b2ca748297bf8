//! Integration tests for lechacal-common library.

use std::io::Write;

use lechacal_common::{
    AVAILABILITY_ROOT, Error, MqttConfig, SensorValue, TopicBuilder, load_config,
    parse_broker_url,
};
use serde::Deserialize;
use tempfile::NamedTempFile;

#[derive(Debug, Deserialize)]
struct Field {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    unit_of_measurement: String,
}

#[test]
fn test_topic_layout_for_home_assistant() {
    let topics = TopicBuilder::new("homeassistant", "lechacal");

    let state = topics.state_topic("Irms1");
    let config = topics.config_topic("Irms1");

    assert_eq!(state, "homeassistant/sensor/lechacal_Irms1");
    assert_eq!(config, format!("{}/config", state));
    assert!(
        topics
            .availability_topic()
            .starts_with(&format!("{}/", AVAILABILITY_ROOT))
    );
    assert_eq!(topics.unique_id("Irms1"), "lechacal_Irms1");
}

#[test]
fn test_load_json5_file() {
    let mut file = NamedTempFile::new().expect("create temp file");
    writeln!(
        file,
        r#"{{ RP1: {{ type: "float", unit_of_measurement: "W" }}, NodeID: {{ type: "integer" }}, }}"#
    )
    .expect("write mapping");

    let fields: std::collections::BTreeMap<String, Field> =
        load_config(file.path()).expect("load mapping");

    assert_eq!(fields.len(), 2);
    assert_eq!(fields["RP1"].kind, "float");
    assert_eq!(fields["RP1"].unit_of_measurement, "W");
    assert_eq!(fields["NodeID"].unit_of_measurement, "");
}

#[test]
fn test_load_invalid_file() {
    let mut file = NamedTempFile::new().expect("create temp file");
    write!(file, "{{ RP1: ").expect("write mapping");

    let result: lechacal_common::Result<Field> = load_config(file.path());
    let err = result.unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(err.to_string().contains("Failed to parse config file"));
}

#[test]
fn test_default_broker_address() {
    let config = MqttConfig::default();
    let address = parse_broker_url(&config.url).expect("parse url");

    assert_eq!(address.host, "localhost");
    assert_eq!(address.port, 1883);
    assert!(!address.tls);

    let address = parse_broker_url("mqtts://broker.example.com").expect("parse url");
    assert_eq!(address.port, 8883);
    assert!(address.tls);
}

#[test]
fn test_sensor_value_payloads() {
    let values = [
        SensorValue::Integer(11),
        SensorValue::Float(202.1),
        SensorValue::Text("v2".to_string()),
    ];

    let payloads: Vec<String> = values.iter().map(ToString::to_string).collect();
    assert_eq!(payloads, vec!["11", "202.1", "v2"]);
}
