use std::fmt;

/// A decoded sensor value, as published on a state topic.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorValue {
    /// Whole number (e.g. a node id).
    Integer(i64),

    /// Measurement with a fractional part (power, current, voltage).
    Float(f64),

    /// Opaque text passed through unchanged.
    Text(String),
}

impl SensorValue {
    /// Render the value as an MQTT payload.
    pub fn to_payload(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorValue::Integer(v) => write!(f, "{}", v),
            SensorValue::Float(v) => write!(f, "{}", v),
            SensorValue::Text(v) => f.write_str(v),
        }
    }
}
