//! Line and field decoding.
//!
//! A telemetry line is a run of tokens separated by spaces, commas or tabs.
//! Tokens are matched to schema fields by position; extra tokens are ignored
//! and missing ones fall back to the type's default.
//!
//! Numeric values are normalized in a fixed order:
//! parse, transform, round, invert, threshold.

use std::fmt;
use std::sync::Arc;

use lechacal_common::SensorValue;

use crate::schema::{DeviceSchema, FieldSpec, FieldType};

/// Numeric normalization settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationConfig {
    /// Digits kept after the decimal point for float fields.
    pub fraction_digits: usize,
    /// Replace negative values with their absolute value.
    pub invert_negative_values: bool,
    /// Numeric values strictly below this become zero.
    pub sensor_value_threshold: f64,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            fraction_digits: 2,
            invert_negative_values: false,
            sensor_value_threshold: 0.0,
        }
    }
}

/// Why a field could not be decoded as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// The line ended before this field's position.
    Missing { field: String },
    /// The token does not start with a number.
    NotNumeric { field: String, raw: String },
}

impl FieldError {
    pub fn field(&self) -> &str {
        match self {
            FieldError::Missing { field } | FieldError::NotNumeric { field, .. } => field,
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldError::Missing { field } => write!(f, "field '{}' missing from line", field),
            FieldError::NotNumeric { field, raw } => {
                write!(f, "field '{}' is not numeric: '{}'", field, raw)
            }
        }
    }
}

impl std::error::Error for FieldError {}

/// Result of decoding one token.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub value: SensorValue,
    /// True when the token was unusable and the default was substituted.
    pub substituted: bool,
}

impl Decoded {
    fn value(value: SensorValue) -> Self {
        Self {
            value,
            substituted: false,
        }
    }

    fn substitute(value: SensorValue) -> Self {
        Self {
            value,
            substituted: true,
        }
    }
}

/// Converts a raw token into a typed, normalized value.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldDecoder {
    config: NormalizationConfig,
}

impl FieldDecoder {
    pub fn new(config: NormalizationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NormalizationConfig {
        &self.config
    }

    /// Value used when a field is missing or unusable.
    pub fn default_value(field_type: &FieldType) -> SensorValue {
        match field_type {
            FieldType::Float => SensorValue::Float(0.0),
            FieldType::Integer => SensorValue::Integer(0),
            FieldType::String | FieldType::Unknown(_) => SensorValue::Text(String::new()),
        }
    }

    /// Decode one token according to its field spec. Never fails.
    pub fn decode(&self, raw: &str, spec: &FieldSpec) -> Decoded {
        match &spec.field_type {
            FieldType::Float => match parse_float_prefix(raw) {
                Some(v) => Decoded::value(SensorValue::Float(self.normalize_float(v, spec))),
                None => Decoded::substitute(SensorValue::Float(0.0)),
            },
            FieldType::Integer => match parse_integer_prefix(raw) {
                Some(v) => Decoded::value(SensorValue::Integer(self.normalize_integer(v, spec))),
                None => Decoded::substitute(SensorValue::Integer(0)),
            },
            FieldType::String | FieldType::Unknown(_) => {
                Decoded::value(SensorValue::Text(raw.to_string()))
            }
        }
    }

    fn normalize_float(&self, value: f64, spec: &FieldSpec) -> f64 {
        let mut v = match spec.transform {
            Some(transform) => transform.apply(value),
            None => value,
        };
        v = round_to(v, self.config.fraction_digits);
        if self.config.invert_negative_values && v < 0.0 {
            v = -v;
        }
        if v < self.config.sensor_value_threshold {
            v = 0.0;
        }
        // Collapse -0.0 so it never renders as "-0".
        v + 0.0
    }

    fn normalize_integer(&self, value: i64, spec: &FieldSpec) -> i64 {
        let mut v = match spec.transform {
            Some(transform) => transform.apply(value as f64).trunc() as i64,
            None => value,
        };
        if self.config.invert_negative_values && v < 0 {
            v = v.saturating_neg();
        }
        if (v as f64) < self.config.sensor_value_threshold {
            v = 0;
        }
        v
    }
}

/// Round to `digits` decimals, ties away from zero.
///
/// Decisions are made on the exact binary value: `0.25` is a tie and becomes
/// `0.3`, while `0.15` is stored just below the tie and becomes `0.1`.
fn round_to(value: f64, digits: usize) -> f64 {
    if !value.is_finite() {
        return value;
    }

    let rounded = parse_fixed(value, digits);

    // The formatter breaks exact ties to even; those that went toward zero
    // step one unit away from it.
    if binary_fraction_digits(value) == digits + 1 && rounded.abs() < value.abs() {
        let unit = 10f64.powi(-(digits as i32));
        return parse_fixed(rounded + unit.copysign(value), digits);
    }

    rounded
}

fn parse_fixed(value: f64, digits: usize) -> f64 {
    format!("{:.*}", digits, value)
        .parse::<f64>()
        .unwrap_or(value)
}

/// Number of binary digits after the point in the exact value of `value`.
///
/// A finite value with `d + 1` of them has exactly `d + 1` decimal digits
/// after the point, the last one being 5.
fn binary_fraction_digits(value: f64) -> usize {
    let mut v = value.abs();
    let mut count = 0;
    while v.fract() != 0.0 {
        v *= 2.0;
        count += 1;
    }
    count
}

/// Parse the longest leading decimal number of a token, ignoring trailing junk.
///
/// `"208.6W"` gives 208.6, `"abc"` gives `None`. Infinities and NaN are not
/// accepted.
fn parse_float_prefix(token: &str) -> Option<f64> {
    let s = token.trim_start();
    let bytes = s.as_bytes();
    let len = bytes.len();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }

    let int_start = end;
    while end < len && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;

    if end < len && bytes[end] == b'.' {
        let mut frac_end = end + 1;
        while frac_end < len && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - end - 1;
        end = frac_end;
    }

    if digits == 0 {
        return None;
    }

    if end < len && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if exp_end < len && matches!(bytes[exp_end], b'+' | b'-') {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < len && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }

    s[..end].parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse the leading `[+-]digits` of a token. A fractional part is dropped
/// and values outside the `i64` range saturate.
fn parse_integer_prefix(token: &str) -> Option<i64> {
    let s = token.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }

    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }

    if end == digits_start {
        return None;
    }

    match s[..end].parse::<i64>() {
        Ok(v) => Some(v),
        // Only overflow is left once the digits are validated.
        Err(_) if bytes[0] == b'-' => Some(i64::MIN),
        Err(_) => Some(i64::MAX),
    }
}

/// Split a line into non-empty tokens.
pub fn split_tokens(line: &str) -> Vec<&str> {
    line.split(|c: char| matches!(c, ' ' | ',' | '\t' | '\r'))
        .filter(|token| !token.is_empty())
        .collect()
}

/// One decoded line: a value for every schema field, in schema order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedReading {
    values: Vec<(String, SensorValue)>,
}

impl DecodedReading {
    pub fn get(&self, field: &str) -> Option<&SensorValue> {
        self.values
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SensorValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Decodes whole lines against a device schema.
#[derive(Debug, Clone)]
pub struct LineDecoder {
    schema: Arc<DeviceSchema>,
    fields: FieldDecoder,
}

impl LineDecoder {
    pub fn new(schema: Arc<DeviceSchema>, fields: FieldDecoder) -> Self {
        Self { schema, fields }
    }

    pub fn schema(&self) -> &DeviceSchema {
        &self.schema
    }

    /// Decode a line into one value per schema field.
    ///
    /// The reading always has exactly as many entries as the schema has
    /// fields. Unusable or missing tokens are reported in the error list and
    /// replaced by the field type's default.
    pub fn decode(&self, line: &str) -> (DecodedReading, Vec<FieldError>) {
        let tokens = split_tokens(line);
        let fields = self.schema.fields();

        let mut values = Vec::with_capacity(fields.len());
        let mut errors = Vec::new();

        for (index, spec) in fields.iter().enumerate() {
            let value = match tokens.get(index) {
                Some(raw) => {
                    let decoded = self.fields.decode(raw, spec);
                    if decoded.substituted {
                        tracing::warn!(
                            field = %spec.name,
                            raw = %raw,
                            field_type = %spec.field_type,
                            "Value is not numeric, using default"
                        );
                        errors.push(FieldError::NotNumeric {
                            field: spec.name.clone(),
                            raw: raw.to_string(),
                        });
                    }
                    decoded.value
                }
                None => {
                    errors.push(FieldError::Missing {
                        field: spec.name.clone(),
                    });
                    FieldDecoder::default_value(&spec.field_type)
                }
            };
            values.push((spec.name.clone(), value));
        }

        let missing = fields.len().saturating_sub(tokens.len());
        if missing > 0 {
            tracing::warn!(
                expected = fields.len(),
                received = tokens.len(),
                "Line has fewer tokens than the device mapping, using defaults"
            );
        } else if tokens.len() > fields.len() {
            tracing::debug!(
                extra = tokens.len() - fields.len(),
                "Ignoring extra tokens"
            );
        }

        (DecodedReading { values }, errors)
    }
}
