//! Device mapping: the ordered field layout of one telemetry line.
//!
//! A mapping file is a JSON (or JSON5) object whose keys are field names in
//! the order they appear on the serial line:
//!
//! ```json
//! {
//!   "NodeID": { "type": "integer", "unit_of_measurement": "", "icon": "identifier" },
//!   "RP1":    { "type": "float", "unit_of_measurement": "W", "icon": "flash" }
//! }
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Errors raised while loading a device mapping.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Device mapping not found: {path}")]
    NotFound { path: String },
    #[error("Invalid device mapping: {0}")]
    Parse(String),
    #[error("Device mapping defines no fields")]
    Empty,
    #[error("Field #{index} has an empty name")]
    EmptyFieldName { index: usize },
    #[error("Field '{0}' is defined more than once")]
    DuplicateField(String),
}

/// Value type of a field. Tags are case-sensitive; anything other than
/// `float`, `integer` or `string` is kept and decoded as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Float,
    Integer,
    String,
    Unknown(String),
}

impl FieldType {
    pub fn as_str(&self) -> &str {
        match self {
            FieldType::Float => "float",
            FieldType::Integer => "integer",
            FieldType::String => "string",
            FieldType::Unknown(tag) => tag,
        }
    }
}

impl From<String> for FieldType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "float" => FieldType::Float,
            "integer" => FieldType::Integer,
            "string" => FieldType::String,
            _ => FieldType::Unknown(tag),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of value transforms, applied to the parsed number.
///
/// Written in a mapping as `"transform": { "scale": 0.001 }` or
/// `"transform": { "offset": -2.5 }`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueTransform {
    /// Multiply by a constant.
    Scale(f64),
    /// Add a constant.
    Offset(f64),
}

impl ValueTransform {
    pub fn apply(&self, value: f64) -> f64 {
        match self {
            ValueTransform::Scale(factor) => value * factor,
            ValueTransform::Offset(delta) => value + delta,
        }
    }
}

/// Schema entry for one field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub unit_of_measurement: String,
    pub icon: String,
    pub transform: Option<ValueTransform>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            unit_of_measurement: String::new(),
            icon: String::new(),
            transform: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit_of_measurement = unit.into();
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    pub fn with_transform(mut self, transform: ValueTransform) -> Self {
        self.transform = Some(transform);
        self
    }
}

/// Field entry as written in a mapping file (the name is the object key).
#[derive(Debug, Deserialize)]
struct FieldEntry {
    #[serde(rename = "type")]
    field_type: String,
    #[serde(default)]
    unit_of_measurement: String,
    #[serde(default)]
    icon: String,
    #[serde(default)]
    transform: Option<ValueTransform>,
}

/// Mapping object with key order preserved.
struct OrderedEntries(Vec<(String, FieldEntry)>);

impl<'de> Deserialize<'de> for OrderedEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = OrderedEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object mapping field names to field definitions")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, entry)) = map.next_entry::<String, FieldEntry>()? {
                    entries.push((name, entry));
                }
                Ok(OrderedEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

/// Ordered, immutable description of a telemetry line.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSchema {
    model: String,
    fields: Vec<FieldSpec>,
}

impl DeviceSchema {
    /// Build a schema from fields in line order.
    pub fn new(model: impl Into<String>, fields: Vec<FieldSpec>) -> Result<Self, SchemaError> {
        if fields.is_empty() {
            return Err(SchemaError::Empty);
        }

        let mut seen = HashSet::with_capacity(fields.len());
        for (index, field) in fields.iter().enumerate() {
            if field.name.trim().is_empty() {
                return Err(SchemaError::EmptyFieldName { index });
            }
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField(field.name.clone()));
            }
        }

        Ok(Self {
            model: model.into(),
            fields,
        })
    }

    /// Parse a mapping document.
    pub fn parse(model: impl Into<String>, content: &str) -> Result<Self, SchemaError> {
        let entries = lechacal_common::parse_config(content)
            .map_err(|e| SchemaError::Parse(e.to_string()))?;
        Self::from_entries(model, entries)
    }

    fn from_entries(
        model: impl Into<String>,
        OrderedEntries(entries): OrderedEntries,
    ) -> Result<Self, SchemaError> {
        let fields = entries
            .into_iter()
            .map(|(name, entry)| FieldSpec {
                name,
                field_type: FieldType::from(entry.field_type),
                unit_of_measurement: entry.unit_of_measurement,
                icon: entry.icon,
                transform: entry.transform,
            })
            .collect();

        Self::new(model, fields)
    }

    /// Load a mapping file. The model name is the file name without extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(SchemaError::NotFound {
                path: path.display().to_string(),
            });
        }

        let entries = lechacal_common::load_config(path)
            .map_err(|e| SchemaError::Parse(e.to_string()))?;
        let model = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        let schema = Self::from_entries(model, entries)?;

        for field in schema.fields() {
            if let FieldType::Unknown(tag) = &field.field_type {
                tracing::warn!(
                    field = %field.name,
                    field_type = %tag,
                    "Unknown field type, values will be passed through as text"
                );
            }
        }

        Ok(schema)
    }

    /// Device model, used in discovery metadata.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Fields in line order.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_preserves_order() {
        let schema = DeviceSchema::parse(
            "test",
            r#"{
                "Vrms": { "type": "float", "unit_of_measurement": "V", "icon": "sine-wave" },
                "NodeID": { "type": "integer" },
                "RP1": { "type": "float", "unit_of_measurement": "W", "icon": "flash" },
                "Irms1": { "type": "float", "unit_of_measurement": "mA" }
            }"#,
        )
        .unwrap();

        let names: Vec<&str> = schema.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Vrms", "NodeID", "RP1", "Irms1"]);
        assert_eq!(schema.field("RP1").unwrap().icon, "flash");
        assert_eq!(schema.field("NodeID").unwrap().unit_of_measurement, "");
        assert_eq!(schema.len(), 4);
    }

    #[test]
    fn test_unknown_type_is_kept() {
        let schema =
            DeviceSchema::parse("test", r#"{ "status": { "type": "boolean" } }"#).unwrap();
        let field = &schema.fields()[0];
        assert_eq!(field.field_type, FieldType::Unknown("boolean".to_string()));
        assert_eq!(field.field_type.to_string(), "boolean");
    }

    #[test]
    fn test_type_tags_are_case_sensitive() {
        let schema = DeviceSchema::parse(
            "test",
            r#"{ "a": { "type": "Float" }, "b": { "type": "float" } }"#,
        )
        .unwrap();
        assert_eq!(
            schema.fields()[0].field_type,
            FieldType::Unknown("Float".to_string())
        );
        assert_eq!(schema.fields()[1].field_type, FieldType::Float);
    }

    #[test]
    fn test_transform() {
        let schema = DeviceSchema::parse(
            "test",
            r#"{
                energy: { type: "float", transform: { scale: 0.001 } },
                temp: { type: "float", transform: { offset: -2.5 } },
            }"#,
        )
        .unwrap();

        let scale = schema.fields()[0].transform.unwrap();
        assert_eq!(scale, ValueTransform::Scale(0.001));
        assert_eq!(scale.apply(2000.0), 2.0);
        assert_eq!(schema.fields()[1].transform.unwrap().apply(20.0), 17.5);
    }

    #[test]
    fn test_rejects_invalid_mappings() {
        assert!(matches!(
            DeviceSchema::parse("t", "{}"),
            Err(SchemaError::Empty)
        ));
        assert!(matches!(
            DeviceSchema::parse("t", r#"{ "": { "type": "float" } }"#),
            Err(SchemaError::EmptyFieldName { index: 0 })
        ));
        assert!(matches!(
            DeviceSchema::parse("t", r#"{ "a": { "type": "float" }, "a": { "type": "integer" } }"#),
            Err(SchemaError::DuplicateField(name)) if name == "a"
        ));
        assert!(matches!(
            DeviceSchema::parse("t", r#"[1, 2]"#),
            Err(SchemaError::Parse(_))
        ));
        assert!(matches!(
            DeviceSchema::parse("t", r#"{ "a": { "unit_of_measurement": "W" } }"#),
            Err(SchemaError::Parse(_))
        ));
    }

    #[test]
    fn test_load_reports_invalid_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "RP1": {{ "type": "float" "#).unwrap();

        let err = DeviceSchema::load(file.path()).unwrap_err();
        assert!(matches!(err, SchemaError::Parse(_)));
        assert!(err.to_string().starts_with("Invalid device mapping"));
    }

    #[test]
    fn test_load_missing_file() {
        let result = DeviceSchema::load("/nonexistent/RPICT7V1.json");
        assert!(matches!(result, Err(SchemaError::NotFound { .. })));
    }

    #[test]
    fn test_builder_helpers() {
        let spec = FieldSpec::new("RP1", FieldType::Float)
            .with_unit("W")
            .with_icon("flash")
            .with_transform(ValueTransform::Offset(1.0));
        assert_eq!(spec.unit_of_measurement, "W");
        assert_eq!(spec.icon, "flash");
        assert_eq!(spec.transform, Some(ValueTransform::Offset(1.0)));
    }
}
