//! Configuration schema builder.
//!
//! Produces the JSON-Schema-like document the configuration UI renders:
//!
//! ```json
//! { "type": "object",
//!   "properties": {
//!     "k": { "title": "Multiplier", "type": "number" },
//!     "value": { "title": "Last value", "type": "number", "readOnly": true } } }
//! ```
//!
//! Schemas are built at call time so read-only flags can depend on state
//! (for example a hostname fixed at build time).

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// JSON type of a configuration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
        }
    }
}

/// One property in a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    title: String,
    field_type: FieldType,
    read_only: bool,
    description: Option<String>,
}

impl Field {
    pub fn new(title: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            title: title.into(),
            field_type,
            read_only: false,
            description: None,
        }
    }

    pub fn number(title: impl Into<String>) -> Self {
        Self::new(title, FieldType::Number)
    }

    pub fn string(title: impl Into<String>) -> Self {
        Self::new(title, FieldType::String)
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("title".to_string(), Value::from(self.title.as_str()));
        map.insert("type".to_string(), Value::from(self.field_type.as_str()));
        if self.read_only {
            map.insert("readOnly".to_string(), Value::Bool(true));
        }
        if let Some(description) = &self.description {
            map.insert("description".to_string(), Value::from(description.as_str()));
        }
        Value::Object(map)
    }
}

/// An object schema: a set of named fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigSchema {
    properties: BTreeMap<String, Field>,
}

impl ConfigSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a property.
    pub fn property(mut self, key: impl Into<String>, field: Field) -> Self {
        self.properties.insert(key.into(), field);
        self
    }

    /// Render the schema document.
    pub fn to_value(&self) -> Value {
        let properties: Map<String, Value> = self
            .properties
            .iter()
            .map(|(key, field)| (key.clone(), field.to_value()))
            .collect();

        serde_json::json!({
            "type": "object",
            "properties": properties,
        })
    }
}

impl From<ConfigSchema> for Value {
    fn from(schema: ConfigSchema) -> Self {
        schema.to_value()
    }
}
