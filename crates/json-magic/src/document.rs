//! Documents and their text formats.
//!
//! A [`Document`] is a parsed tree plus the location it was read from. The
//! location is the base against which relative `$ref` targets inside the tree
//! are resolved.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("failed to parse document: {0}")]
    Parse(String),
    #[error("failed to serialize document: {0}")]
    Serialize(String),
}

/// Text format for reading and writing documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Json,
    Yaml,
}

impl Format {
    /// Picks a format from a file name or URL by its extension.
    pub fn from_location(location: &str) -> Self {
        let lower = location.to_ascii_lowercase();
        let path = lower.split(['?', '#']).next().unwrap_or_default();
        if path.ends_with(".yaml") || path.ends_with(".yml") {
            Format::Yaml
        } else {
            Format::Json
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub root: Value,
    pub location: String,
    pub name: Option<String>,
}

impl Document {
    pub fn new(root: Value, location: impl Into<String>) -> Self {
        Self {
            root,
            location: location.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Parses JSON or YAML text read from `location`.
    pub fn parse(text: &str, location: impl Into<String>) -> Result<Self, DocumentError> {
        Ok(Self::new(parse_document(text)?, location))
    }

    pub fn to_text(&self, format: Format) -> Result<String, DocumentError> {
        to_text(&self.root, format)
    }
}

/// Parses document text, trying JSON first and falling back to YAML.
///
/// YAML mapping keys that are not strings (`200:` in a responses map) are
/// converted to their string form.
pub fn parse_document(text: &str) -> Result<Value, DocumentError> {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => Ok(value),
        Err(json_err) => {
            let yaml: serde_yaml::Value = serde_yaml::from_str(text)
                .map_err(|yaml_err| DocumentError::Parse(format!("{json_err}; {yaml_err}")))?;
            yaml_to_json(yaml)
        }
    }
}

pub fn to_text(value: &Value, format: Format) -> Result<String, DocumentError> {
    match format {
        Format::Json => {
            serde_json::to_string_pretty(value).map_err(|e| DocumentError::Serialize(e.to_string()))
        }
        Format::Yaml => serde_yaml::to_string(value).map_err(|e| DocumentError::Serialize(e.to_string())),
    }
}

fn yaml_to_json(value: serde_yaml::Value) -> Result<Value, DocumentError> {
    Ok(match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => yaml_number(&n),
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(seq) => {
            Value::Array(seq.into_iter().map(yaml_to_json).collect::<Result<_, _>>()?)
        }
        serde_yaml::Value::Mapping(mapping) => {
            let mut out = Map::new();
            for (key, val) in mapping {
                out.insert(yaml_key(key)?, yaml_to_json(val)?);
            }
            Value::Object(out)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value)?,
    })
}

fn yaml_number(n: &serde_yaml::Number) -> Value {
    if let Some(i) = n.as_i64() {
        Value::Number(i.into())
    } else if let Some(u) = n.as_u64() {
        Value::Number(u.into())
    } else {
        n.as_f64()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

fn yaml_key(key: serde_yaml::Value) -> Result<String, DocumentError> {
    match key {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Null => Ok("null".to_string()),
        other => Err(DocumentError::Parse(format!("unsupported mapping key: {other:?}"))),
    }
}
