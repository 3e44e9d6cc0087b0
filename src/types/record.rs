//! Incoming feature records

use crate::error::{PipelineError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// One record as received: request-field-name -> finite number.
///
/// Field names are whatever naming convention the caller uses; they are
/// translated to canonical columns by the reconciler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureRecord {
    values: HashMap<String, f64>,
}

impl FeatureRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from a JSON value, rejecting non-object payloads and
    /// non-numeric field values.
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            PipelineError::Validation(format!(
                "record must be a JSON object, got {}",
                json_type(value)
            ))
        })?;

        let mut values = HashMap::with_capacity(object.len());
        for (field, raw) in object {
            let number = raw.as_f64().ok_or_else(|| {
                PipelineError::Validation(format!(
                    "field '{}' must be a number, got {}",
                    field,
                    json_type(raw)
                ))
            })?;
            values.insert(field.clone(), number);
        }

        Ok(Self { values })
    }

    /// Parse a single record from a raw request body.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(body)?;
        Self::from_json(&value)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: f64) -> Option<f64> {
        self.values.insert(field.into(), value)
    }

    pub fn get(&self, field: &str) -> Option<f64> {
        self.values.get(field).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for FeatureRecord {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Batch payload: `{"records": [ {...}, {...} ]}`
#[derive(Debug, Clone, Deserialize)]
pub struct BatchRequest {
    pub records: Vec<Value>,
}

impl BatchRequest {
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
