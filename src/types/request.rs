//! Raw prediction request payloads
//!
//! `RawValue` is the only place loosely typed JSON values enter the
//! service. Everything downstream works on cleaned `f64` rows.

use crate::error::{PredictError, PredictResult};
use indexmap::IndexMap;
use serde_json::Value;
use std::borrow::Cow;

/// Request key used to select a model by name.
pub const MODEL_SELECTOR_KEY: &str = "model";

/// A single scalar value as received from the client
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Number(f64),
    Text(String),
    Null,
}

impl RawValue {
    /// String form of the value, or `None` for null.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            RawValue::Number(n) => Some(Cow::Owned(n.to_string())),
            RawValue::Text(s) => Some(Cow::Borrowed(s.as_str())),
            RawValue::Null => None,
        }
    }
}

impl From<Value> for RawValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => RawValue::Null,
            Value::Number(n) => n
                .as_f64()
                .map(RawValue::Number)
                .unwrap_or_else(|| RawValue::Text(n.to_string())),
            Value::String(s) => RawValue::Text(s),
            // Booleans and nested values keep their textual form; they never parse as numbers
            other => RawValue::Text(other.to_string()),
        }
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

/// Feature values keyed by column name, plus an optional model selector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRequest {
    fields: IndexMap<String, RawValue>,
    model: Option<String>,
}

impl RawRequest {
    /// Create an empty request
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field (builder style)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<RawValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Select a model by name (builder style)
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<RawValue>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&RawValue> {
        self.fields.get(key)
    }

    /// Feature keys in the order the client sent them
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.model.is_none()
    }

    /// Build a request from a parsed JSON document.
    ///
    /// `null`, non-objects and empty objects are `EmptyRequest`.
    pub fn from_json(value: Value) -> PredictResult<Self> {
        let object = match value {
            Value::Object(map) if !map.is_empty() => map,
            _ => return Err(PredictError::EmptyRequest),
        };

        let mut request = RawRequest::new();
        for (key, value) in object {
            if key == MODEL_SELECTOR_KEY {
                request.model = match value {
                    Value::Null => None,
                    Value::String(s) => Some(s),
                    other => Some(other.to_string()),
                };
            } else {
                request.insert(key, value);
            }
        }
        Ok(request)
    }

    /// Parse a raw HTTP body. Blank or malformed JSON is `EmptyRequest`.
    pub fn from_slice(body: &[u8]) -> PredictResult<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(PredictError::EmptyRequest);
        }
        let value: Value = serde_json::from_slice(body).map_err(|_| PredictError::EmptyRequest)?;
        Self::from_json(value)
    }
}
