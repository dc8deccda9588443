//! Feature normalization for thesis score inference.
//!
//! Turns a loosely typed request into a cleaned row in the exact column
//! order the scaler and regressors were fitted on. The trainer cleans every
//! spreadsheet cell with [`clean_value`], so a column is a percentage in
//! both places exactly when its name contains `%`.

use crate::schema::{FeatureSchema, PERCENT_MARKER};
use crate::types::request::{RawRequest, RawValue};
use indexmap::IndexMap;
use std::collections::BTreeSet;

/// One cleaned value per schema column, in schema order. Every value is finite.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedRow {
    values: IndexMap<String, f64>,
}

impl CleanedRow {
    pub fn get(&self, column: &str) -> Option<f64> {
        self.values.get(column).copied()
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

    /// Flatten into the positional vector the scaler accepts
    pub fn to_vector(&self) -> FeatureVector {
        FeatureVector(self.values.values().copied().collect())
    }
}

/// Positional feature values in schema order
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }
}

/// Normalize a request against a schema.
///
/// Never fails: missing, null and unparseable values become `0.0`.
/// Returns the cleaned row together with the request keys that are not
/// schema columns, sorted.
pub fn normalize(raw: &RawRequest, schema: &FeatureSchema) -> (CleanedRow, BTreeSet<String>) {
    let values = schema
        .columns()
        .map(|column| {
            let value = raw.get(column).map_or(0.0, |v| clean_value(column, v));
            (column.to_string(), value)
        })
        .collect();

    let extra_keys = raw
        .keys()
        .filter(|key| !schema.contains(key))
        .map(str::to_string)
        .collect();

    (CleanedRow { values }, extra_keys)
}

/// Clean a single value for the given column.
pub fn clean_value(column: &str, value: &RawValue) -> f64 {
    let Some(text) = value.as_text() else {
        return 0.0;
    };
    let text = text.replace(',', ".");

    if FeatureSchema::is_percentage(column) {
        let stripped: String = text.chars().filter(|&c| c != PERCENT_MARKER).collect();
        parse_finite(&stripped).map_or(0.0, |v| v / 100.0)
    } else {
        parse_finite(&text).unwrap_or(0.0)
    }
}

fn parse_finite(text: &str) -> Option<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}
