//! Typed attribute records.
//!
//! DBF rows, GeoJSON properties and KML placemark data all land in an
//! [`AttributeMap`]: string keys mapped to scalar values, with explicit
//! optional lookups for mapped fields.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A scalar attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl AttributeValue {
    /// Convert a JSON value; nested arrays and objects are kept as JSON text
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => AttributeValue::Null,
            serde_json::Value::Bool(b) => AttributeValue::Bool(*b),
            serde_json::Value::Number(n) => {
                n.as_f64().map(AttributeValue::Number).unwrap_or(AttributeValue::Null)
            }
            serde_json::Value::String(s) => AttributeValue::Text(s.clone()),
            other => AttributeValue::Text(other.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    /// Text rendering, `None` for nulls and blank strings
    pub fn as_text(&self) -> Option<String> {
        match self {
            AttributeValue::Null => None,
            AttributeValue::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => Ok(()),
            AttributeValue::Bool(b) => write!(f, "{}", b),
            AttributeValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            AttributeValue::Number(n) => write!(f, "{}", n),
            AttributeValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Number(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

/// Ordered attribute record of one feature
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeMap(BTreeMap<String, AttributeValue>);

/// Field names tried, in order, when no label field is mapped
const LABEL_CANDIDATES: &[&str] = &[
    "name", "label", "nom", "parcel_name", "parcelle", "title", "code", "id",
];

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.0.get(key)
    }

    /// Text value of a field, `None` when absent, null or blank
    pub fn text(&self, key: &str) -> Option<String> {
        self.get(key).and_then(AttributeValue::as_text)
    }

    /// Text value of an optional mapped field
    pub fn mapped_text(&self, field: Option<&str>) -> Option<String> {
        field.and_then(|f| self.text(f))
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Best-effort display label: first non-blank well-known name field,
    /// matched case-insensitively
    pub fn derive_label(&self) -> Option<String> {
        LABEL_CANDIDATES.iter().find_map(|candidate| {
            self.0
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(candidate))
                .and_then(|(_, value)| value.as_text())
        })
    }

    /// Stable textual form, used as an ordering tie-breaker
    pub fn canonical_text(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_default()
    }
}

impl FromIterator<(String, AttributeValue)> for AttributeMap {
    fn from_iter<I: IntoIterator<Item = (String, AttributeValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
