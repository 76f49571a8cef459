use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Filter value meaning "no constraint for this key".
pub const ALL: &str = "all";

/// Numeric reading of `raw`. A leading `+`, an exponent or a leading zero
/// before another digit (card suffixes, account codes) keeps it textual.
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
    let bytes = digits.as_bytes();
    let plain = match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) => {
            first.is_ascii_digit()
                && last.is_ascii_digit()
                && bytes.iter().all(|b| b.is_ascii_digit() || *b == b'.')
                && !(bytes[0] == b'0' && bytes.get(1).is_some_and(u8::is_ascii_digit))
        }
        _ => false,
    };
    if !plain {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|value| value.is_finite())
}

// Untagged: variant order decides how stored JSON strings are read back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Number(f64),
    Ref(Uuid),
    Date(NaiveDate),
    Text(String),
}

impl FieldValue {
    pub fn parse(raw: &str) -> FieldValue {
        let trimmed = raw.trim();
        if let Ok(value) = trimmed.parse::<bool>() {
            return FieldValue::Bool(value);
        }
        if let Some(value) = parse_number(trimmed) {
            return FieldValue::Number(value);
        }
        if let Ok(value) = Uuid::parse_str(trimmed) {
            return FieldValue::Ref(value);
        }
        if let Ok(value) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            return FieldValue::Date(value);
        }
        FieldValue::Text(raw.to_string())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn matches_str(&self, wanted: &str) -> bool {
        match self {
            FieldValue::Text(value) => value == wanted,
            FieldValue::Number(value) => parse_number(wanted) == Some(*value),
            FieldValue::Bool(value) => wanted
                .trim()
                .parse::<bool>()
                .map(|parsed| parsed == *value)
                .unwrap_or(false),
            FieldValue::Ref(value) => Uuid::parse_str(wanted.trim())
                .map(|parsed| parsed == *value)
                .unwrap_or(false),
            FieldValue::Date(value) => NaiveDate::parse_from_str(wanted.trim(), "%Y-%m-%d")
                .map(|parsed| parsed == *value)
                .unwrap_or(false),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(value) => write!(f, "{value}"),
            FieldValue::Number(value) => write!(f, "{value}"),
            FieldValue::Ref(value) => write!(f, "{value}"),
            FieldValue::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
            FieldValue::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(value as f64)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        FieldValue::Date(value)
    }
}

impl From<Uuid> for FieldValue {
    fn from(value: Uuid) -> Self {
        FieldValue::Ref(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: Uuid,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            fields: BTreeMap::new(),
        }
    }

    pub fn with(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_text)
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(FieldValue::as_number)
    }

    pub fn date(&self, field: &str) -> Option<NaiveDate> {
        self.get(field).and_then(FieldValue::as_date)
    }

    pub fn display(&self, field: &str) -> String {
        self.get(field).map(|value| value.to_string()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    values: BTreeMap<String, String>,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    /// Resets a key to the `"all"` sentinel.
    pub fn clear(&mut self, key: &str) {
        self.set(key, ALL);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn active(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values
            .iter()
            .filter(|(_, value)| value.as_str() != ALL)
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// Metric name to value. Values are never rounded here.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateResult {
    metrics: BTreeMap<String, f64>,
}

impl AggregateResult {
    pub fn insert(&mut self, name: &str, value: f64) {
        self.metrics.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.metrics.iter().map(|(name, value)| (name.as_str(), *value))
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub key: String,
    pub records: Vec<Record>,
    pub aggregate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub number: usize,
    pub size: usize,
    pub total_count: usize,
    pub total_pages: usize,
    pub items: Vec<T>,
}
