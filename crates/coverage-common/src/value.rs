//! Catalog attribute values.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time::format_iso8601;

/// A single attribute value attached to a catalog granule.
///
/// Serialized untagged so catalog rows stay plain JSON scalars; RFC 3339
/// strings come back as `Date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Number(f64),
    Date(DateTime<Utc>),
    Text(String),
}

/// The kind of an attribute value, used for datatype reporting.
///
/// Kinds order as declared when values of different kinds are sorted together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Number,
    Date,
    Text,
}

impl ValueKind {
    /// Datatype name reported through domain introspection.
    pub fn type_name(&self) -> &'static str {
        match self {
            ValueKind::Number => "double",
            ValueKind::Date => "timestamp",
            ValueKind::Text => "string",
        }
    }
}

impl AttributeValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            AttributeValue::Number(_) => ValueKind::Number,
            AttributeValue::Date(_) => ValueKind::Date,
            AttributeValue::Text(_) => ValueKind::Text,
        }
    }

    /// Total order across kinds: by kind first, then by value.
    /// Numbers use IEEE total ordering, so NaN sorts after every number.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (AttributeValue::Number(a), AttributeValue::Number(b)) => a.total_cmp(b),
            (AttributeValue::Date(a), AttributeValue::Date(b)) => a.cmp(b),
            (AttributeValue::Text(a), AttributeValue::Text(b)) => a.cmp(b),
            _ => self.kind().cmp(&other.kind()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            AttributeValue::Date(v) => Some(*v),
            _ => None,
        }
    }

    /// String form used for lexical ranges and metadata values.
    pub fn to_lexical(&self) -> String {
        match self {
            AttributeValue::Number(v) => v.to_string(),
            AttributeValue::Date(v) => format_iso8601(v),
            AttributeValue::Text(v) => v.clone(),
        }
    }
}

impl PartialOrd for AttributeValue {
    /// Values only order against values of the same kind.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (AttributeValue::Number(a), AttributeValue::Number(b)) => a.partial_cmp(b),
            (AttributeValue::Date(a), AttributeValue::Date(b)) => Some(a.cmp(b)),
            (AttributeValue::Text(a), AttributeValue::Text(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl std::fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeValue::Text(v) => write!(f, "'{}'", v),
            other => write!(f, "{}", other.to_lexical()),
        }
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Number(v)
    }
}

impl From<DateTime<Utc>> for AttributeValue {
    fn from(v: DateTime<Utc>) -> Self {
        AttributeValue::Date(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::Text(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::Text(v)
    }
}
