//! Scalar values stored in replicated documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable scalar. Identity comes from the creation ticket of the
/// element wrapping it, never from the value itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Primitive {
    Null,
    Boolean(bool),
    Integer(i32),
    Long(i64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Date(DateTime<Utc>),
}

impl Primitive {
    /// Kind name for diagnostics and type errors.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Long(_) => "long",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Date(_) => "date",
        }
    }

    /// JSON representation used by document marshaling. Bytes render as an
    /// array of numbers, dates as RFC 3339 strings.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Boolean(b) => serde_json::Value::from(*b),
            Self::Integer(i) => serde_json::Value::from(*i),
            Self::Long(l) => serde_json::Value::from(*l),
            Self::Double(d) => serde_json::Value::from(*d),
            Self::String(s) => serde_json::Value::from(s.clone()),
            Self::Bytes(b) => serde_json::Value::from(b.clone()),
            Self::Date(d) => serde_json::Value::from(d.to_rfc3339()),
        }
    }
}

impl From<&str> for Primitive {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Primitive {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for Primitive {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i32> for Primitive {
    fn from(value: i32) -> Self {
        Self::Integer(value)
    }
}

impl From<i64> for Primitive {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<f64> for Primitive {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}
