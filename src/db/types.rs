//! Value and column types shared by the connection sources.
//!
//! Defines the driver-neutral shapes a cursor produces before the gateway
//! normalizes them into result rows.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Column metadata as reported by the driver.
///
/// `label` is the alias given in the query (`AS "Total"`), `name` the
/// underlying column name. Drivers that only report one of them leave
/// `label` unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    /// Display label, if the driver reports one.
    pub label: Option<String>,

    /// Underlying column name.
    pub name: String,
}

impl ColumnMeta {
    /// Creates column metadata that only carries a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            label: None,
            name: name.into(),
        }
    }

    /// Creates column metadata with both a label and an underlying name.
    pub fn labelled(label: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            name: name.into(),
        }
    }

    /// Returns the label when it is present and not blank.
    pub fn usable_label(&self) -> Option<&str> {
        self.label
            .as_deref()
            .filter(|label| !label.trim().is_empty())
    }

    /// Returns the header shown for this column: label first, name as fallback.
    pub fn display_name(&self) -> &str {
        self.usable_label().unwrap_or(&self.name)
    }
}

/// A row of raw values in physical column order.
pub type Row = Vec<Value>;

/// Represents a single value from a database query.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,

    /// Boolean value.
    Bool(bool),

    /// Signed integer (up to i64).
    Int(i64),

    /// Floating point number.
    Float(f64),

    /// Text/string value.
    String(String),

    /// Binary data.
    Bytes(Vec<u8>),
}

impl Value {
    /// Converts the value to the text shown in a result table.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Bytes(b) => format!("<{} bytes>", b.len()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}
