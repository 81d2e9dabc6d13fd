//! Result envelope handed to the rendering layer.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::db::{ColumnMeta, Value};

/// A result row keyed by column label and name.
///
/// A column whose label differs from its name is stored under both keys
/// with the same value. Keys keep first-insertion order; inserting an
/// existing key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultRow {
    entries: Vec<(String, Value)>,
}

impl ResultRow {
    /// Builds a row from raw values in physical column order.
    pub fn from_values(columns: &[ColumnMeta], values: Vec<Value>) -> Self {
        let mut row = Self {
            entries: Vec::with_capacity(columns.len()),
        };
        for (column, value) in columns.iter().zip(values) {
            if let Some(label) = column.usable_label() {
                row.insert(label, value.clone());
            }
            row.insert(&column.name, value);
        }
        row
    }

    fn insert(&mut self, key: &str, value: Value) {
        match self.entries.iter_mut().find(|(existing, _)| existing == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    /// Number of keys in the row.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    /// Key/value pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }
}

impl Serialize for ResultRow {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Materialized result of one gateway call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEnvelope {
    /// Column headers in result order.
    pub columns: Vec<String>,

    /// Rows, at most the configured cap.
    pub rows: Vec<ResultRow>,

    /// Number of rows returned.
    pub row_count: usize,

    /// Set exactly when the row count reached the cap.
    pub notice: Option<String>,
}

impl ResultEnvelope {
    /// Creates an envelope, setting the truncation notice when `rows` hit `row_cap`.
    pub fn new(columns: Vec<String>, rows: Vec<ResultRow>, row_cap: usize) -> Self {
        let row_count = rows.len();
        let notice = (row_count == row_cap).then(|| format!("Truncated to {row_cap} rows."));
        Self {
            columns,
            rows,
            row_count,
            notice,
        }
    }

    /// Returns true if the row cap was reached.
    pub fn truncated(&self) -> bool {
        self.notice.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
