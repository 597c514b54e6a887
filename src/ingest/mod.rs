//! Ingest module for delimited reference tables
//!
//! Tables arrive as header-first delimited text. Each data row becomes a [`Record`]
//! keyed by column name. Parsing is best-effort and never fails: malformed rows are
//! logged and skipped, short rows are padded with empty strings.

pub mod tabular;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use tabular::{TabularIngestor, parse};

/// One data row: column name -> cell value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, String>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.0.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.0.get(column).map(String::as_str)
    }

    /// Cell value, or the empty string when the column is absent
    pub fn value(&self, column: &str) -> &str {
        self.get(column).unwrap_or("")
    }

    /// Numeric view of a cell; tolerates currency symbols, thousands separators and `%`
    pub fn number(&self, column: &str) -> Option<f64> {
        let raw = self.get(column)?;
        let cleaned: String = raw
            .chars()
            .filter(|c| !matches!(c, '$' | ',' | '%') && !c.is_whitespace())
            .collect();
        if cleaned.is_empty() {
            return None;
        }
        cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Record(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
