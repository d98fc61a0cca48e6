//! Tabular auxiliary data (CSV) used by specification lookups.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{CurateError, Result};

/// One CSV row keyed by column header.
pub type Row = IndexMap<String, String>;

/// Per lookup key: match value → looked-up value.
pub type ColumnMappings = HashMap<String, HashMap<String, String>>;

/// Which columns of the table a lookup key reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnLookup {
    /// Column compared against the value computed from the file.
    pub match_column: String,
    /// Column whose content is returned on a match.
    pub value_column: String,
}

impl ColumnLookup {
    pub fn new(match_column: impl Into<String>, value_column: impl Into<String>) -> Self {
        Self {
            match_column: match_column.into(),
            value_column: value_column.into(),
        }
    }
}

/// Parse CSV text with a header row into rows.
pub fn csv_text_to_rows(text: &str) -> Result<Vec<Row>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(|s| s.to_string()).collect();
    if headers.is_empty() {
        return Err(CurateError::Config("Lookup table has no columns".to_string()));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: Row = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), record.get(i).unwrap_or("").to_string()))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

/// Build lookup tables for every key in `lookups`.
///
/// Rows missing either column are skipped; when a match value repeats, the
/// first row wins.
pub fn extract_column_mappings<'a>(
    rows: &[Row],
    lookups: impl IntoIterator<Item = (&'a String, &'a ColumnLookup)>,
) -> ColumnMappings {
    let mut mappings = ColumnMappings::new();
    for (key, lookup) in lookups {
        let table = mappings.entry(key.clone()).or_default();
        for row in rows {
            let (Some(matched), Some(value)) =
                (row.get(&lookup.match_column), row.get(&lookup.value_column))
            else {
                continue;
            };
            table.entry(matched.clone()).or_insert_with(|| value.clone());
        }
    }
    mappings
}
