//! Query Result - tabular output of an executed statement

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type Row = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names in statement order; rows are keyed by these
    pub columns: Vec<String>,

    pub rows: Vec<Row>,

    pub row_count: usize,

    /// Fetching stopped at the executor's row ceiling
    pub truncated: bool,

    pub execution_time_ms: u64,

    /// Statement as it was executed
    pub sql: String,
}

impl QueryResult {
    pub fn new(
        sql: &str,
        columns: Vec<String>,
        rows: Vec<Row>,
        truncated: bool,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            row_count: rows.len(),
            columns,
            rows,
            truncated,
            execution_time_ms,
            sql: sql.to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column in row order
    pub fn column_values(&self, column: &str) -> Vec<&serde_json::Value> {
        self.rows.iter().filter_map(|row| row.get(column)).collect()
    }
}

/// Make column names unique by suffixing repeats with `_2`, `_3`, ...
pub fn dedupe_columns(names: Vec<String>) -> Vec<String> {
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    let mut taken: std::collections::BTreeSet<String> = names.iter().cloned().collect();
    let mut unique = Vec::with_capacity(names.len());

    for name in names {
        let count = seen.entry(name.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            unique.push(name);
            continue;
        }
        let mut n = *count;
        let mut candidate = format!("{}_{}", name, n);
        while taken.contains(&candidate) {
            n += 1;
            candidate = format!("{}_{}", name, n);
        }
        taken.insert(candidate.clone());
        unique.push(candidate);
    }
    unique
}
