//! Schema descriptors
//!
//! Structural plus semantic description of the database. Everything here is
//! immutable once a snapshot has been published.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Declared storage type as written in the DDL (may be empty in SQLite)
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
    pub default_value: Option<String>,
    pub description: Option<String>,
    pub business_meaning: Option<String>,
    /// Free-form example values from the metadata relation
    pub examples: Option<String>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            primary_key: false,
            default_value: None,
            description: None,
            business_meaning: None,
            examples: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column: String,
    pub target_table: String,
    pub target_column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub description: Option<String>,
    pub row_count: Option<u64>,
    pub foreign_keys: Vec<ForeignKey>,
    /// Rows from the mock `<name>_sample` table, never from the real table
    pub sample_rows: Vec<BTreeMap<String, serde_json::Value>>,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            name: name.into(),
            columns,
            description: None,
            row_count: None,
            foreign_keys: Vec::new(),
            sample_rows: Vec::new(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn foreign_key_for(&self, column: &str) -> Option<&ForeignKey> {
        self.foreign_keys.iter().find(|fk| fk.column == column)
    }
}

/// Immutable, versioned view of every business table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub tables: BTreeMap<String, TableDescriptor>,
    pub version: u64,
    pub built_at: DateTime<Utc>,
    #[serde(with = "duration_millis")]
    pub build_duration: Duration,
    /// Tables with no mock sample table; the prompt shows no rows for them
    pub missing_samples: Vec<String>,
}

impl SchemaSnapshot {
    /// Assemble a snapshot, dropping foreign keys whose target is absent.
    ///
    /// Returns the snapshot and the dropped relations so callers can log them.
    pub fn assemble(
        tables: Vec<TableDescriptor>,
        version: u64,
        build_duration: Duration,
        missing_samples: Vec<String>,
    ) -> (Self, Vec<(String, ForeignKey)>) {
        let names: BTreeSet<String> = tables.iter().map(|t| t.name.clone()).collect();
        let mut dropped = Vec::new();
        let mut by_name = BTreeMap::new();

        for mut table in tables {
            let (kept, gone): (Vec<_>, Vec<_>) = table
                .foreign_keys
                .into_iter()
                .partition(|fk| names.contains(&fk.target_table));
            dropped.extend(gone.into_iter().map(|fk| (table.name.clone(), fk)));
            table.foreign_keys = kept;
            by_name.insert(table.name.clone(), table);
        }

        let snapshot = Self {
            tables: by_name,
            version,
            built_at: Utc::now(),
            build_duration,
            missing_samples,
        };
        (snapshot, dropped)
    }

    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.get(name)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table_names(&self) -> BTreeSet<String> {
        self.tables.keys().cloned().collect()
    }

    /// Tables linked to `name` by a foreign key in either direction
    pub fn neighbours(&self, name: &str) -> BTreeSet<&str> {
        let mut related = BTreeSet::new();
        if let Some(table) = self.tables.get(name) {
            for fk in &table.foreign_keys {
                related.insert(fk.target_table.as_str());
            }
        }
        for table in self.tables.values() {
            if table.foreign_keys.iter().any(|fk| fk.target_table == name) {
                related.insert(table.name.as_str());
            }
        }
        related.remove(name);
        related
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
