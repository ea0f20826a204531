//! Schema Catalog
//!
//! Introspects the database once, caches the result as an immutable
//! `SchemaSnapshot` and republishes a new one on refresh.
//!
//! Publishing uses `ArcSwapOption`: a refresh builds the complete snapshot
//! first and swaps the pointer afterwards. Readers holding the old `Arc` keep
//! using it; new readers see the new one. Readers never take the refresh lock.

use crate::config::MetadataTables;
use crate::error::{Nl2SqlError, Result};
use crate::schema::source::SchemaSource;
use crate::schema::types::{SchemaSnapshot, TableDescriptor};
use arc_swap::ArcSwapOption;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Sample rows pulled from each mock table
const SAMPLE_ROWS_PER_TABLE: usize = 5;

pub struct SchemaCatalog {
    source: Arc<dyn SchemaSource>,
    metadata: MetadataTables,
    current: ArcSwapOption<SchemaSnapshot>,
    /// Serializes builds so published versions strictly increase
    refresh_lock: Mutex<()>,
    last_version: AtomicU64,
}

impl SchemaCatalog {
    pub fn new(source: Arc<dyn SchemaSource>, metadata: MetadataTables) -> Self {
        Self {
            source,
            metadata,
            current: ArcSwapOption::empty(),
            refresh_lock: Mutex::new(()),
            last_version: AtomicU64::new(0),
        }
    }

    /// Introspect the source into a new snapshot without publishing it.
    ///
    /// Only a failure to reach the source (connect or list tables) is fatal.
    /// Per-table and metadata problems are logged and the offending piece is
    /// left out.
    pub fn build(&self) -> Result<SchemaSnapshot> {
        let started = Instant::now();

        self.source.reconnect().map_err(into_build_error)?;
        let all_tables = self.source.list_tables().map_err(into_build_error)?;

        let business_tables: Vec<String> = all_tables
            .into_iter()
            .filter(|name| !self.metadata.is_bookkeeping(name))
            .collect();

        let mut tables = Vec::with_capacity(business_tables.len());
        let mut missing_samples = Vec::new();

        for name in &business_tables {
            let columns = match self.source.list_columns(name) {
                Ok(columns) => columns,
                Err(e) => {
                    warn!("Skipping table {}: cannot read columns: {}", name, e);
                    continue;
                }
            };

            let foreign_keys = self.source.list_foreign_keys(name).unwrap_or_else(|e| {
                warn!("Foreign keys unavailable for {}: {}", name, e);
                Vec::new()
            });

            let row_count = self.source.row_count(name).unwrap_or_else(|e| {
                debug!("Row count unavailable for {}: {}", name, e);
                None
            });

            let sample_rows = match self.source.sample_rows(name, SAMPLE_ROWS_PER_TABLE) {
                Ok(Some(rows)) => rows,
                Ok(None) => {
                    missing_samples.push(name.clone());
                    Vec::new()
                }
                Err(e) => {
                    warn!("Could not load mock samples for {}: {}", name, e);
                    missing_samples.push(name.clone());
                    Vec::new()
                }
            };

            tables.push(TableDescriptor {
                name: name.clone(),
                columns,
                description: None,
                row_count,
                foreign_keys,
                sample_rows,
            });
        }

        self.attach_descriptions(&mut tables);

        if !missing_samples.is_empty() {
            warn!("Tables without mock sample data: {:?}", missing_samples);
        }

        let version = self.last_version.fetch_add(1, Ordering::SeqCst) + 1;
        let (snapshot, dropped) =
            SchemaSnapshot::assemble(tables, version, started.elapsed(), missing_samples);

        for (table, fk) in dropped {
            warn!(
                "Dropping foreign key {}.{} -> {}.{}: target table not in schema",
                table, fk.column, fk.target_table, fk.target_column
            );
        }

        info!(
            "Built schema snapshot v{} with {} tables in {:?}",
            snapshot.version,
            snapshot.len(),
            snapshot.build_duration
        );
        Ok(snapshot)
    }

    /// Most recent snapshot, building it on first use
    pub fn current(&self) -> Result<Arc<SchemaSnapshot>> {
        if let Some(snapshot) = self.current.load_full() {
            return Ok(snapshot);
        }

        let _guard = self.lock()?;
        // Another caller may have finished the first build while we waited
        if let Some(snapshot) = self.current.load_full() {
            return Ok(snapshot);
        }
        let snapshot = Arc::new(self.build()?);
        self.current.store(Some(Arc::clone(&snapshot)));
        Ok(snapshot)
    }

    /// Rebuild and atomically publish. On failure the previous snapshot stays.
    pub fn refresh(&self) -> Result<Arc<SchemaSnapshot>> {
        let _guard = self.lock()?;
        info!("Refreshing schema catalog");

        match self.build() {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                self.current.store(Some(Arc::clone(&snapshot)));
                Ok(snapshot)
            }
            Err(e) => {
                let kept = self.current.load().as_ref().map(|s| s.version);
                warn!("Schema refresh failed, keeping snapshot {:?}: {}", kept, e);
                Err(e)
            }
        }
    }

    /// Published snapshot, if any, without triggering a build
    pub fn peek(&self) -> Option<Arc<SchemaSnapshot>> {
        self.current.load_full()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.refresh_lock
            .lock()
            .map_err(|_| Nl2SqlError::SchemaBuild("refresh lock poisoned".to_string()))
    }

    fn attach_descriptions(&self, tables: &mut [TableDescriptor]) {
        let index: HashMap<String, usize> = tables
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();

        let table_rows = self.source.table_descriptions().unwrap_or_else(|e| {
            warn!("Table descriptions unavailable: {}", e);
            Vec::new()
        });
        for row in table_rows {
            match index.get(&row.table_name) {
                Some(&i) => tables[i].description = non_empty(row.description),
                None => warn!(
                    "Description references unknown table {}; ignoring",
                    row.table_name
                ),
            }
        }

        let column_rows = self.source.column_descriptions().unwrap_or_else(|e| {
            warn!("Column descriptions unavailable: {}", e);
            Vec::new()
        });
        for row in column_rows {
            let Some(&i) = index.get(&row.table_name) else {
                warn!(
                    "Column description references unknown table {}; ignoring",
                    row.table_name
                );
                continue;
            };
            let column = tables[i].columns.iter_mut().find(|c| c.name == row.column_name);
            let Some(column) = column else {
                warn!(
                    "Column description references unknown column {}.{}; ignoring",
                    row.table_name, row.column_name
                );
                continue;
            };
            column.description = non_empty(row.description);
            column.business_meaning = row.business_meaning.and_then(non_empty);
            column.examples = row.data_examples.and_then(non_empty);
        }
    }
}

fn non_empty(text: String) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn into_build_error(err: Nl2SqlError) -> Nl2SqlError {
    match err {
        Nl2SqlError::SchemaBuild(_) => err,
        other => Nl2SqlError::SchemaBuild(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::source::{ColumnDescriptionRow, SampleRow, TableDescriptionRow};
    use crate::schema::types::{ColumnDescriptor, ForeignKey};
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    /// In-memory source whose table list can be changed, slowed down or broken
    #[derive(Default)]
    struct FakeSource {
        tables: Mutex<Vec<String>>,
        fail: AtomicBool,
        slow: AtomicBool,
    }

    impl FakeSource {
        fn with_tables(names: &[&str]) -> Self {
            let source = Self::default();
            *source.tables.lock().unwrap() = names.iter().map(|s| s.to_string()).collect();
            source
        }
    }

    impl SchemaSource for FakeSource {
        fn list_tables(&self) -> Result<Vec<String>> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(Nl2SqlError::SchemaBuild("connection refused".to_string()));
            }
            Ok(self.tables.lock().unwrap().clone())
        }

        fn list_columns(&self, _table: &str) -> Result<Vec<ColumnDescriptor>> {
            if self.slow.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(20));
            }
            Ok(vec![ColumnDescriptor::new("id", "INTEGER"), ColumnDescriptor::new("name", "TEXT")])
        }

        fn list_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
            if table == "orders" {
                return Ok(vec![ForeignKey {
                    column: "user_id".to_string(),
                    target_table: "users".to_string(),
                    target_column: "id".to_string(),
                }]);
            }
            Ok(Vec::new())
        }

        fn row_count(&self, _table: &str) -> Result<Option<u64>> {
            Ok(Some(10))
        }

        fn table_descriptions(&self) -> Result<Vec<TableDescriptionRow>> {
            Ok(vec![
                TableDescriptionRow {
                    table_name: "users".to_string(),
                    description: "Registered customers".to_string(),
                },
                TableDescriptionRow {
                    table_name: "ghosts".to_string(),
                    description: "Dropped long ago".to_string(),
                },
            ])
        }

        fn column_descriptions(&self) -> Result<Vec<ColumnDescriptionRow>> {
            Ok(vec![
                ColumnDescriptionRow {
                    table_name: "users".to_string(),
                    column_name: "name".to_string(),
                    description: "Display name".to_string(),
                    business_meaning: Some("".to_string()),
                    data_examples: Some("Ann, Bob".to_string()),
                },
                ColumnDescriptionRow {
                    table_name: "users".to_string(),
                    column_name: "shoe_size".to_string(),
                    description: "Removed column".to_string(),
                    business_meaning: None,
                    data_examples: None,
                },
            ])
        }

        fn sample_rows(&self, table: &str, _limit: usize) -> Result<Option<Vec<SampleRow>>> {
            if table == "users" {
                return Ok(Some(Vec::new()));
            }
            Ok(None)
        }
    }

    fn catalog(source: Arc<FakeSource>) -> SchemaCatalog {
        SchemaCatalog::new(source, MetadataTables::default())
    }

    #[test]
    fn test_build_joins_metadata_and_skips_bookkeeping() {
        let source = Arc::new(FakeSource::with_tables(&[
            "users",
            "orders",
            "users_sample",
            "table_descriptions",
            "column_descriptions",
        ]));
        let snapshot = catalog(source).build().unwrap();

        assert_eq!(snapshot.table_names().into_iter().collect::<Vec<_>>(), vec!["orders", "users"]);
        let users = snapshot.table("users").unwrap();
        assert_eq!(users.description.as_deref(), Some("Registered customers"));
        let name = users.column("name").unwrap();
        assert_eq!(name.description.as_deref(), Some("Display name"));
        assert_eq!(name.business_meaning, None);
        assert_eq!(name.examples.as_deref(), Some("Ann, Bob"));
        assert_eq!(snapshot.missing_samples, vec!["orders".to_string()]);
    }

    #[test]
    fn test_dangling_foreign_key_is_dropped() {
        let source = Arc::new(FakeSource::with_tables(&["orders"]));
        let snapshot = catalog(source).build().unwrap();
        assert!(snapshot.table("orders").unwrap().foreign_keys.is_empty());
    }

    #[test]
    fn test_current_builds_lazily_once() {
        let source = Arc::new(FakeSource::with_tables(&["users"]));
        let catalog = catalog(source);
        assert!(catalog.peek().is_none());

        let first = catalog.current().unwrap();
        let second = catalog.current().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.version, 1);
    }

    #[test]
    fn test_refresh_bumps_version_and_failure_keeps_previous() {
        let source = Arc::new(FakeSource::with_tables(&["users"]));
        let catalog = catalog(Arc::clone(&source));

        let v1 = catalog.current().unwrap();
        source.tables.lock().unwrap().push("orders".to_string());
        let v2 = catalog.refresh().unwrap();
        assert!(v2.version > v1.version);
        assert_eq!(v2.len(), 2);

        source.fail.store(true, Ordering::SeqCst);
        let err = catalog.refresh().unwrap_err();
        assert!(matches!(err, Nl2SqlError::SchemaBuild(_)));
        assert_eq!(catalog.current().unwrap().version, v2.version);
    }

    #[test]
    fn test_readers_never_see_empty_snapshot_during_refresh() {
        let source = Arc::new(FakeSource::with_tables(&["users", "orders", "products"]));
        let catalog = Arc::new(catalog(Arc::clone(&source)));
        catalog.current().unwrap();
        source.slow.store(true, Ordering::SeqCst);

        let writer = {
            let catalog = Arc::clone(&catalog);
            std::thread::spawn(move || {
                for _ in 0..3 {
                    catalog.refresh().unwrap();
                }
            })
        };

        let mut last_version = 0;
        while !writer.is_finished() {
            let snapshot = catalog.current().unwrap();
            assert_eq!(snapshot.len(), 3);
            assert!(snapshot.version >= last_version);
            last_version = snapshot.version;
        }
        writer.join().unwrap();
        assert_eq!(catalog.current().unwrap().version, 4);
    }
}
