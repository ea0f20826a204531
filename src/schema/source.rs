//! Schema sources
//!
//! A `SchemaSource` lists tables, columns, foreign keys and the optional
//! metadata relations. The catalog only talks to this trait.

use crate::config::MetadataTables;
use crate::db::{open_read_only, quote_ident, row_to_map, table_exists};
use crate::error::{Nl2SqlError, Result};
use crate::schema::types::{ColumnDescriptor, ForeignKey};
use rusqlite::{Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Row of the table-level description relation
#[derive(Debug, Clone, PartialEq)]
pub struct TableDescriptionRow {
    pub table_name: String,
    pub description: String,
}

/// Row of the column-level description relation
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptionRow {
    pub table_name: String,
    pub column_name: String,
    pub description: String,
    pub business_meaning: Option<String>,
    pub data_examples: Option<String>,
}

pub type SampleRow = BTreeMap<String, serde_json::Value>;

pub trait SchemaSource: Send + Sync {
    /// Every base table, including bookkeeping relations
    fn list_tables(&self) -> Result<Vec<String>>;

    fn list_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>>;

    fn list_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>>;

    fn row_count(&self, table: &str) -> Result<Option<u64>>;

    /// Empty when the relation does not exist
    fn table_descriptions(&self) -> Result<Vec<TableDescriptionRow>>;

    /// Empty when the relation does not exist
    fn column_descriptions(&self) -> Result<Vec<ColumnDescriptionRow>>;

    /// Rows of the mock sample table for `table`; `None` when there is none
    fn sample_rows(&self, table: &str, limit: usize) -> Result<Option<Vec<SampleRow>>>;

    /// Re-establish the connection before a build. Sources without one do nothing.
    fn reconnect(&self) -> Result<()> {
        Ok(())
    }
}

/// SQLite-backed schema source.
///
/// Opens a fresh read-only connection for every build so a refresh sees DDL
/// applied since the previous one.
pub struct SqliteSchemaSource {
    path: Option<PathBuf>,
    conn: Mutex<Option<Connection>>,
    metadata: MetadataTables,
    /// Fall back to `COUNT(*)` when `sqlite_stat1` has no estimate
    exact_counts: bool,
}

impl SqliteSchemaSource {
    pub fn new(path: impl AsRef<Path>, metadata: MetadataTables) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            conn: Mutex::new(None),
            metadata,
            exact_counts: false,
        }
    }

    /// Wrap an already-open connection (in-memory databases, tests)
    pub fn from_connection(conn: Connection, metadata: MetadataTables) -> Self {
        Self {
            path: None,
            conn: Mutex::new(Some(conn)),
            metadata,
            exact_counts: false,
        }
    }

    /// Count rows of tables `ANALYZE` has not covered. Scans every such table on each build.
    pub fn with_exact_counts(mut self, exact_counts: bool) -> Self {
        self.exact_counts = exact_counts;
        self
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<Connection>>> {
        self.conn
            .lock()
            .map_err(|_| Nl2SqlError::SchemaBuild("schema connection lock poisoned".to_string()))
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let mut guard = self.lock()?;
        if guard.is_none() {
            let path = self.path.as_ref().ok_or_else(|| {
                Nl2SqlError::SchemaBuild("no schema connection available".to_string())
            })?;
            *guard = Some(open_read_only(path)?);
        }
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(Nl2SqlError::SchemaBuild("no schema connection available".to_string())),
        }
    }
}

impl SchemaSource for SqliteSchemaSource {
    fn reconnect(&self) -> Result<()> {
        if let Some(path) = &self.path {
            let conn = open_read_only(path)?;
            *self.lock()? = Some(conn);
        }
        Ok(())
    }

    fn list_tables(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(names)
        })
    }

    fn list_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
            let columns = stmt
                .query_map([], |row| {
                    let not_null: i64 = row.get("notnull")?;
                    let pk: i64 = row.get("pk")?;
                    Ok(ColumnDescriptor {
                        name: row.get("name")?,
                        data_type: row.get::<_, Option<String>>("type")?.unwrap_or_default(),
                        nullable: not_null == 0 && pk == 0,
                        primary_key: pk > 0,
                        default_value: row.get("dflt_value")?,
                        description: None,
                        business_meaning: None,
                        examples: None,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(columns)
        })
    }

    fn list_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("PRAGMA foreign_key_list({})", quote_ident(table)))?;
            let keys = stmt
                .query_map([], |row| {
                    Ok(ForeignKey {
                        column: row.get("from")?,
                        target_table: row.get("table")?,
                        // `to` is NULL when the reference targets the primary key implicitly
                        target_column: row.get::<_, Option<String>>("to")?.unwrap_or_default(),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(keys)
        })
    }

    fn row_count(&self, table: &str) -> Result<Option<u64>> {
        self.with_conn(|conn| {
            if table_exists(conn, "sqlite_stat1")? {
                let stat: Option<String> = conn
                    .query_row(
                        "SELECT stat FROM sqlite_stat1 WHERE tbl = ?1 LIMIT 1",
                        [table],
                        |row| row.get(0),
                    )
                    .optional()?;
                let estimate = stat.and_then(|s| s.split_whitespace().next()?.parse::<u64>().ok());
                if estimate.is_some() {
                    return Ok(estimate);
                }
            }
            if !self.exact_counts {
                return Ok(None);
            }
            let count: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
                [],
                |row| row.get(0),
            )?;
            Ok(u64::try_from(count).ok())
        })
    }

    fn table_descriptions(&self) -> Result<Vec<TableDescriptionRow>> {
        let relation = self.metadata.table_descriptions.clone();
        self.with_conn(|conn| {
            if !table_exists(conn, &relation)? {
                debug!("No {} relation; tables carry no descriptions", relation);
                return Ok(Vec::new());
            }
            let mut stmt = conn.prepare(&format!(
                "SELECT table_name, description FROM {}",
                quote_ident(&relation)
            ))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(TableDescriptionRow {
                        table_name: row.get(0)?,
                        description: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    fn column_descriptions(&self) -> Result<Vec<ColumnDescriptionRow>> {
        let relation = self.metadata.column_descriptions.clone();
        self.with_conn(|conn| {
            if !table_exists(conn, &relation)? {
                debug!("No {} relation; columns carry no descriptions", relation);
                return Ok(Vec::new());
            }
            let mut stmt = conn.prepare(&format!(
                "SELECT table_name, column_name, description, business_meaning, data_examples \
                 FROM {}",
                quote_ident(&relation)
            ))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(ColumnDescriptionRow {
                        table_name: row.get(0)?,
                        column_name: row.get(1)?,
                        description: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                        business_meaning: row.get(3)?,
                        data_examples: row.get(4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    fn sample_rows(&self, table: &str, limit: usize) -> Result<Option<Vec<SampleRow>>> {
        let sample_table = self.metadata.sample_table_for(table);
        self.with_conn(|conn| {
            if !table_exists(conn, &sample_table)? {
                return Ok(None);
            }
            let mut stmt = conn.prepare(&format!(
                "SELECT * FROM {} LIMIT {}",
                quote_ident(&sample_table),
                limit
            ))?;
            let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
            let rows = stmt
                .query_map([], |row| row_to_map(row, &columns))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(Some(rows))
        })
    }
}
