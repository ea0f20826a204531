//! SQLite Execution Engine
//!
//! Every statement runs on a fresh read-only connection inside a blocking task.
//! A progress handler interrupts statements that outlive the timeout.

use crate::db::{open_read_only, row_to_map};
use crate::error::{Nl2SqlError, Result};
use crate::execution::engine::QueryExecutor;
use crate::execution::result::{dedupe_columns, QueryResult, Row};
use async_trait::async_trait;
use rusqlite::Connection;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// VM instructions between progress handler calls
const PROGRESS_INTERVAL: i32 = 1_000;

pub struct SqliteExecutor {
    path: PathBuf,
    statement_timeout: Duration,
}

impl SqliteExecutor {
    pub fn new(path: impl Into<PathBuf>, statement_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            statement_timeout,
        }
    }
}

#[async_trait]
impl QueryExecutor for SqliteExecutor {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn execute(&self, sql: &str, max_rows: usize) -> Result<QueryResult> {
        let path = self.path.clone();
        let timeout = self.statement_timeout;
        let owned_sql = sql.to_string();

        let result = tokio::task::spawn_blocking(move || {
            let conn = open_read_only(&path).map_err(|e| Nl2SqlError::Execution {
                sql: owned_sql.clone(),
                message: e.to_string(),
            })?;
            run_query(&conn, &owned_sql, max_rows, timeout)
        })
        .await
        .map_err(|e| Nl2SqlError::Execution {
            sql: sql.to_string(),
            message: format!("execution task failed: {}", e),
        })??;

        info!(
            "Executed query in {}ms: {} rows{}",
            result.execution_time_ms,
            result.row_count,
            if result.truncated { " (truncated)" } else { "" }
        );
        Ok(result)
    }
}

/// Run `sql` on `conn`, stopping after `max_rows` rows or `timeout`
pub fn run_query(
    conn: &Connection,
    sql: &str,
    max_rows: usize,
    timeout: Duration,
) -> Result<QueryResult> {
    let started = Instant::now();
    let deadline = started + timeout;
    conn.progress_handler(PROGRESS_INTERVAL, Some(move || Instant::now() >= deadline));

    let outcome = fetch(conn, sql, max_rows);
    conn.progress_handler(PROGRESS_INTERVAL, None::<fn() -> bool>);

    let (columns, rows, truncated) = outcome.map_err(|e| {
        let message = if Instant::now() >= deadline {
            format!("statement exceeded the {:?} timeout", timeout)
        } else {
            e.to_string()
        };
        warn!("Query failed: {}", message);
        Nl2SqlError::Execution {
            sql: sql.to_string(),
            message,
        }
    })?;

    let elapsed = started.elapsed().as_millis() as u64;
    Ok(QueryResult::new(sql, columns, rows, truncated, elapsed))
}

fn fetch(
    conn: &Connection,
    sql: &str,
    max_rows: usize,
) -> rusqlite::Result<(Vec<String>, Vec<Row>, bool)> {
    let mut stmt = conn.prepare(sql)?;
    let columns = dedupe_columns(stmt.column_names().into_iter().map(String::from).collect());

    let mut rows = Vec::new();
    let mut truncated = false;
    let mut cursor = stmt.query([])?;
    while let Some(row) = cursor.next()? {
        if rows.len() == max_rows {
            truncated = true;
            break;
        }
        rows.push(row_to_map(row, &columns)?);
    }
    Ok((columns, rows, truncated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_read_write;
    use serde_json::json;

    fn fixture() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("exec.db");
        let conn = open_read_write(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT, price REAL, payload BLOB);
             INSERT INTO items VALUES
                (1, 'pen', 1.5, x'0aff'), (2, 'ink', NULL, NULL), (3, 'pad', 3.0, NULL);",
        )
        .unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn test_execute_maps_values() {
        let (_dir, path) = fixture();
        let executor = SqliteExecutor::new(&path, Duration::from_secs(5));
        let result = executor
            .execute("SELECT id, name, price, payload FROM items ORDER BY id", 100)
            .await
            .unwrap();

        assert_eq!(result.columns, vec!["id", "name", "price", "payload"]);
        assert_eq!(result.row_count, 3);
        assert!(!result.truncated);
        assert_eq!(result.rows[0]["payload"], json!("0aff"));
        assert_eq!(result.rows[1]["price"], serde_json::Value::Null);
        assert_eq!(result.column_values("name"), vec![&json!("pen"), &json!("ink"), &json!("pad")]);
    }

    #[tokio::test]
    async fn test_row_ceiling_truncates() {
        let (_dir, path) = fixture();
        let executor = SqliteExecutor::new(&path, Duration::from_secs(5));
        let result = executor.execute("SELECT * FROM items", 2).await.unwrap();
        assert_eq!(result.row_count, 2);
        assert!(result.truncated);
    }

    #[tokio::test]
    async fn test_duplicate_column_names_are_kept_apart() {
        let (_dir, path) = fixture();
        let executor = SqliteExecutor::new(&path, Duration::from_secs(5));
        let sql = "SELECT a.id, b.id FROM items a JOIN items b ON a.id = b.id WHERE a.id = 3";
        let result = executor.execute(sql, 10).await.unwrap();
        assert_eq!(result.columns, vec!["id", "id_2"]);
        assert_eq!(result.rows[0]["id_2"], json!(3));
    }

    #[tokio::test]
    async fn test_errors_carry_the_sql() {
        let (_dir, path) = fixture();
        let executor = SqliteExecutor::new(&path, Duration::from_secs(5));
        let err = executor.execute("SELECT missing FROM items", 10).await.unwrap_err();
        match err {
            Nl2SqlError::Execution { sql, message } => {
                assert_eq!(sql, "SELECT missing FROM items");
                assert!(message.contains("missing"));
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let write = executor.execute("DELETE FROM items", 10).await.unwrap_err();
        assert_eq!(write.stage(), "execution");
    }

    #[test]
    fn test_statement_timeout_interrupts() {
        let conn = Connection::open_in_memory().unwrap();
        let endless = "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n) \
                       SELECT count(*) FROM n";
        let err = run_query(&conn, endless, 10, Duration::from_millis(50)).unwrap_err();
        assert!(
            matches!(err, Nl2SqlError::Execution { ref message, .. } if message.contains("timeout"))
        );
    }
}
