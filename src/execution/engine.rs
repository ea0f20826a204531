//! Execution engine abstraction

use crate::error::Result;
use crate::execution::result::QueryResult;
use async_trait::async_trait;

/// Runs validated SQL. Implementations enforce their own row ceiling,
/// independent of any LIMIT in the statement.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Engine name (e.g. "sqlite")
    fn name(&self) -> &'static str;

    /// Execute `sql`, fetching at most `max_rows` rows
    async fn execute(&self, sql: &str, max_rows: usize) -> Result<QueryResult>;
}
