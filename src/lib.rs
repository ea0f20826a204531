pub mod config;
pub mod db;
pub mod error;
pub mod execution;
pub mod llm;
pub mod prompt;
pub mod relevance;
pub mod schema;
pub mod seed;
pub mod service;
pub mod validation;

pub use config::{AppConfig, LlmConfig, MetadataTables};
pub use error::{Nl2SqlError, Result};
pub use execution::{QueryExecutor, QueryResult, SqliteExecutor};
pub use llm::{OpenAiGenerator, SqlGenerator, StaticGenerator};
pub use prompt::{extract_sql, ComposedPrompt, PromptComposer};
pub use relevance::{RelevanceScorer, SelectionResult};
pub use schema::{SchemaCatalog, SchemaSnapshot, SchemaSource, SqliteSchemaSource};
pub use service::{QueryOutcome, SchemaReport, TextToSqlService};
pub use validation::{QueryValidator, RejectionReason, ValidationVerdict};
