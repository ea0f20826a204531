//! Text-to-SQL service
//!
//! Wires the catalog, scorer, composer, generator, validator and executor into
//! one pipeline. Every stage failure becomes a structured `QueryOutcome`.

use crate::config::AppConfig;
use crate::error::{Nl2SqlError, Result};
use crate::execution::{QueryExecutor, QueryResult, SqliteExecutor};
use crate::llm::SqlGenerator;
use crate::prompt::{extract_sql, PromptComposer};
use crate::relevance::{RelevanceScorer, SelectionResult};
use crate::schema::{mock_setup_script, SchemaCatalog, SchemaSnapshot, SqliteSchemaSource};
use crate::validation::{QueryValidator, RejectionReason, ValidationVerdict};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Result of one end-to-end question
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryOutcome {
    Answered {
        request_id: String,
        question: String,
        sql: String,
        limit_injected: bool,
        prompt_over_budget: bool,
        selection: SelectionResult,
        result: QueryResult,
    },
    Failed {
        request_id: String,
        stage: String,
        error: String,
        /// SQL that was rejected or failed, when the pipeline got that far
        sql: Option<String>,
        suggestion: Option<String>,
    },
}

impl QueryOutcome {
    pub fn is_answered(&self) -> bool {
        matches!(self, QueryOutcome::Answered { .. })
    }

    fn failed(request_id: &Uuid, error: Nl2SqlError, sql: Option<String>) -> Self {
        let suggestion = match &error {
            Nl2SqlError::Validation { reason, .. } => Some(reason.suggestion().to_string()),
            Nl2SqlError::Execution { .. } => Some(
                "The database could not run the query; try rephrasing the question.".to_string(),
            ),
            Nl2SqlError::Generation(_) => {
                Some("The SQL generator is unavailable; try again later.".to_string())
            }
            _ => None,
        };
        warn!("[{}] Failed at {}: {}", request_id, error.stage(), error);
        QueryOutcome::Failed {
            request_id: request_id.to_string(),
            stage: error.stage().to_string(),
            error: error.to_string(),
            sql,
            suggestion,
        }
    }
}

/// Catalog summary with mock sample coverage
#[derive(Debug, Clone, Serialize)]
pub struct SchemaReport {
    pub version: u64,
    pub built_at: DateTime<Utc>,
    pub build_duration_ms: u64,
    pub table_count: usize,
    pub tables: Vec<TableSummary>,
    pub missing_samples: Vec<String>,
    pub sample_coverage_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub columns: usize,
    pub row_count: Option<u64>,
    pub described: bool,
    pub has_samples: bool,
}

impl SchemaReport {
    pub fn from_snapshot(snapshot: &SchemaSnapshot) -> Self {
        let missing: BTreeSet<&str> = snapshot.missing_samples.iter().map(String::as_str).collect();
        let tables: Vec<TableSummary> = snapshot
            .tables
            .values()
            .map(|t| TableSummary {
                name: t.name.clone(),
                columns: t.columns.len(),
                row_count: t.row_count,
                described: t.description.is_some(),
                has_samples: !missing.contains(t.name.as_str()),
            })
            .collect();

        let covered = tables.iter().filter(|t| t.has_samples).count();
        let sample_coverage_percent = if tables.is_empty() {
            100.0
        } else {
            (covered as f64 * 1000.0 / tables.len() as f64).round() / 10.0
        };

        Self {
            version: snapshot.version,
            built_at: snapshot.built_at,
            build_duration_ms: snapshot.build_duration.as_millis() as u64,
            table_count: tables.len(),
            tables,
            missing_samples: snapshot.missing_samples.clone(),
            sample_coverage_percent,
        }
    }
}

pub struct TextToSqlService<G: SqlGenerator, E: QueryExecutor> {
    catalog: Arc<SchemaCatalog>,
    scorer: RelevanceScorer,
    composer: PromptComposer,
    validator: QueryValidator,
    generator: G,
    executor: E,
    config: AppConfig,
}

impl<G: SqlGenerator> TextToSqlService<G, SqliteExecutor> {
    /// Service over the SQLite file named in `config`
    pub fn sqlite(config: AppConfig, generator: G) -> Self {
        let source = SqliteSchemaSource::new(&config.database_path, config.metadata.clone())
            .with_exact_counts(config.exact_row_counts);
        let catalog = Arc::new(SchemaCatalog::new(Arc::new(source), config.metadata.clone()));
        let executor = SqliteExecutor::new(&config.database_path, config.statement_timeout);
        Self::new(catalog, generator, executor, config)
    }
}

impl<G: SqlGenerator, E: QueryExecutor> TextToSqlService<G, E> {
    pub fn new(catalog: Arc<SchemaCatalog>, generator: G, executor: E, config: AppConfig) -> Self {
        Self {
            catalog,
            scorer: RelevanceScorer::default(),
            composer: PromptComposer::new(config.prompt_char_ceiling, config.default_row_limit),
            validator: QueryValidator::new(config.default_row_limit),
            generator,
            executor,
            config,
        }
    }

    pub fn with_scorer(mut self, scorer: RelevanceScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn catalog(&self) -> &Arc<SchemaCatalog> {
        &self.catalog
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Tables worth showing the generator for `question`
    pub fn select_relevant_tables(&self, question: &str, budget: usize) -> Result<SelectionResult> {
        let snapshot = self.catalog.current()?;
        self.scorer.select(question, &snapshot, budget)
    }

    pub fn validate_sql(&self, sql: &str, known_tables: &BTreeSet<String>) -> ValidationVerdict {
        self.validator.validate(sql, known_tables)
    }

    /// Validate against every table of the current snapshot
    pub fn validate_against_schema(&self, sql: &str) -> Result<ValidationVerdict> {
        let snapshot = self.catalog.current()?;
        Ok(self.validator.validate(sql, &snapshot.table_names()))
    }

    pub fn refresh_schema(&self) -> Result<Arc<SchemaSnapshot>> {
        self.catalog.refresh()
    }

    pub fn schema_report(&self) -> Result<SchemaReport> {
        let snapshot = self.catalog.current()?;
        Ok(SchemaReport::from_snapshot(&snapshot))
    }

    /// DDL for the mock sample tables that are still missing
    pub fn mock_setup_script(&self) -> Result<String> {
        let snapshot = self.catalog.current()?;
        Ok(mock_setup_script(&snapshot, &self.config.metadata.sample_suffix))
    }

    /// Question in, rows out
    pub async fn ask(&self, question: &str) -> QueryOutcome {
        let request_id = Uuid::new_v4();
        let question = question.trim();
        if question.is_empty() {
            return QueryOutcome::failed(
                &request_id,
                Nl2SqlError::InvalidArgument("question is empty".to_string()),
                None,
            );
        }
        info!("[{}] Question: {}", request_id, question);

        let snapshot = match self.catalog.current() {
            Ok(snapshot) => snapshot,
            Err(e) => return QueryOutcome::failed(&request_id, e, None),
        };
        if snapshot.is_empty() {
            return QueryOutcome::failed(
                &request_id,
                Nl2SqlError::SchemaBuild("the database has no business tables".to_string()),
                None,
            );
        }

        let selection = match self.scorer.select(question, &snapshot, self.config.max_tables) {
            Ok(selection) => selection,
            Err(e) => return QueryOutcome::failed(&request_id, e, None),
        };

        let prompt = self.composer.compose(question, &selection, &snapshot);
        info!(
            "[{}] Prompt covers {} of {} tables ({} chars, {:?})",
            request_id,
            prompt.tables.len(),
            selection.total_tables,
            prompt.char_count(),
            prompt.detail
        );

        let reply = match self.generator.generate(&prompt.text, question).await {
            Ok(reply) => reply,
            Err(e) => return QueryOutcome::failed(&request_id, e, None),
        };

        let Some(extracted) = extract_sql(&reply, &self.config.metadata.sample_suffix) else {
            return QueryOutcome::failed(
                &request_id,
                Nl2SqlError::Validation {
                    reason: RejectionReason::Unparseable,
                    detail: "no SQL statement in the generator reply".to_string(),
                },
                None,
            );
        };

        let verdict = self.validator.validate(&extracted, &snapshot.table_names());
        let limit_injected = verdict.limit_injected;
        let sql = match verdict.into_result() {
            Ok(sql) => sql,
            Err(e) => return QueryOutcome::failed(&request_id, e, Some(extracted)),
        };
        info!("[{}] Executing: {}", request_id, sql);

        let result = match self.executor.execute(&sql, self.config.max_query_results).await {
            Ok(result) => result,
            Err(e) => return QueryOutcome::failed(&request_id, e, Some(sql)),
        };

        QueryOutcome::Answered {
            request_id: request_id.to_string(),
            question: question.to_string(),
            sql,
            limit_injected,
            prompt_over_budget: prompt.over_budget,
            selection,
            result,
        }
    }
}
