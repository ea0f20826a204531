//! Runtime configuration
//!
//! Values come from the process environment (after `.env` has been loaded by
//! the binary). Every setting has a default so the engine runs offline.

use crate::error::{Nl2SqlError, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Settings for the OpenAI-compatible generation endpoint
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-4.1".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            temperature: 0.1,
            max_tokens: 500,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Names of the bookkeeping relations that hold business descriptions
#[derive(Debug, Clone)]
pub struct MetadataTables {
    pub table_descriptions: String,
    pub column_descriptions: String,
    /// Suffix identifying mock sample tables (`products_sample`)
    pub sample_suffix: String,
}

impl Default for MetadataTables {
    fn default() -> Self {
        Self {
            table_descriptions: "table_descriptions".to_string(),
            column_descriptions: "column_descriptions".to_string(),
            sample_suffix: "_sample".to_string(),
        }
    }
}

impl MetadataTables {
    /// True for relations that are never exposed as business tables
    pub fn is_bookkeeping(&self, table: &str) -> bool {
        table.starts_with("sqlite_")
            || table == self.table_descriptions
            || table == self.column_descriptions
            || (!self.sample_suffix.is_empty() && table.ends_with(&self.sample_suffix))
    }

    pub fn sample_table_for(&self, table: &str) -> String {
        format!("{}{}", table, self.sample_suffix)
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: PathBuf,
    /// Table budget handed to the relevance scorer
    pub max_tables: usize,
    /// LIMIT injected into statements that carry none
    pub default_row_limit: u64,
    /// Hard row ceiling enforced by the executor regardless of the SQL
    pub max_query_results: usize,
    pub prompt_char_ceiling: usize,
    pub statement_timeout: Duration,
    /// Count rows with `COUNT(*)` for tables without `ANALYZE` statistics
    pub exact_row_counts: bool,
    pub llm: LlmConfig,
    pub metadata: MetadataTables,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("text_to_sql.db"),
            max_tables: 10,
            default_row_limit: 100,
            max_query_results: 1000,
            prompt_char_ceiling: 12_000,
            statement_timeout: Duration::from_secs(10),
            exact_row_counts: false,
            llm: LlmConfig::default(),
            metadata: MetadataTables::default(),
        }
    }
}

impl AppConfig {
    /// Build configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup (used by tests)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let llm_defaults = LlmConfig::default();

        let config = Self {
            database_path: lookup("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            max_tables: parse_or(&lookup, "MAX_TABLES", defaults.max_tables)?,
            default_row_limit: parse_or(&lookup, "DEFAULT_ROW_LIMIT", defaults.default_row_limit)?,
            max_query_results: parse_or(&lookup, "MAX_QUERY_RESULTS", defaults.max_query_results)?,
            prompt_char_ceiling: parse_or(
                &lookup,
                "PROMPT_CHAR_CEILING",
                defaults.prompt_char_ceiling,
            )?,
            statement_timeout: Duration::from_secs(parse_or(
                &lookup,
                "STATEMENT_TIMEOUT_SECS",
                defaults.statement_timeout.as_secs(),
            )?),
            exact_row_counts: parse_or(&lookup, "EXACT_ROW_COUNTS", defaults.exact_row_counts)?,
            llm: LlmConfig {
                api_key: lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()),
                model: lookup("OPENAI_MODEL").unwrap_or(llm_defaults.model),
                base_url: lookup("OPENAI_BASE_URL").unwrap_or(llm_defaults.base_url),
                temperature: parse_or(&lookup, "OPENAI_TEMPERATURE", llm_defaults.temperature)?,
                max_tokens: parse_or(&lookup, "OPENAI_MAX_TOKENS", llm_defaults.max_tokens)?,
                timeout: Duration::from_secs(parse_or(
                    &lookup,
                    "GENERATION_TIMEOUT_SECS",
                    llm_defaults.timeout.as_secs(),
                )?),
            },
            metadata: MetadataTables {
                sample_suffix: lookup("SAMPLE_TABLE_SUFFIX")
                    .unwrap_or(defaults.metadata.sample_suffix),
                ..defaults.metadata
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_tables == 0 {
            return Err(Nl2SqlError::Config("MAX_TABLES must be at least 1".to_string()));
        }
        if self.default_row_limit == 0 {
            return Err(Nl2SqlError::Config("DEFAULT_ROW_LIMIT must be at least 1".to_string()));
        }
        if self.max_query_results == 0 {
            return Err(Nl2SqlError::Config("MAX_QUERY_RESULTS must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Nl2SqlError::Config(format!("{} has invalid value '{}'", key, raw))),
        None => Ok(default),
    }
}
