use crate::validation::RejectionReason;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Nl2SqlError {
    #[error("Schema build error: {0}")]
    SchemaBuild(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Query rejected ({reason}): {detail}")]
    Validation {
        reason: RejectionReason,
        detail: String,
    },

    #[error("Execution error: {message} (sql: {sql})")]
    Execution { sql: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Nl2SqlError {
    /// Pipeline stage the error belongs to, used in structured outcomes.
    pub fn stage(&self) -> &'static str {
        match self {
            Nl2SqlError::SchemaBuild(_) => "schema",
            Nl2SqlError::Generation(_) => "generation",
            Nl2SqlError::Validation { .. } => "validation",
            Nl2SqlError::Execution { .. } => "execution",
            Nl2SqlError::Config(_) => "config",
            Nl2SqlError::InvalidArgument(_) => "input",
            Nl2SqlError::Database(_) | Nl2SqlError::Io(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, Nl2SqlError>;
