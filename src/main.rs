use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use nl2sql::llm::{OpenAiGenerator, SqlGenerator, StaticGenerator};
use nl2sql::seed::create_demo_database;
use nl2sql::{AppConfig, QueryOutcome, SqliteExecutor, TextToSqlService};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nl2sql")]
#[command(about = "Ask questions of a SQLite database in plain English")]
struct Args {
    /// SQLite database (or set DATABASE_PATH)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// LIMIT added to queries without one (or set DEFAULT_ROW_LIMIT)
    #[arg(long, global = true)]
    row_limit: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate, validate and run SQL for a question
    Ask {
        question: String,

        /// Use this reply instead of calling the generation API
        #[arg(long)]
        reply: Option<String>,
    },
    /// Show which tables would be sent to the generator
    Tables {
        question: String,

        #[arg(short, long)]
        budget: Option<usize>,
    },
    /// Check a SQL statement against the safety rules
    Validate { sql: String },
    /// Summarize the schema catalog and mock sample coverage
    Schema {
        /// Print DDL for the missing mock sample tables instead
        #[arg(long)]
        mock_script: bool,
    },
    /// Create the demo shop database
    Seed { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = AppConfig::from_env().context("invalid configuration")?;
    if let Some(path) = args.database {
        config.database_path = path;
    }
    if let Some(limit) = args.row_limit {
        config.default_row_limit = limit;
    }
    config.validate()?;

    match args.command {
        Command::Seed { path } => {
            create_demo_database(&path, &config.metadata)?;
            println!("Demo database created: {}", path.display());
        }
        Command::Ask { question, reply } => {
            let outcome = match (reply, config.llm.api_key.is_some()) {
                (Some(reply), _) => ask(config, StaticGenerator::new(reply), &question).await,
                (None, true) => {
                    let generator = OpenAiGenerator::new(config.llm.clone())?;
                    ask(config, generator, &question).await
                }
                (None, false) => bail!("set OPENAI_API_KEY or pass --reply"),
            };
            print_json(&outcome)?;
            if !outcome.is_answered() {
                std::process::exit(1);
            }
        }
        Command::Tables { question, budget } => {
            let budget = budget.unwrap_or(config.max_tables);
            let service = offline_service(config)?;
            print_json(&service.select_relevant_tables(&question, budget)?)?;
        }
        Command::Validate { sql } => {
            let service = offline_service(config)?;
            let verdict = service.validate_against_schema(&sql)?;
            print_json(&verdict)?;
            if !verdict.accepted {
                std::process::exit(1);
            }
        }
        Command::Schema { mock_script } => {
            let service = offline_service(config)?;
            if mock_script {
                print!("{}", service.mock_setup_script()?);
            } else {
                print_json(&service.schema_report()?)?;
            }
        }
    }

    Ok(())
}

async fn ask<G: SqlGenerator>(config: AppConfig, generator: G, question: &str) -> QueryOutcome {
    info!("Database: {}", config.database_path.display());
    let service = TextToSqlService::sqlite(config, generator);
    service.ask(question).await
}

/// Service for commands that never call the generator
fn offline_service(config: AppConfig) -> Result<TextToSqlService<StaticGenerator, SqliteExecutor>> {
    if !config.database_path.exists() {
        bail!(
            "database {} not found (run `nl2sql seed <path>` to create a demo)",
            config.database_path.display()
        );
    }
    Ok(TextToSqlService::sqlite(config, StaticGenerator::default()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
