use nl2sql::db::open_read_write;
use nl2sql::seed::create_demo_database;
use nl2sql::{
    AppConfig, MetadataTables, PromptComposer, QueryOutcome, RejectionReason, SqliteExecutor,
    StaticGenerator, TextToSqlService,
};
use serde_json::json;
use std::path::PathBuf;
use tempfile::TempDir;

fn demo_db() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shop.db");
    create_demo_database(&path, &MetadataTables::default()).unwrap();
    (dir, path)
}

type DemoService = TextToSqlService<StaticGenerator, SqliteExecutor>;

fn service_with(path: &PathBuf, reply: &str, config: AppConfig) -> DemoService {
    let config = AppConfig {
        database_path: path.clone(),
        ..config
    };
    TextToSqlService::sqlite(config, StaticGenerator::new(reply))
}

fn service(path: &PathBuf, reply: &str) -> DemoService {
    service_with(path, reply, AppConfig::default())
}

#[tokio::test]
async fn test_most_expensive_products_end_to_end() {
    let (_dir, path) = demo_db();
    let service = service(
        &path,
        "```sql\nSELECT product_name, price\nFROM products\nORDER BY price DESC\nLIMIT 5;\n```",
    );

    match service.ask("What are the top 5 most expensive products?").await {
        QueryOutcome::Answered {
            sql,
            limit_injected,
            selection,
            result,
            ..
        } => {
            assert_eq!(sql, "SELECT product_name, price FROM products ORDER BY price DESC LIMIT 5");
            assert!(!limit_injected);
            assert_eq!(selection.total_tables, 5);
            assert_eq!(result.row_count, 5);
            assert_eq!(result.columns, vec!["product_name", "price"]);
            assert_eq!(result.rows[0]["product_name"], json!("MacBook Pro"));
            assert!(!result.truncated);
        }
        other => panic!("expected an answer, got {:?}", other),
    }
}

#[tokio::test]
async fn test_mock_table_references_run_against_real_tables() {
    let (_dir, path) = demo_db();
    let service = service(&path, "SELECT COUNT(*) AS n FROM users_sample");

    match service.ask("How many users are there?").await {
        QueryOutcome::Answered { sql, result, .. } => {
            assert_eq!(sql, "SELECT COUNT(*) AS n FROM users LIMIT 100");
            assert_eq!(result.rows[0]["n"], json!(4));
        }
        other => panic!("expected an answer, got {:?}", other),
    }
}

#[tokio::test]
async fn test_only_the_first_statement_is_ever_run() {
    let (_dir, path) = demo_db();
    let service = service(&path, "SELECT username FROM users; DROP TABLE users;");

    let outcome = service.ask("list usernames").await;
    assert!(outcome.is_answered(), "{:?}", outcome);

    let conn = open_read_write(&path).unwrap();
    let users: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0)).unwrap();
    assert_eq!(users, 4);
}

#[tokio::test]
async fn test_row_ceiling_applies_after_injected_limit() {
    let (_dir, path) = demo_db();
    let config = AppConfig {
        max_query_results: 2,
        ..AppConfig::default()
    };
    let service = service_with(&path, "SELECT * FROM order_items", config);

    match service.ask("show every order line").await {
        QueryOutcome::Answered { result, limit_injected, .. } => {
            assert!(limit_injected);
            assert_eq!(result.row_count, 2);
            assert!(result.truncated);
        }
        other => panic!("expected an answer, got {:?}", other),
    }
}

#[tokio::test]
async fn test_generator_reply_without_sql_is_a_structured_failure() {
    let (_dir, path) = demo_db();
    let service = service(&path, "Sorry, I can only answer questions about the shop.");

    match service.ask("what's the weather?").await {
        QueryOutcome::Failed {
            stage, suggestion, sql, ..
        } => {
            assert_eq!(stage, "validation");
            assert!(sql.is_none());
            assert_eq!(suggestion.as_deref(), Some(RejectionReason::Unparseable.suggestion()));
        }
        other => panic!("expected a failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_execution_errors_are_reported_with_sql() {
    let (_dir, path) = demo_db();
    let service = service(&path, "SELECT revenue FROM orders");

    match service.ask("total revenue").await {
        QueryOutcome::Failed { stage, sql, error, .. } => {
            assert_eq!(stage, "execution");
            assert_eq!(sql.as_deref(), Some("SELECT revenue FROM orders LIMIT 100"));
            assert!(error.contains("revenue"));
        }
        other => panic!("expected a failure, got {:?}", other),
    }
}

#[test]
fn test_validate_sql_public_surface() {
    let (_dir, path) = demo_db();
    let service = service(&path, "");
    let known = service.catalog().current().unwrap().table_names();

    let verdict = service.validate_sql("Drop TABLE users", &known);
    assert_eq!(verdict.reason, Some(RejectionReason::NotReadOnly));

    let verdict = service.validate_sql("SELECT 1; DROP TABLE users", &known);
    assert_eq!(verdict.reason, Some(RejectionReason::MultipleStatements));

    let verdict = service.validate_sql("SELECT * FROM column_descriptions", &known);
    assert_eq!(verdict.reason, Some(RejectionReason::ReferencesUnknownTable));

    let verdict = service.validate_sql("select * from USERS", &known);
    assert!(verdict.accepted);
    assert_eq!(verdict.sql.as_deref(), Some("select * from USERS LIMIT 100"));
}

#[test]
fn test_select_relevant_tables_with_small_budget() {
    let (_dir, path) = demo_db();
    let service = service(&path, "");

    let selection = service.select_relevant_tables("total revenue by category", 2).unwrap();
    assert_eq!(selection.tables.len(), 2);
    assert_eq!(selection.tables[0], "categories");
    assert!(selection.truncated);
    assert!(!selection.fallback);
    assert_eq!(selection.total_tables, 5);

    let everything = service.select_relevant_tables("anything", 10).unwrap();
    assert_eq!(everything.tables.len(), 5);
    assert!(!everything.truncated);

    assert!(service.select_relevant_tables("users", 0).is_err());
}

#[test]
fn test_catalog_joins_metadata_and_excludes_bookkeeping() {
    let (_dir, path) = demo_db();
    let service = service(&path, "");
    let snapshot = service.catalog().current().unwrap();

    assert_eq!(
        snapshot.table_names().into_iter().collect::<Vec<_>>(),
        vec!["categories", "order_items", "orders", "products", "users"]
    );
    let products = snapshot.table("products").unwrap();
    assert!(products.description.as_deref().unwrap().contains("Product catalog"));
    let price = products.column("price").unwrap();
    assert_eq!(price.description.as_deref(), Some("Product price in USD"));
    assert_eq!(price.examples.as_deref(), Some("999.99, 19.99"));
    assert_eq!(products.foreign_keys[0].target_table, "categories");
    assert_eq!(products.row_count, Some(5));
    assert_eq!(snapshot.missing_samples, vec!["order_items"]);
}

#[test]
fn test_prompt_shows_mock_rows_not_real_rows() {
    let (_dir, path) = demo_db();
    let service = service(&path, "");
    let snapshot = service.catalog().current().unwrap();
    let selection = service.select_relevant_tables("most expensive products", 5).unwrap();

    let composer = PromptComposer::new(100_000, 100);
    let prompt = composer.compose("most expensive products", &selection, &snapshot);
    assert!(prompt.text.contains("Sample Phone"));
    assert!(!prompt.text.contains("Samsung Galaxy"));
    assert!(!prompt.text.contains("products_sample"));
}

#[test]
fn test_refresh_publishes_new_version_and_keeps_old_readers() {
    let (_dir, path) = demo_db();
    let service = service(&path, "");
    let before = service.catalog().current().unwrap();

    let conn = open_read_write(&path).unwrap();
    conn.execute_batch("CREATE TABLE suppliers (supplier_id INTEGER PRIMARY KEY, name TEXT);")
        .unwrap();
    drop(conn);

    let after = service.refresh_schema().unwrap();
    assert!(after.version > before.version);
    assert!(after.table("suppliers").is_some());
    assert!(before.table("suppliers").is_none());
    assert_eq!(service.catalog().current().unwrap().version, after.version);
}

#[test]
fn test_schema_report_and_mock_script() {
    let (_dir, path) = demo_db();
    let service = service(&path, "");

    let report = service.schema_report().unwrap();
    assert_eq!(report.table_count, 5);
    assert_eq!(report.missing_samples, vec!["order_items"]);
    assert_eq!(report.sample_coverage_percent, 80.0);

    let script = service.mock_setup_script().unwrap();
    assert!(script.contains("CREATE TABLE \"order_items_sample\""));
    assert!(!script.contains("\"users_sample\""));
}
