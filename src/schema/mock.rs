//! DDL templates for mock sample tables
//!
//! The generator only ever sees rows from `<table><suffix>` relations. For
//! tables that lack one, these helpers emit a script the operator can fill
//! with fictional rows.

use crate::db::quote_ident;
use crate::schema::types::{SchemaSnapshot, TableDescriptor};
use std::fmt::Write;

/// `CREATE TABLE` statement for the mock counterpart of `table`
pub fn mock_table_ddl(table: &TableDescriptor, suffix: &str) -> String {
    let mock = format!("{}{}", table.name, suffix);
    let columns: Vec<String> = table
        .columns
        .iter()
        .map(|col| {
            let mut def = format!("    {}", quote_ident(&col.name));
            if !col.data_type.is_empty() {
                def.push(' ');
                def.push_str(&col.data_type);
            }
            if !col.nullable {
                def.push_str(" NOT NULL");
            }
            if let Some(default) = &col.default_value {
                def.push_str(" DEFAULT ");
                def.push_str(default);
            }
            if col.primary_key {
                def.push_str(" PRIMARY KEY");
            }
            def
        })
        .collect();

    let mut out = String::new();
    let _ = writeln!(out, "-- Mock table for {}", table.name);
    let _ = writeln!(out, "CREATE TABLE {} (\n{}\n);", quote_ident(&mock), columns.join(",\n"));
    let _ = writeln!(out, "-- Replace with fictional rows; real data must never be copied here");
    let _ = writeln!(out, "-- INSERT INTO {} VALUES (...);", quote_ident(&mock));
    out
}

/// Script creating every missing mock table of `snapshot`
pub fn mock_setup_script(snapshot: &SchemaSnapshot, suffix: &str) -> String {
    if snapshot.missing_samples.is_empty() {
        return "-- Every table has a mock sample table\n".to_string();
    }
    snapshot
        .missing_samples
        .iter()
        .filter_map(|name| snapshot.table(name))
        .map(|table| mock_table_ddl(table, suffix))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnDescriptor;
    use rusqlite::Connection;
    use std::time::Duration;

    fn orders() -> TableDescriptor {
        let mut id = ColumnDescriptor::new("order_id", "INTEGER");
        id.primary_key = true;
        let mut status = ColumnDescriptor::new("status", "TEXT");
        status.nullable = false;
        status.default_value = Some("'pending'".to_string());
        TableDescriptor::new("orders", vec![id, status])
    }

    #[test]
    fn test_ddl_is_valid_sqlite() {
        let ddl = mock_table_ddl(&orders(), "_sample");
        assert!(ddl.contains("CREATE TABLE \"orders_sample\""));
        assert!(ddl.contains("\"status\" TEXT NOT NULL DEFAULT 'pending'"));

        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(&ddl).unwrap();
        conn.execute("INSERT INTO orders_sample (order_id) VALUES (1)", []).unwrap();
    }

    #[test]
    fn test_setup_script_covers_missing_tables_only() {
        let missing = vec!["orders".to_string()];
        let snapshot = SchemaSnapshot::assemble(vec![orders()], 1, Duration::ZERO, missing).0;
        let script = mock_setup_script(&snapshot, "_sample");
        assert!(script.contains("orders_sample"));

        let complete = SchemaSnapshot::assemble(vec![orders()], 1, Duration::ZERO, vec![]).0;
        assert!(!mock_setup_script(&complete, "_sample").contains("CREATE TABLE"));
    }
}
