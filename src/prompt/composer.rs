//! Prompt Composer
//!
//! Renders the selected tables and the question into the text handed to the
//! generator. The prompt is bounded by a character ceiling; when the full
//! rendering is too large, detail is shed step by step. Column lists always
//! survive.

use crate::relevance::SelectionResult;
use crate::schema::{ColumnDescriptor, SchemaSnapshot, TableDescriptor};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use tracing::{debug, warn};

/// Sample rows shown per table at full detail
pub const SAMPLE_ROWS_IN_PROMPT: usize = 2;

/// Descriptions are cut to this many characters on the third step
const SHORT_DESCRIPTION_CHARS: usize = 60;

/// How much of the schema a rendering carries, from richest to leanest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Detail {
    Full,
    NoSamples,
    NoExamples,
    ShortDescriptions,
    NoDescriptions,
}

const LADDER: [Detail; 5] = [
    Detail::Full,
    Detail::NoSamples,
    Detail::NoExamples,
    Detail::ShortDescriptions,
    Detail::NoDescriptions,
];

impl Detail {
    fn samples(self) -> bool {
        self == Detail::Full
    }

    fn examples(self) -> bool {
        self <= Detail::NoSamples
    }

    fn descriptions(self) -> bool {
        self <= Detail::ShortDescriptions
    }

    fn shorten(self) -> bool {
        self == Detail::ShortDescriptions
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposedPrompt {
    pub text: String,
    /// Tables rendered, in selection order
    pub tables: Vec<String>,
    pub detail: Detail,
    /// Still larger than the ceiling after every reduction
    pub over_budget: bool,
}

impl ComposedPrompt {
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

#[derive(Debug, Clone)]
pub struct PromptComposer {
    char_ceiling: usize,
    row_limit: u64,
}

impl PromptComposer {
    pub fn new(char_ceiling: usize, row_limit: u64) -> Self {
        Self { char_ceiling, row_limit }
    }

    pub fn compose(
        &self,
        question: &str,
        selection: &SelectionResult,
        snapshot: &SchemaSnapshot,
    ) -> ComposedPrompt {
        let tables: Vec<&TableDescriptor> = selection
            .tables
            .iter()
            .filter_map(|name| {
                let table = snapshot.table(name);
                if table.is_none() {
                    warn!(
                        "Selected table '{}' is not in schema version {}",
                        name, snapshot.version
                    );
                }
                table
            })
            .collect();
        let names: Vec<String> = tables.iter().map(|t| t.name.clone()).collect();

        for detail in LADDER {
            let text = self.render(question, &tables, selection, detail);
            let size = text.chars().count();
            if size <= self.char_ceiling {
                debug!(
                    "Prompt rendered at {:?}: {} chars for {} tables",
                    detail,
                    size,
                    names.len()
                );
                return ComposedPrompt {
                    text,
                    tables: names,
                    detail,
                    over_budget: false,
                };
            }
        }

        let text = self.render(question, &tables, selection, Detail::NoDescriptions);
        warn!(
            "Prompt is {} chars after every reduction, ceiling is {}",
            text.chars().count(),
            self.char_ceiling
        );
        ComposedPrompt {
            text,
            tables: names,
            detail: Detail::NoDescriptions,
            over_budget: true,
        }
    }

    fn render(
        &self,
        question: &str,
        tables: &[&TableDescriptor],
        selection: &SelectionResult,
        detail: Detail,
    ) -> String {
        let mut out = String::new();
        out.push_str(
            "You are an expert SQL query generator. Convert the natural language question \
             into a single read-only SQLite query.\n\n",
        );
        out.push_str("Database Schema Information:\n");
        out.push_str(&"=".repeat(50));
        out.push('\n');

        if tables.len() < selection.total_tables {
            let _ = writeln!(
                out,
                "Note: Showing {} most relevant tables out of {} total tables.",
                tables.len(),
                selection.total_tables
            );
        }

        for table in tables {
            render_table(&mut out, table, detail);
        }

        out.push_str("\nRules:\n");
        out.push_str("1. Generate ONLY the SQL query, no explanations\n");
        out.push_str("2. Use only the tables and columns listed above\n");
        out.push_str("3. Only SELECT statements are allowed; never modify data\n");
        let _ = writeln!(out, "4. Include a LIMIT clause (max {} rows)", self.row_limit);
        out.push_str(
            "5. Join tables through the listed references when the question spans several tables\n",
        );
        out.push_str("6. Use table and column descriptions to understand business context\n");
        let _ = write!(out, "\nQuestion: {}\n\nSQL Query:", question);
        out
    }
}

fn render_table(out: &mut String, table: &TableDescriptor, detail: Detail) {
    let _ = writeln!(out, "\nTable: {}", table.name);
    if detail.descriptions() {
        if let Some(description) = &table.description {
            let _ = writeln!(out, "Description: {}", shown(description, detail));
        }
    }
    out.push_str(&"-".repeat(30));
    out.push_str("\nColumns:\n");

    for column in &table.columns {
        render_column(out, table, column, detail);
    }

    if detail.samples() && !table.sample_rows.is_empty() {
        out.push_str("Sample Data:\n");
        for (i, row) in table.sample_rows.iter().take(SAMPLE_ROWS_IN_PROMPT).enumerate() {
            let rendered = serde_json::to_string(row).unwrap_or_default();
            let _ = writeln!(out, "  Row {}: {}", i + 1, rendered);
        }
    }
}

fn render_column(
    out: &mut String,
    table: &TableDescriptor,
    column: &ColumnDescriptor,
    detail: Detail,
) {
    let data_type = if column.data_type.is_empty() {
        "ANY"
    } else {
        column.data_type.as_str()
    };
    let nullable = if column.nullable { "NULL" } else { "NOT NULL" };
    let _ = write!(out, "  - {}: {} {}", column.name, data_type, nullable);
    if column.primary_key {
        out.push_str(" (PRIMARY KEY)");
    }
    if let Some(fk) = table.foreign_key_for(&column.name) {
        let _ = write!(out, " (REFERENCES {}.{})", fk.target_table, fk.target_column);
    }
    out.push('\n');

    if detail.descriptions() {
        if let Some(description) = &column.description {
            let _ = writeln!(out, "    Description: {}", shown(description, detail));
        }
        if let Some(meaning) = &column.business_meaning {
            let _ = writeln!(out, "    Business Meaning: {}", shown(meaning, detail));
        }
    }
    if detail.examples() {
        if let Some(examples) = &column.examples {
            let _ = writeln!(out, "    Examples: {}", examples);
        }
    }
}

fn shown(text: &str, detail: Detail) -> String {
    if detail.shorten() {
        truncate_chars(text, SHORT_DESCRIPTION_CHARS)
    } else {
        text.to_string()
    }
}

/// First `max` characters of `text`, with an ellipsis when cut
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max).collect();
    cut.push_str("...");
    cut
}
