//! Query Validator
//!
//! Structural safety check for generated SQL. Rules run in a fixed order and
//! stop at the first failure:
//!
//! 1. exactly one statement
//! 2. leading keyword is a read-only selector
//! 3. no disallowed keyword or function anywhere
//! 4. every referenced table is known
//! 5. a top-level LIMIT exists (injected when missing, clamped when too large)
//!
//! Semantic correctness is left to the database.

use crate::error::{Nl2SqlError, Result};
use crate::validation::lexer::{tokenize, Token, TokenKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::ops::Range;
use strsim::jaro_winkler;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectionReason {
    NotReadOnly,
    MultipleStatements,
    DisallowedKeyword,
    /// Part of the taxonomy; a missing limit is normalized instead of rejected
    MissingRowLimit,
    Unparseable,
    ReferencesUnknownTable,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::NotReadOnly => "not-read-only",
            RejectionReason::MultipleStatements => "multiple-statements",
            RejectionReason::DisallowedKeyword => "disallowed-keyword",
            RejectionReason::MissingRowLimit => "missing-row-limit",
            RejectionReason::Unparseable => "unparseable",
            RejectionReason::ReferencesUnknownTable => "references-unknown-table",
        }
    }

    /// Human-readable hint shown next to the rejection
    pub fn suggestion(&self) -> &'static str {
        match self {
            RejectionReason::NotReadOnly => {
                "Only read queries are permitted; ask a question that reads data."
            }
            RejectionReason::MultipleStatements => {
                "Only a single SQL statement can be run per question."
            }
            RejectionReason::DisallowedKeyword => {
                "The query used an operation that is not allowed \
                 (schema changes, attachments, pragmas)."
            }
            RejectionReason::MissingRowLimit => "Add a LIMIT clause to bound the result size.",
            RejectionReason::Unparseable => {
                "No SQL statement could be read; try rephrasing the question."
            }
            RejectionReason::ReferencesUnknownTable => {
                "The query referenced a table that does not exist; \
                 mention the table name explicitly."
            }
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub accepted: bool,
    pub reason: Option<RejectionReason>,
    /// Offending keyword, table name or parse message
    pub detail: Option<String>,
    /// Normalized SQL, present only on acceptance
    pub sql: Option<String>,
    pub limit_injected: bool,
}

impl ValidationVerdict {
    fn accept(sql: String, limit_injected: bool) -> Self {
        Self {
            accepted: true,
            reason: None,
            detail: None,
            sql: Some(sql),
            limit_injected,
        }
    }

    fn reject(reason: RejectionReason, detail: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reason: Some(reason),
            detail: Some(detail.into()),
            sql: None,
            limit_injected: false,
        }
    }

    pub fn suggestion(&self) -> Option<&'static str> {
        self.reason.map(|r| r.suggestion())
    }

    /// Accepted SQL, or the rejection as an error
    pub fn into_result(self) -> Result<String> {
        match (self.accepted, self.sql, self.reason) {
            (true, Some(sql), _) => Ok(sql),
            (_, _, reason) => Err(Nl2SqlError::Validation {
                reason: reason.unwrap_or(RejectionReason::Unparseable),
                detail: self.detail.unwrap_or_default(),
            }),
        }
    }
}

const READ_ONLY_LEADERS: &[&str] = &["SELECT", "WITH", "EXPLAIN"];

const MUTATING_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE", "REPLACE", "UPSERT",
    "GRANT", "REVOKE", "MERGE",
];

const AUXILIARY_KEYWORDS: &[&str] = &[
    "ATTACH", "DETACH", "PRAGMA", "VACUUM", "REINDEX", "ANALYZE", "BEGIN", "COMMIT", "ROLLBACK",
    "SAVEPOINT", "RELEASE",
];

/// Functions with side effects outside the query result
const DISALLOWED_FUNCTIONS: &[&str] =
    &["LOAD_EXTENSION", "WRITEFILE", "READFILE", "EDIT", "FTS3_TOKENIZER"];

/// Keywords that can never be a bare table name or alias
const RESERVED: &[&str] = &[
    "ALL", "AND", "AS", "ASC", "BETWEEN", "BY", "CASE", "CAST", "COLLATE", "CROSS", "DESC",
    "DISTINCT", "ELSE", "END", "EXCEPT", "EXISTS", "FILTER", "FROM", "FULL", "GLOB", "GROUP",
    "HAVING", "IN", "INDEXED", "INNER", "INTERSECT", "IS", "JOIN", "LEFT", "LIKE", "LIMIT",
    "MATERIALIZED", "NATURAL", "NOT", "NULL", "OFFSET", "ON", "OR", "ORDER", "OUTER", "OVER",
    "PARTITION", "RECURSIVE", "RIGHT", "SELECT", "THEN", "UNION", "USING", "VALUES", "WHEN",
    "WHERE", "WINDOW", "WITH",
];

/// Clause keywords that end a FROM list
const FROM_TERMINATORS: &[&str] = &[
    "WHERE", "GROUP", "HAVING", "ORDER", "LIMIT", "UNION", "INTERSECT", "EXCEPT", "WINDOW", "ON",
    "USING", "JOIN", "INNER", "LEFT", "RIGHT", "FULL", "CROSS", "NATURAL", "OUTER",
];

#[derive(Debug, Clone)]
pub struct QueryValidator {
    default_row_limit: u64,
}

impl QueryValidator {
    pub fn new(default_row_limit: u64) -> Self {
        Self {
            default_row_limit: default_row_limit.max(1),
        }
    }

    pub fn validate(&self, sql_text: &str, known_tables: &BTreeSet<String>) -> ValidationVerdict {
        let verdict = self.run(sql_text, known_tables);
        match (&verdict.reason, &verdict.detail) {
            (Some(reason), detail) => warn!("Rejected SQL ({}): {:?}", reason, detail),
            (None, _) => debug!("Accepted SQL: {:?}", verdict.sql),
        }
        verdict
    }

    fn run(&self, sql_text: &str, known_tables: &BTreeSet<String>) -> ValidationVerdict {
        let tokens = match tokenize(sql_text) {
            Ok(tokens) => tokens,
            Err(e) => return ValidationVerdict::reject(RejectionReason::Unparseable, e.to_string()),
        };

        // Rule 1: a single statement, optionally followed by one terminator
        let semicolons: Vec<usize> = tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| t.kind == TokenKind::Semicolon)
            .map(|(i, _)| i)
            .collect();
        match semicolons.as_slice() {
            [] => {}
            [only] if *only == tokens.len() - 1 => {}
            _ => {
                return ValidationVerdict::reject(
                    RejectionReason::MultipleStatements,
                    format!("{} statement terminators found", semicolons.len()),
                )
            }
        }
        let body: &[Token] = match tokens.last() {
            Some(last) if last.kind == TokenKind::Semicolon => &tokens[..tokens.len() - 1],
            _ => &tokens,
        };
        if body.is_empty() {
            return ValidationVerdict::reject(RejectionReason::Unparseable, "empty statement");
        }

        let depths = match paren_depths(body) {
            Some(depths) => depths,
            None => {
                return ValidationVerdict::reject(
                    RejectionReason::Unparseable,
                    "unbalanced parentheses",
                )
            }
        };

        // Rule 2: read-only leader
        if let Some(verdict) = check_leader(body) {
            return verdict;
        }

        // Rule 3: disallowed keywords anywhere
        for (i, token) in body.iter().enumerate() {
            if token.kind != TokenKind::Word {
                continue;
            }
            let upper = token.upper();
            let called = body.get(i + 1).is_some_and(|n| n.is_symbol("("));
            // REPLACE(x, y, z) is the string function
            if upper == "REPLACE" && called {
                continue;
            }
            if MUTATING_KEYWORDS.contains(&upper.as_str())
                || AUXILIARY_KEYWORDS.contains(&upper.as_str())
            {
                return ValidationVerdict::reject(RejectionReason::DisallowedKeyword, upper);
            }
            if called && DISALLOWED_FUNCTIONS.contains(&upper.as_str()) {
                return ValidationVerdict::reject(RejectionReason::DisallowedKeyword, upper);
            }
        }

        // Rule 4: table references resolve
        let references = match table_references(body) {
            Ok(references) => references,
            Err(detail) => return ValidationVerdict::reject(RejectionReason::Unparseable, detail),
        };
        let ctes = cte_names(body);
        let known: HashSet<String> = known_tables
            .iter()
            .map(|t| t.to_lowercase())
            .chain(ctes.iter().cloned())
            .collect();
        for reference in &references {
            if !known.contains(&reference.to_lowercase()) {
                let detail = match closest_table(reference, known_tables) {
                    Some(guess) => format!("{} (did you mean {}?)", reference, guess),
                    None => reference.clone(),
                };
                return ValidationVerdict::reject(RejectionReason::ReferencesUnknownTable, detail);
            }
        }

        // Rule 5: bound the result
        let (sql, injected) = self.apply_limit(sql_text, body, &depths);
        ValidationVerdict::accept(sql, injected)
    }

    fn apply_limit(&self, source: &str, body: &[Token], depths: &[usize]) -> (String, bool) {
        let limit_at = body
            .iter()
            .enumerate()
            .rposition(|(i, t)| depths[i] == 0 && t.is_keyword("LIMIT"));

        let mut replacement: Option<(Range<usize>, String)> = None;
        if let Some(at) = limit_at {
            let count = limit_count_span(body, depths, at);
            if !count.is_empty() && !self.count_is_bounded(&body[count.clone()]) {
                let text = span_text(source, &body[count.clone()]);
                debug!("Clamping LIMIT {} to {}", text, self.default_row_limit);
                replacement = Some((count, self.default_row_limit.to_string()));
            }
        }

        let mut sql = String::with_capacity(source.len() + 16);
        for (i, token) in body.iter().enumerate() {
            let replaced = replacement.as_ref().filter(|(span, _)| span.contains(&i));
            if replaced.is_some_and(|(span, _)| i != span.start) {
                continue;
            }
            if i > 0 && token.start > body[i - 1].end {
                sql.push(' ');
            }
            match replaced {
                Some((_, text)) => sql.push_str(text),
                None => sql.push_str(&source[token.start..token.end]),
            }
        }

        if limit_at.is_some() {
            (sql, false)
        } else {
            sql.push_str(&format!(" LIMIT {}", self.default_row_limit));
            (sql, true)
        }
    }

    /// A literal count within the ceiling, or a bound parameter
    fn count_is_bounded(&self, count: &[Token]) -> bool {
        match count {
            [open, inner @ .., close] if open.is_symbol("(") && close.is_symbol(")") => {
                skip_group(count, 0) == Some(count.len()) && self.count_is_bounded(inner)
            }
            [param] if param.is_symbol("?") => true,
            [n] => self.within_ceiling(n),
            [sign, n] if sign.is_symbol("+") => self.within_ceiling(n),
            [param, n] => param.is_symbol("?") && n.kind == TokenKind::Number,
            _ => false,
        }
    }

    fn within_ceiling(&self, count: &Token) -> bool {
        count.kind == TokenKind::Number
            && count.text.parse::<u64>().is_ok_and(|n| n <= self.default_row_limit)
    }
}

/// Token range of the row count in `LIMIT n [OFFSET m]` or `LIMIT m, n`
fn limit_count_span(body: &[Token], depths: &[usize], limit_at: usize) -> Range<usize> {
    let first = limit_at + 1;
    let stop = (first..body.len())
        .find(|&i| depths[i] == 0 && (body[i].is_symbol(",") || body[i].is_keyword("OFFSET")))
        .unwrap_or(body.len());
    if body.get(stop).is_some_and(|t| t.is_symbol(",")) {
        stop + 1..body.len()
    } else {
        first..stop
    }
}

fn span_text<'a>(source: &'a str, tokens: &[Token]) -> &'a str {
    match (tokens.first(), tokens.last()) {
        (Some(first), Some(last)) => &source[first.start..last.end],
        _ => "",
    }
}

/// Parenthesis depth before each token; `None` when unbalanced
fn paren_depths(tokens: &[Token]) -> Option<Vec<usize>> {
    let mut depth: usize = 0;
    let mut depths = Vec::with_capacity(tokens.len());
    for token in tokens {
        if token.is_symbol(")") {
            depth = depth.checked_sub(1)?;
        }
        depths.push(depth);
        if token.is_symbol("(") {
            depth += 1;
        }
    }
    (depth == 0).then_some(depths)
}

fn check_leader(body: &[Token]) -> Option<ValidationVerdict> {
    let first = body.iter().position(|t| !t.is_symbol("("))?;
    let leader = &body[first];
    let upper = leader.upper();

    if leader.kind != TokenKind::Word || !READ_ONLY_LEADERS.contains(&upper.as_str()) {
        let shown = if leader.kind == TokenKind::Word { upper } else { leader.text.clone() };
        return Some(ValidationVerdict::reject(RejectionReason::NotReadOnly, shown));
    }

    if upper == "EXPLAIN" {
        let mut next = first + 1;
        if body.get(next).is_some_and(|t| t.is_keyword("QUERY"))
            && body.get(next + 1).is_some_and(|t| t.is_keyword("PLAN"))
        {
            next += 2;
        }
        match body.get(next) {
            Some(t) if t.is_keyword("SELECT") || t.is_keyword("WITH") => {}
            Some(t) => {
                return Some(ValidationVerdict::reject(
                    RejectionReason::NotReadOnly,
                    format!("EXPLAIN {}", t.upper()),
                ))
            }
            None => {
                return Some(ValidationVerdict::reject(
                    RejectionReason::Unparseable,
                    "EXPLAIN without a statement",
                ))
            }
        }
    }
    None
}

fn is_identifier(token: &Token) -> bool {
    match token.kind {
        TokenKind::QuotedIdent => true,
        TokenKind::Word => !RESERVED.contains(&token.upper().as_str()),
        _ => false,
    }
}

/// Names defined by `name [(cols)] AS [NOT] [MATERIALIZED] (` in a WITH clause
fn cte_names(body: &[Token]) -> Vec<String> {
    let mut names = Vec::new();
    for (i, token) in body.iter().enumerate() {
        if !is_identifier(token) {
            continue;
        }
        let mut j = i + 1;
        if body.get(j).is_some_and(|t| t.is_symbol("(")) {
            match skip_group(body, j) {
                Some(after) => j = after,
                None => continue,
            }
        }
        if !body.get(j).is_some_and(|t| t.is_keyword("AS")) {
            continue;
        }
        j += 1;
        while body.get(j).is_some_and(|t| t.is_keyword("NOT") || t.is_keyword("MATERIALIZED")) {
            j += 1;
        }
        if body.get(j).is_some_and(|t| t.is_symbol("(")) {
            names.push(token.text.to_lowercase());
        }
    }
    names
}

/// Index just past the `)` matching the `(` at `open`
fn skip_group(body: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, token) in body[open..].iter().enumerate() {
        if token.is_symbol("(") {
            depth += 1;
        } else if token.is_symbol(")") {
            depth -= 1;
            if depth == 0 {
                return Some(open + offset + 1);
            }
        }
    }
    None
}

/// Tables named after FROM / JOIN, including comma-separated FROM lists.
/// Subqueries and table-valued functions are skipped; their inner FROM
/// clauses are picked up on their own.
fn table_references(body: &[Token]) -> std::result::Result<Vec<String>, String> {
    let mut references = Vec::new();
    let mut i = 0;

    while i < body.len() {
        let token = &body[i];
        let opens_list = token.is_keyword("FROM") || token.is_keyword("JOIN");
        if !opens_list || is_distinct_from(body, i) {
            i += 1;
            continue;
        }
        let in_from = token.is_keyword("FROM");
        i += 1;

        loop {
            let Some(current) = body.get(i) else {
                return Err(format!("{} without a table", token.upper()));
            };

            if current.is_symbol("(") {
                // subquery: its contents are scanned by the outer loop
                i += 1;
                break;
            }

            if !is_identifier(current) {
                return Err(format!(
                    "expected a table after {}, found '{}'",
                    token.upper(),
                    current.text
                ));
            }

            // schema.table keeps the last part
            let mut name = current.text.clone();
            i += 1;
            while body.get(i).is_some_and(|t| t.is_symbol(".")) {
                match body.get(i + 1) {
                    Some(part) if is_identifier(part) => {
                        name = part.text.clone();
                        i += 2;
                    }
                    _ => return Err(format!("dangling qualifier after '{}'", name)),
                }
            }

            if body.get(i).is_some_and(|t| t.is_symbol("(")) {
                // table-valued function such as json_each(...)
                i = skip_group(body, i).unwrap_or(body.len());
            } else {
                references.push(name);
            }

            // optional alias
            if body.get(i).is_some_and(|t| t.is_keyword("AS")) {
                i += 1;
            }
            let alias = body.get(i).is_some_and(|t| {
                is_identifier(t) && !FROM_TERMINATORS.contains(&t.upper().as_str())
            });
            if alias {
                i += 1;
            }

            if in_from && body.get(i).is_some_and(|t| t.is_symbol(",")) {
                i += 1;
                continue;
            }
            break;
        }
    }

    Ok(references)
}

/// `x IS [NOT] DISTINCT FROM y` compares values; its FROM names no table
fn is_distinct_from(body: &[Token], from_at: usize) -> bool {
    from_at >= 2
        && body[from_at].is_keyword("FROM")
        && body[from_at - 1].is_keyword("DISTINCT")
        && (body[from_at - 2].is_keyword("IS") || body[from_at - 2].is_keyword("NOT"))
}

fn closest_table<'a>(name: &str, known: &'a BTreeSet<String>) -> Option<&'a String> {
    let lower = name.to_lowercase();
    known
        .iter()
        .map(|t| (t, jaro_winkler(&lower, &t.to_lowercase())))
        .filter(|(_, score)| *score >= 0.85)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(t, _)| t)
}
