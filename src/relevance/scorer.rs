//! Relevance Scorer
//!
//! Ranks tables against a question with a transparent linear model so every
//! selection can be explained. Scores are integers; each contribution is kept
//! with the reason that produced it.

use crate::error::{Nl2SqlError, Result};
use crate::relevance::terms::{identifier_parts, same_word, tokenize};
use crate::schema::{SchemaSnapshot, TableDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Why a table earned points
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScoreReason {
    /// A question term names the table
    TableNameMatch { term: String },
    /// A question term names one part of a compound table name
    TableNamePartMatch { term: String },
    ColumnNameMatch { column: String, term: String },
    /// A term occurs in the table description or in a column description
    DescriptionMatch { target: String, term: String },
    /// Directly related by a foreign key to a high-scoring table
    AdjacencyBoost { via: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub reason: ScoreReason,
    pub weight: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelevanceScore {
    pub table: String,
    pub score: u32,
    pub contributions: Vec<Contribution>,
}

impl RelevanceScore {
    fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            score: 0,
            contributions: Vec::new(),
        }
    }

    fn add(&mut self, reason: ScoreReason, weight: u32) {
        self.score += weight;
        self.contributions.push(Contribution { reason, weight });
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionResult {
    /// Score descending, ties by name ascending; name order on the fast path
    pub tables: Vec<String>,
    pub total_tables: usize,
    pub included: usize,
    /// More tables scored above zero than the budget allowed
    pub truncated: bool,
    /// Nothing matched and the first tables by name were used instead
    pub fallback: bool,
    /// Scores of the included tables, same order as `tables`
    pub scores: Vec<RelevanceScore>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoringWeights {
    pub table_name: u32,
    pub table_name_part: u32,
    pub column_name: u32,
    pub table_description: u32,
    pub column_description: u32,
    pub adjacency: u32,
    /// First-pass score a table needs before its neighbours get boosted
    pub adjacency_threshold: u32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            table_name: 100,
            table_name_part: 50,
            column_name: 30,
            table_description: 10,
            column_description: 5,
            adjacency: 20,
            adjacency_threshold: 50,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RelevanceScorer {
    weights: ScoringWeights,
}

impl RelevanceScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    /// Pick at most `budget` tables relevant to `question`
    pub fn select(
        &self,
        question: &str,
        snapshot: &SchemaSnapshot,
        budget: usize,
    ) -> Result<SelectionResult> {
        if budget == 0 {
            return Err(Nl2SqlError::InvalidArgument(
                "table budget must be at least 1".to_string(),
            ));
        }

        let total_tables = snapshot.len();

        // Small schema: everything fits, skip scoring
        if total_tables <= budget {
            let tables: Vec<String> = snapshot.tables.keys().cloned().collect();
            debug!("Schema has {} tables within budget {}; including all", total_tables, budget);
            return Ok(SelectionResult {
                included: tables.len(),
                tables,
                total_tables,
                truncated: false,
                fallback: false,
                scores: Vec::new(),
            });
        }

        let scores = self.score_all(question, snapshot);

        let mut candidates: Vec<RelevanceScore> =
            scores.into_values().filter(|s| s.score > 0).collect();
        candidates.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.table.cmp(&b.table)));

        if candidates.is_empty() {
            let tables: Vec<String> = snapshot.tables.keys().take(budget).cloned().collect();
            info!(
                "No table matched the question; falling back to the first {} of {} tables",
                tables.len(),
                total_tables
            );
            return Ok(SelectionResult {
                included: tables.len(),
                tables,
                total_tables,
                truncated: false,
                fallback: true,
                scores: Vec::new(),
            });
        }

        let truncated = candidates.len() > budget;
        candidates.truncate(budget);
        let tables: Vec<String> = candidates.iter().map(|s| s.table.clone()).collect();

        info!(
            "Selected {} of {} tables (truncated: {}): {:?}",
            tables.len(),
            total_tables,
            truncated,
            tables
        );

        Ok(SelectionResult {
            included: tables.len(),
            tables,
            total_tables,
            truncated,
            fallback: false,
            scores: candidates,
        })
    }

    /// Score every table, including the adjacency pass
    pub fn score_all(
        &self,
        question: &str,
        snapshot: &SchemaSnapshot,
    ) -> BTreeMap<String, RelevanceScore> {
        let terms = tokenize(question);
        let mut scores: BTreeMap<String, RelevanceScore> = snapshot
            .tables
            .values()
            .map(|table| (table.name.clone(), self.score_table(table, &terms)))
            .collect();

        let high: Vec<String> = scores
            .values()
            .filter(|s| s.score >= self.weights.adjacency_threshold)
            .map(|s| s.table.clone())
            .collect();

        for anchor in &high {
            for neighbour in snapshot.neighbours(anchor) {
                if let Some(score) = scores.get_mut(neighbour) {
                    score.add(
                        ScoreReason::AdjacencyBoost { via: anchor.clone() },
                        self.weights.adjacency,
                    );
                }
            }
        }

        scores
    }

    fn score_table(&self, table: &TableDescriptor, terms: &[String]) -> RelevanceScore {
        let mut score = RelevanceScore::new(&table.name);
        let table_parts = identifier_parts(&table.name);

        for term in terms {
            if same_word(term, &table.name) {
                score.add(
                    ScoreReason::TableNameMatch { term: term.clone() },
                    self.weights.table_name,
                );
            } else if table_parts.len() > 1 && table_parts.iter().any(|p| same_word(term, p)) {
                score.add(
                    ScoreReason::TableNamePartMatch { term: term.clone() },
                    self.weights.table_name_part,
                );
            }

            if let Some(description) = &table.description {
                if description.to_ascii_lowercase().contains(term.as_str()) {
                    score.add(
                        ScoreReason::DescriptionMatch {
                            target: table.name.clone(),
                            term: term.clone(),
                        },
                        self.weights.table_description,
                    );
                }
            }
        }

        for column in &table.columns {
            let parts = identifier_parts(&column.name);
            let name_hit = terms.iter().find(|term| {
                same_word(term, &column.name) || parts.iter().any(|p| same_word(term, p))
            });
            if let Some(term) = name_hit {
                score.add(
                    ScoreReason::ColumnNameMatch {
                        column: column.name.clone(),
                        term: term.clone(),
                    },
                    self.weights.column_name,
                );
            }

            let text = [column.description.as_deref(), column.business_meaning.as_deref()]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ")
                .to_ascii_lowercase();
            if text.is_empty() {
                continue;
            }
            if let Some(term) = terms.iter().find(|term| text.contains(term.as_str())) {
                score.add(
                    ScoreReason::DescriptionMatch {
                        target: format!("{}.{}", table.name, column.name),
                        term: term.clone(),
                    },
                    self.weights.column_description,
                );
            }
        }

        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDescriptor, ForeignKey};
    use std::time::Duration;

    fn table(name: &str, columns: &[&str], fks: &[(&str, &str)]) -> TableDescriptor {
        let mut t = TableDescriptor::new(
            name,
            columns.iter().map(|c| ColumnDescriptor::new(*c, "TEXT")).collect(),
        );
        t.foreign_keys = fks
            .iter()
            .map(|(col, target)| ForeignKey {
                column: col.to_string(),
                target_table: target.to_string(),
                target_column: col.to_string(),
            })
            .collect();
        t
    }

    fn shop() -> SchemaSnapshot {
        let mut products = table(
            "products",
            &["product_id", "name", "price", "category_id"],
            &[("category_id", "categories")],
        );
        products.description = Some("Items for sale with their current price".to_string());
        let tables = vec![
            table("users", &["user_id", "email", "first_name"], &[]),
            products,
            table(
                "orders",
                &["order_id", "user_id", "order_date", "total_amount"],
                &[("user_id", "users")],
            ),
            table(
                "order_items",
                &["order_item_id", "order_id", "product_id", "quantity", "unit_price"],
                &[("order_id", "orders"), ("product_id", "products")],
            ),
            table("categories", &["category_id", "name"], &[]),
        ];
        SchemaSnapshot::assemble(tables, 1, Duration::ZERO, vec![]).0
    }

    #[test]
    fn test_fast_path_returns_all_tables_in_name_order() {
        let snapshot = shop();
        let result = RelevanceScorer::default().select("anything at all", &snapshot, 5).unwrap();
        assert_eq!(result.tables, vec!["categories", "order_items", "orders", "products", "users"]);
        assert_eq!(result.included, 5);
        assert!(!result.truncated);
        assert!(result.scores.is_empty());
    }

    #[test]
    fn test_expensive_products_scenario() {
        let snapshot = shop();
        let scorer = RelevanceScorer::default();
        let result = scorer.select("top 5 most expensive products", &snapshot, 3).unwrap();

        assert_eq!(result.tables, vec!["products", "order_items", "categories"]);
        assert_eq!(result.total_tables, 5);
        assert!(!result.truncated);

        let categories = &result.scores[2];
        assert_eq!(
            categories.contributions,
            vec![Contribution {
                reason: ScoreReason::AdjacencyBoost { via: "products".to_string() },
                weight: 20,
            }]
        );
        // idempotent
        assert_eq!(result, scorer.select("top 5 most expensive products", &snapshot, 3).unwrap());
    }

    #[test]
    fn test_budget_truncates_and_keeps_highest_scores() {
        let snapshot = shop();
        let scorer = RelevanceScorer::default();
        let result = scorer.select("orders by user with product price", &snapshot, 2).unwrap();

        assert_eq!(result.tables.len(), 2);
        assert!(result.truncated);

        let all = scorer.score_all("orders by user with product price", &snapshot);
        let min_included = result.scores.iter().map(|s| s.score).min().unwrap();
        for (name, score) in &all {
            if !result.tables.contains(name) {
                assert!(score.score <= min_included, "{} outranks an included table", name);
            }
        }
    }

    #[test]
    fn test_ties_break_by_name() {
        let tables = vec![
            table("beta", &["amount"], &[]),
            table("alpha", &["amount"], &[]),
            table("gamma", &["other"], &[]),
        ];
        let snapshot = SchemaSnapshot::assemble(tables, 1, Duration::ZERO, vec![]).0;
        let result = RelevanceScorer::default().select("total amount", &snapshot, 1).unwrap();
        assert_eq!(result.tables, vec!["alpha"]);
        assert!(result.truncated);
    }

    #[test]
    fn test_no_match_falls_back_to_name_order() {
        let snapshot = shop();
        let result = RelevanceScorer::default().select("weather tomorrow", &snapshot, 2).unwrap();
        assert!(result.fallback);
        assert_eq!(result.tables, vec!["categories", "order_items"]);
    }

    #[test]
    fn test_zero_budget_is_rejected() {
        let err = RelevanceScorer::default().select("users", &shop(), 0).unwrap_err();
        assert!(matches!(err, Nl2SqlError::InvalidArgument(_)));
    }
}
