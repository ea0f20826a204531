//! Relevance scoring of tables against a natural-language question

pub mod scorer;
pub mod terms;

pub use scorer::{
    Contribution, RelevanceScore, RelevanceScorer, ScoreReason, ScoringWeights, SelectionResult,
};
