//! Prompt rendering and reply parsing

pub mod composer;
pub mod extract;

pub use composer::{ComposedPrompt, Detail, PromptComposer, SAMPLE_ROWS_IN_PROMPT};
pub use extract::extract_sql;
