//! Read-only query validation

pub mod lexer;
pub mod validator;

pub use validator::{QueryValidator, RejectionReason, ValidationVerdict};
