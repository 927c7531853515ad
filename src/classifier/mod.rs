//! Aspect classification of review text.
//!
//! The [`Oracle`] trait abstracts the LLM backend; [`AspectClassifier`]
//! wraps an oracle and guarantees a well-formed verdict for every review.

pub mod adapter;
pub mod oracle;

pub use adapter::AspectClassifier;
pub use oracle::{OllamaOracle, OpenAiOracle, Oracle, OracleError, OracleSettings};
