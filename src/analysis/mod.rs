//! Analysis modules.
//!
//! Aggregation of classified reviews and the insights derived from the
//! aggregate.

pub mod aggregator;
pub mod insights;

pub use aggregator::*;
pub use insights::{Insight, InsightConfig};
