//! Activity analysis.
//!
//! This module holds the aggregator that turns per-project API answers
//! into one report.

pub mod aggregator;

pub use aggregator::{Aggregator, AggregatorConfig};
