//! Aggregation core.
//!
//! [`coordinator`] runs one cycle across all adapters, [`eligibility`]
//! decides which providers take part, and [`stats`] summarizes results for
//! reporting.

pub mod coordinator;
pub mod eligibility;
pub mod stats;

pub use coordinator::Aggregator;
