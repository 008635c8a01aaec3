//! Output rendering for aggregation results.

pub mod generator;

pub use generator::*;
