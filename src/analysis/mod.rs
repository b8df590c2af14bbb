//! Aggregation of classified records.
//!
//! Per-tier rollups, the secondary breakdown and snapshot totals.

pub mod aggregator;

pub use aggregator::*;
