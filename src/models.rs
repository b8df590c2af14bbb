//! Data models for the snapshot pipeline.
//!
//! This module contains the core data structures threaded through
//! classification, aggregation and recommendation, and the snapshot
//! handed to the API layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::record::RawRecord;

/// Matching rule of a single tier.
///
/// Bounds are inclusive: a value sitting exactly on a threshold belongs to
/// the more severe tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TierPredicate {
    /// `value <= bound`
    AtMost { bound: f64 },
    /// `value >= bound`
    AtLeast { bound: f64 },
    /// `min <= value <= max`
    Between { min: f64, max: f64 },
    /// Catch-all, matches every finite value.
    Always,
}

impl TierPredicate {
    /// Whether `value` satisfies this predicate.
    pub fn matches(&self, value: f64) -> bool {
        match *self {
            TierPredicate::AtMost { bound } => value <= bound,
            TierPredicate::AtLeast { bound } => value >= bound,
            TierPredicate::Between { min, max } => value >= min && value <= max,
            TierPredicate::Always => true,
        }
    }

    /// Short name of the predicate kind.
    pub fn kind(&self) -> &'static str {
        match self {
            TierPredicate::AtMost { .. } => "at_most",
            TierPredicate::AtLeast { .. } => "at_least",
            TierPredicate::Between { .. } => "between",
            TierPredicate::Always => "always",
        }
    }

    pub fn is_catch_all(&self) -> bool {
        matches!(self, TierPredicate::Always)
    }
}

impl fmt::Display for TierPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TierPredicate::AtMost { bound } => write!(f, "≤ {}", bound),
            TierPredicate::AtLeast { bound } => write!(f, "≥ {}", bound),
            TierPredicate::Between { min, max } => write!(f, "{} – {}", min, max),
            TierPredicate::Always => write!(f, "otherwise"),
        }
    }
}

/// One ordered bucket of a classification table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierDefinition {
    /// Display label, unique within the table.
    pub label: String,
    /// 0 is the most severe tier.
    pub severity_rank: u32,
    pub predicate: TierPredicate,
}

impl TierDefinition {
    pub fn new(label: impl Into<String>, severity_rank: u32, predicate: TierPredicate) -> Self {
        Self {
            label: label.into(),
            severity_rank,
            predicate,
        }
    }
}

/// A record that landed in a tier.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedRecord<'r> {
    /// Position of the record in the input slice.
    pub index: usize,
    pub record: &'r RawRecord,
    pub tier_label: String,
    pub severity_rank: u32,
    /// The classified metric (days, percent, amount, ...).
    pub metric: f64,
}

/// Per-tier rollup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierAggregate {
    pub tier_label: String,
    pub severity_rank: u32,
    pub count: usize,
    /// Sum of the domain's value field over the tier's records.
    pub sum: f64,
    pub distinct_entity_count: usize,
    /// Share of classified records, one decimal.
    pub percentage_of_total: f64,
}

impl TierAggregate {
    /// An aggregate with no records.
    pub fn empty(tier: &TierDefinition) -> Self {
        Self {
            tier_label: tier.label.clone(),
            severity_rank: tier.severity_rank,
            count: 0,
            sum: 0.0,
            distinct_entity_count: 0,
            percentage_of_total: 0.0,
        }
    }
}

/// Rollup of flagged records along a secondary dimension (category, product, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecondaryAggregate {
    pub key: String,
    pub count: usize,
    pub sum: f64,
    pub distinct_entity_count: usize,
    /// Share of all flagged records, one decimal.
    pub percentage_of_flagged: f64,
}

/// A prioritized action item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub rec_type: String,
    /// 1 is the highest priority.
    pub priority: u32,
    pub message: String,
    pub action: String,
    pub estimated_impact: f64,
}

/// Totals computed alongside the per-tier aggregates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    /// Number of input records.
    pub total_records: usize,
    /// Records assigned to a tier.
    pub classified_records: usize,
    /// Records in tiers at or above the flag rank.
    pub flagged_count: usize,
    /// Value sum over flagged records.
    pub flagged_sum: f64,
    /// Value sum over all classified records.
    pub total_sum: f64,
    /// Unclassifiable records grouped by reason kind.
    pub unclassifiable_by_reason: BTreeMap<String, usize>,
}

impl SnapshotSummary {
    /// Flagged records as a percentage of classified records, one decimal.
    pub fn flagged_percentage(&self) -> f64 {
        if self.classified_records == 0 {
            return 0.0;
        }
        round_tenth(self.flagged_count as f64 / self.classified_records as f64 * 100.0)
    }
}

/// The complete output of one pipeline run for one domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Domain name from the configuration.
    pub domain: String,
    /// One entry per configured tier, in severity order.
    pub aggregates: Vec<TierAggregate>,
    /// Secondary breakdown of flagged records, largest first.
    pub top_breakdown: Vec<SecondaryAggregate>,
    /// Ordered by ascending priority, default recommendation last.
    pub recommendations: Vec<Recommendation>,
    pub estimated_savings: f64,
    pub computed_at: DateTime<Utc>,
    pub unclassifiable_count: usize,
    pub summary: SnapshotSummary,
}

impl MetricsSnapshot {
    /// Look up a tier's aggregate by label.
    pub fn tier(&self, label: &str) -> Option<&TierAggregate> {
        self.aggregates.iter().find(|a| a.tier_label == label)
    }
}

/// Round to one decimal place.
pub fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Round to two decimal places (currency).
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Badge for a tier given its rank and the table size.
///
/// The most severe tier is red and the catch-all is green.
pub fn severity_emoji(rank: u32, tier_count: usize) -> &'static str {
    let last = tier_count.saturating_sub(1) as u32;
    match rank {
        r if r >= last => "🟢",
        0 => "🔴",
        1 => "🟠",
        _ => "🟡",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicate_boundaries_are_inclusive() {
        assert!(TierPredicate::AtMost { bound: 3.0 }.matches(3.0));
        assert!(!TierPredicate::AtMost { bound: 3.0 }.matches(3.5));
        assert!(TierPredicate::AtLeast { bound: 50.0 }.matches(50.0));
        assert!(!TierPredicate::AtLeast { bound: 50.0 }.matches(49.9));
        assert!(TierPredicate::Between { min: 4.0, max: 7.0 }.matches(4.0));
        assert!(TierPredicate::Between { min: 4.0, max: 7.0 }.matches(7.0));
        assert!(TierPredicate::Always.matches(-1e9));
    }

    #[test]
    fn test_predicate_display() {
        assert_eq!(TierPredicate::AtMost { bound: 3.0 }.to_string(), "≤ 3");
        assert_eq!(TierPredicate::AtLeast { bound: 10.5 }.to_string(), "≥ 10.5");
        assert_eq!(TierPredicate::Always.to_string(), "otherwise");
    }

    #[test]
    fn test_flagged_percentage() {
        let summary = SnapshotSummary {
            total_records: 4,
            classified_records: 3,
            flagged_count: 2,
            ..Default::default()
        };
        assert_eq!(summary.flagged_percentage(), 66.7);
        assert_eq!(SnapshotSummary::default().flagged_percentage(), 0.0);
    }

    #[test]
    fn test_severity_emoji() {
        assert_eq!(severity_emoji(0, 6), "🔴");
        assert_eq!(severity_emoji(1, 6), "🟠");
        assert_eq!(severity_emoji(3, 6), "🟡");
        assert_eq!(severity_emoji(5, 6), "🟢");
        assert_eq!(severity_emoji(1, 2), "🟢");
    }

    #[test]
    fn test_recommendation_serializes_type_field() {
        let rec = Recommendation {
            rec_type: "preventive".to_string(),
            priority: 3,
            message: "m".to_string(),
            action: "a".to_string(),
            estimated_impact: 0.0,
        };
        let json = serde_json::to_string(&rec).unwrap();
        assert!(json.contains("\"type\":\"preventive\""));
    }

    #[test]
    fn test_snapshot_tier_lookup() {
        let tier = TierDefinition::new("Normal", 0, TierPredicate::Always);
        let snapshot = MetricsSnapshot {
            domain: "test".to_string(),
            aggregates: vec![TierAggregate::empty(&tier)],
            top_breakdown: Vec::new(),
            recommendations: Vec::new(),
            estimated_savings: 0.0,
            computed_at: Utc::now(),
            unclassifiable_count: 0,
            summary: SnapshotSummary::default(),
        };
        assert!(snapshot.tier("Normal").is_some());
        assert!(snapshot.tier("Vencido").is_none());
    }
}
