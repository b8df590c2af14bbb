//! Tier classification.
//!
//! A [`TierClassifier`] owns a validated tier table and assigns every
//! finite metric value to exactly one tier. Tables are checked once, at
//! construction; classification itself never fails for a valid table.

use std::collections::HashSet;
use tracing::debug;

use crate::error::{ConfigurationError, UnclassifiableRecordWarning, UnclassifiableReason};
use crate::models::{ClassifiedRecord, TierDefinition, TierPredicate};
use crate::record::{MetricContext, MetricSource, RawRecord};

/// Result of classifying a batch of records.
#[derive(Debug, Clone, Default)]
pub struct Classification<'r> {
    /// Records assigned to a tier, in input order.
    pub classified: Vec<ClassifiedRecord<'r>>,
    /// Records that could not be classified, in input order.
    pub unclassifiable: Vec<UnclassifiableRecordWarning>,
}

impl Classification<'_> {
    /// Number of records seen.
    pub fn total(&self) -> usize {
        self.classified.len() + self.unclassifiable.len()
    }
}

/// Assigns metric values to an ordered, exhaustive tier table.
#[derive(Debug, Clone, PartialEq)]
pub struct TierClassifier {
    tiers: Vec<TierDefinition>,
}

impl TierClassifier {
    /// Build a classifier, validating the table.
    pub fn new(tiers: Vec<TierDefinition>) -> Result<Self, ConfigurationError> {
        validate_table(&tiers)?;
        debug!(
            "Tier table ready: {}",
            tiers
                .iter()
                .map(|t| format!("{} ({})", t.label, t.predicate))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(Self { tiers })
    }

    /// The tier table, most severe first.
    pub fn tiers(&self) -> &[TierDefinition] {
        &self.tiers
    }

    /// Look up a tier by label.
    pub fn tier(&self, label: &str) -> Option<&TierDefinition> {
        self.tiers.iter().find(|t| t.label == label)
    }

    /// Rank of the catch-all tier.
    pub fn catch_all_rank(&self) -> u32 {
        self.tiers.last().map(|t| t.severity_rank).unwrap_or(0)
    }

    /// Assign a value to its tier.
    ///
    /// Returns `None` only for non-finite values; every finite value reaches
    /// at least the catch-all.
    pub fn classify(&self, value: f64) -> Option<&TierDefinition> {
        if !value.is_finite() {
            return None;
        }
        self.tiers.iter().find(|t| t.predicate.matches(value))
    }

    /// Classify a batch of records.
    ///
    /// A record is classified when its metric can be extracted and its
    /// value field is a number. Anything else is reported as unclassifiable.
    pub fn classify_records<'r>(
        &self,
        records: &'r [RawRecord],
        metric: &MetricSource,
        value_field: &str,
        ctx: &MetricContext,
    ) -> Classification<'r> {
        let mut outcome = Classification::default();

        for (index, record) in records.iter().enumerate() {
            let result = metric
                .extract(record, ctx)
                .and_then(|m| record.number(value_field).map(|_| m))
                .and_then(|m| {
                    self.classify(m)
                        .map(|tier| (m, tier))
                        .ok_or_else(|| {
                            UnclassifiableReason::InvalidNumber(metric.primary_field().to_string())
                        })
                });

            match result {
                Ok((metric_value, tier)) => outcome.classified.push(ClassifiedRecord {
                    index,
                    record,
                    tier_label: tier.label.clone(),
                    severity_rank: tier.severity_rank,
                    metric: metric_value,
                }),
                Err(reason) => {
                    let warning = UnclassifiableRecordWarning { index, reason };
                    debug!("Unclassifiable {}", warning);
                    outcome.unclassifiable.push(warning);
                }
            }
        }

        outcome
    }
}

/// Check a tier table for structural and ordering problems.
fn validate_table(tiers: &[TierDefinition]) -> Result<(), ConfigurationError> {
    let last = tiers.last().ok_or(ConfigurationError::EmptyTierTable)?;
    if !last.predicate.is_catch_all() {
        return Err(ConfigurationError::MissingCatchAll);
    }

    let mut labels = HashSet::new();
    for (position, tier) in tiers.iter().enumerate() {
        if tier.label.trim().is_empty() {
            return Err(ConfigurationError::BlankLabel { position });
        }
        if !labels.insert(tier.label.as_str()) {
            return Err(ConfigurationError::DuplicateLabel(tier.label.clone()));
        }
        if tier.severity_rank != position as u32 {
            return Err(ConfigurationError::RankMismatch {
                label: tier.label.clone(),
                declared: tier.severity_rank,
                expected: position as u32,
            });
        }
        if tier.predicate.is_catch_all() && position + 1 != tiers.len() {
            return Err(ConfigurationError::CatchAllNotLast {
                label: tier.label.clone(),
                position,
            });
        }
        check_bounds(tier)?;
    }

    let bounded = &tiers[..tiers.len() - 1];
    if let Some(first) = bounded.first() {
        if let Some(other) = bounded
            .iter()
            .find(|t| t.predicate.kind() != first.predicate.kind())
        {
            return Err(ConfigurationError::MixedPredicates {
                first: first.label.clone(),
                second: other.label.clone(),
            });
        }
    }

    check_order(bounded)
}

fn check_bounds(tier: &TierDefinition) -> Result<(), ConfigurationError> {
    let finite = match tier.predicate {
        TierPredicate::AtMost { bound } | TierPredicate::AtLeast { bound } => bound.is_finite(),
        TierPredicate::Between { min, max } => {
            if !(min.is_finite() && max.is_finite()) {
                false
            } else if min > max {
                return Err(ConfigurationError::InvertedRange {
                    label: tier.label.clone(),
                    min,
                    max,
                });
            } else {
                true
            }
        }
        TierPredicate::Always => true,
    };

    if finite {
        Ok(())
    } else {
        Err(ConfigurationError::NonFiniteBound {
            label: tier.label.clone(),
        })
    }
}

/// Thresholds must tighten toward the most severe tier; ranges must be disjoint.
fn check_order(bounded: &[TierDefinition]) -> Result<(), ConfigurationError> {
    for pair in bounded.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        let ordered = match (prev.predicate, next.predicate) {
            (TierPredicate::AtMost { bound: a }, TierPredicate::AtMost { bound: b }) => a < b,
            (TierPredicate::AtLeast { bound: a }, TierPredicate::AtLeast { bound: b }) => a > b,
            _ => true,
        };
        if !ordered {
            return Err(ConfigurationError::OutOfOrder {
                label: next.label.clone(),
                previous: prev.label.clone(),
            });
        }
    }

    let mut ranges: Vec<(f64, f64, &str)> = bounded
        .iter()
        .filter_map(|t| match t.predicate {
            TierPredicate::Between { min, max } => Some((min, max, t.label.as_str())),
            _ => None,
        })
        .collect();
    ranges.sort_by(|a, b| a.0.total_cmp(&b.0));

    for pair in ranges.windows(2) {
        if pair[1].0 <= pair[0].1 {
            return Err(ConfigurationError::Overlap {
                first: pair[0].2.to_string(),
                second: pair[1].2.to_string(),
            });
        }
    }

    Ok(())
}
