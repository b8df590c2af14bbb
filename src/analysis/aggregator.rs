//! Tier aggregation and statistics.
//!
//! This module rolls classified records up per tier and along a secondary
//! dimension, and computes the totals reported in a snapshot summary.
//! Every function here is pure and accepts empty input.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::warn;

use crate::error::{ConfigurationError, UnclassifiableRecordWarning};
use crate::models::{
    round_tenth, ClassifiedRecord, SecondaryAggregate, SnapshotSummary, TierAggregate,
    TierDefinition,
};

/// Roll classified records up per tier.
///
/// The output has one entry per tier, in table order, including tiers no
/// record landed in. Percentages use the classified total as denominator
/// and come from [`distribute_percentages`], so a single tier can differ
/// from plain one-decimal rounding of `count / total * 100` by 0.1.
pub fn aggregate(
    classified: &[ClassifiedRecord<'_>],
    tiers: &[TierDefinition],
    value_field: &str,
    entity_field: &str,
) -> Vec<TierAggregate> {
    let positions: HashMap<&str, usize> = tiers
        .iter()
        .enumerate()
        .map(|(i, t)| (t.label.as_str(), i))
        .collect();

    let mut aggregates: Vec<TierAggregate> = tiers.iter().map(TierAggregate::empty).collect();
    let mut entities: Vec<HashSet<String>> = vec![HashSet::new(); tiers.len()];
    let mut values: Vec<Vec<f64>> = vec![Vec::new(); tiers.len()];

    for record in classified {
        let Some(&pos) = positions.get(record.tier_label.as_str()) else {
            warn!(
                "Record #{} carries unknown tier '{}', skipped",
                record.index, record.tier_label
            );
            continue;
        };

        aggregates[pos].count += 1;
        values[pos].push(record.record.number(value_field).unwrap_or(0.0));
        if let Some(entity) = record.record.key(entity_field) {
            entities[pos].insert(entity);
        }
    }

    let counts: Vec<usize> = aggregates.iter().map(|a| a.count).collect();
    let percentages = distribute_percentages(&counts);

    for (((agg, ids), sums), pct) in aggregates
        .iter_mut()
        .zip(entities)
        .zip(values)
        .zip(percentages)
    {
        agg.sum = ordered_sum(sums);
        agg.distinct_entity_count = ids.len();
        agg.percentage_of_total = pct;
    }

    aggregates
}

/// Sum values in ascending order so the result does not depend on input order.
fn ordered_sum(mut values: Vec<f64>) -> f64 {
    values.sort_by(f64::total_cmp);
    values.into_iter().fold(0.0, |acc, v| acc + v)
}

/// Whether a record falls in a flagged tier. `None` flags nothing.
fn is_flagged(record: &ClassifiedRecord<'_>, flag_through_rank: Option<u32>) -> bool {
    flag_through_rank.is_some_and(|max| record.severity_rank <= max)
}

/// Turn counts into one-decimal percentages that add up to exactly 100.
///
/// Each share is floored to a tenth, then the missing tenths go to the
/// largest remainders (earlier entries win ties). All zeros when the
/// counts are all zero.
pub fn distribute_percentages(counts: &[usize]) -> Vec<f64> {
    let total: usize = counts.iter().sum();
    if total == 0 {
        return vec![0.0; counts.len()];
    }

    let mut tenths: Vec<usize> = counts.iter().map(|c| c * 1000 / total).collect();
    let allocated: usize = tenths.iter().sum();

    let mut by_remainder: Vec<usize> = (0..counts.len()).collect();
    by_remainder.sort_by(|&a, &b| {
        let ra = counts[a] * 1000 % total;
        let rb = counts[b] * 1000 % total;
        rb.cmp(&ra).then(a.cmp(&b))
    });

    for &i in by_remainder.iter().take(1000 - allocated) {
        tenths[i] += 1;
    }

    tenths.into_iter().map(|t| t as f64 / 10.0).collect()
}

/// Ordering key of the secondary breakdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakdownOrder {
    /// Most records first.
    #[default]
    Count,
    /// Largest value sum first.
    Sum,
}

/// Secondary dimension settings ("categories at risk", "top discounted products").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownSpec {
    /// Field holding the grouping key.
    pub field: String,

    /// Number of groups to keep.
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    #[serde(default)]
    pub order_by: BreakdownOrder,
}

fn default_top_n() -> usize {
    5
}

impl BreakdownSpec {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.field.trim().is_empty() {
            return Err(ConfigurationError::InvalidBreakdown(
                "field must not be blank".to_string(),
            ));
        }
        if self.top_n == 0 {
            return Err(ConfigurationError::InvalidBreakdown(
                "top_n must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Group flagged records by a secondary key and keep the largest groups.
///
/// Only records whose severity rank is at most `flag_through_rank` take
/// part; `None` means no tier is flagged. Records without a key are left out of the groups but still count
/// toward the flagged total used for percentages. Ties are broken by key,
/// ascending.
pub fn aggregate_by(
    classified: &[ClassifiedRecord<'_>],
    spec: &BreakdownSpec,
    value_field: &str,
    entity_field: &str,
    flag_through_rank: Option<u32>,
) -> Vec<SecondaryAggregate> {
    struct Group {
        count: usize,
        values: Vec<f64>,
        entities: HashSet<String>,
    }

    let mut groups: BTreeMap<String, Group> = BTreeMap::new();
    let mut flagged_total = 0usize;

    for record in classified
        .iter()
        .filter(|r| is_flagged(r, flag_through_rank))
    {
        flagged_total += 1;

        let Some(key) = record.record.key(&spec.field) else {
            continue;
        };

        let group = groups.entry(key).or_insert_with(|| Group {
            count: 0,
            values: Vec::new(),
            entities: HashSet::new(),
        });
        group.count += 1;
        group.values.push(record.record.number(value_field).unwrap_or(0.0));
        if let Some(entity) = record.record.key(entity_field) {
            group.entities.insert(entity);
        }
    }

    let mut breakdown: Vec<SecondaryAggregate> = groups
        .into_iter()
        .map(|(key, g)| SecondaryAggregate {
            key,
            count: g.count,
            sum: ordered_sum(g.values),
            distinct_entity_count: g.entities.len(),
            percentage_of_flagged: if flagged_total == 0 {
                0.0
            } else {
                round_tenth(g.count as f64 / flagged_total as f64 * 100.0)
            },
        })
        .collect();

    // BTreeMap iteration is key-ascending and sort_by is stable, so equal
    // entries stay in key order.
    match spec.order_by {
        BreakdownOrder::Count => breakdown.sort_by(|a, b| b.count.cmp(&a.count)),
        BreakdownOrder::Sum => breakdown.sort_by(|a, b| b.sum.total_cmp(&a.sum)),
    }
    breakdown.truncate(spec.top_n);

    breakdown
}

/// Compute snapshot totals.
pub fn summarize(
    classified: &[ClassifiedRecord<'_>],
    unclassifiable: &[UnclassifiableRecordWarning],
    value_field: &str,
    flag_through_rank: Option<u32>,
) -> SnapshotSummary {
    let mut summary = SnapshotSummary {
        total_records: classified.len() + unclassifiable.len(),
        classified_records: classified.len(),
        ..SnapshotSummary::default()
    };

    let mut all = Vec::with_capacity(classified.len());
    let mut flagged = Vec::new();
    for record in classified {
        let value = record.record.number(value_field).unwrap_or(0.0);
        all.push(value);
        if is_flagged(record, flag_through_rank) {
            flagged.push(value);
        }
    }
    summary.flagged_count = flagged.len();
    summary.flagged_sum = ordered_sum(flagged);
    summary.total_sum = ordered_sum(all);

    for warning in unclassifiable {
        *summary
            .unclassifiable_by_reason
            .entry(warning.reason.kind().to_string())
            .or_insert(0) += 1;
    }

    summary
}
