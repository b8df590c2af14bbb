//! Snapshot assembly.
//!
//! [`SnapshotAssembler`] wires the pipeline for one domain: extract the
//! metric, classify, aggregate per tier and along the breakdown, estimate
//! savings and generate recommendations. Everything is validated once in
//! [`SnapshotAssembler::new`]; assembling never fails.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::analysis::{aggregate, aggregate_by, summarize, BreakdownSpec};
use crate::classifier::TierClassifier;
use crate::domain::{DomainConfig, SavingsConfig};
use crate::error::ConfigurationError;
use crate::models::{round_cents, MetricsSnapshot, TierAggregate, TierDefinition};
use crate::recommendation::{RecommendationEngine, RuleContext};
use crate::record::{MetricSource, RawRecord};

/// Validated savings estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct SavingsModel {
    average_unit_value: f64,
    /// (tier position, weight)
    weights: Vec<(usize, f64)>,
}

impl SavingsModel {
    pub fn new(
        config: &SavingsConfig,
        tiers: &[TierDefinition],
    ) -> Result<Self, ConfigurationError> {
        let avg = config.average_unit_value;
        if !avg.is_finite() || avg < 0.0 {
            return Err(ConfigurationError::InvalidSavings(format!(
                "average_unit_value must be a non-negative number, got {}",
                avg
            )));
        }

        let mut weights = Vec::with_capacity(config.loss_weights.len());
        for (label, &weight) in &config.loss_weights {
            let position = tiers.iter().position(|t| &t.label == label).ok_or_else(|| {
                ConfigurationError::UnknownTier {
                    tier: label.clone(),
                    context: "savings loss_weights".to_string(),
                }
            })?;
            if !(0.0..=1.0).contains(&weight) {
                return Err(ConfigurationError::InvalidSavings(format!(
                    "loss weight for '{}' must be within [0, 1], got {}",
                    label, weight
                )));
            }
            weights.push((position, weight));
        }

        Ok(Self {
            average_unit_value: avg,
            weights,
        })
    }

    /// Estimated avoidable loss, rounded to cents.
    pub fn estimate(&self, aggregates: &[TierAggregate]) -> f64 {
        let total: f64 = self
            .weights
            .iter()
            .filter_map(|&(pos, weight)| aggregates.get(pos).map(|a| (a, weight)))
            .map(|(agg, weight)| agg.count as f64 * self.average_unit_value * weight)
            .fold(0.0, |acc, v| acc + v);
        round_cents(total)
    }
}

/// Produces [`MetricsSnapshot`]s for one domain.
#[derive(Debug, Clone)]
pub struct SnapshotAssembler {
    domain: String,
    metric: MetricSource,
    value_field: String,
    entity_field: String,
    classifier: TierClassifier,
    flag_through_rank: Option<u32>,
    breakdown: Option<BreakdownSpec>,
    savings: SavingsModel,
    recommender: RecommendationEngine,
}

impl SnapshotAssembler {
    /// Validate a domain configuration and build its pipeline.
    pub fn new(config: &DomainConfig) -> Result<Self, ConfigurationError> {
        for (setting, value) in [
            ("name", &config.name),
            ("value_field", &config.value_field),
            ("entity_field", &config.entity_field),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigurationError::BlankSetting(setting.to_string()));
            }
        }

        config.metric.validate()?;
        let classifier = TierClassifier::new(config.tier_definitions()?)?;

        let catch_all = classifier.catch_all_rank();
        let flag_through_rank = match config.flag_through_rank {
            Some(rank) if rank > catch_all => {
                return Err(ConfigurationError::FlagRankOutOfRange {
                    rank,
                    max: catch_all,
                })
            }
            Some(rank) => Some(rank),
            // A lone catch-all tier flags nothing.
            None => catch_all.checked_sub(1),
        };

        if let Some(spec) = &config.breakdown {
            spec.validate()?;
        }

        let savings = SavingsModel::new(&config.savings, classifier.tiers())?;
        let recommender = RecommendationEngine::new(
            &config.rules,
            &config.default_recommendation,
            classifier.tiers(),
        )?;

        Ok(Self {
            domain: config.name.clone(),
            metric: config.metric.clone(),
            value_field: config.value_field.clone(),
            entity_field: config.entity_field.clone(),
            classifier,
            flag_through_rank,
            breakdown: config.breakdown.clone(),
            savings,
            recommender,
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn classifier(&self) -> &TierClassifier {
        &self.classifier
    }

    /// Highest flagged severity rank, `None` when no tier is flagged.
    pub fn flag_through_rank(&self) -> Option<u32> {
        self.flag_through_rank
    }

    /// Assemble a snapshot stamped with the current time.
    pub fn assemble(&self, records: &[RawRecord]) -> MetricsSnapshot {
        self.assemble_at(records, Utc::now())
    }

    /// Assemble a snapshot as of `computed_at`.
    ///
    /// Date metrics are measured against `computed_at`'s UTC date, so the
    /// same records and instant always give the same snapshot.
    pub fn assemble_at(&self, records: &[RawRecord], computed_at: DateTime<Utc>) -> MetricsSnapshot {
        let ctx = self.metric.prepare(records, computed_at.date_naive());
        let outcome =
            self.classifier
                .classify_records(records, &self.metric, &self.value_field, &ctx);

        let aggregates = aggregate(
            &outcome.classified,
            self.classifier.tiers(),
            &self.value_field,
            &self.entity_field,
        );

        let top_breakdown = match &self.breakdown {
            Some(spec) => aggregate_by(
                &outcome.classified,
                spec,
                &self.value_field,
                &self.entity_field,
                self.flag_through_rank,
            ),
            None => Vec::new(),
        };

        let summary = summarize(
            &outcome.classified,
            &outcome.unclassifiable,
            &self.value_field,
            self.flag_through_rank,
        );

        let estimated_savings = self.savings.estimate(&aggregates);

        let recommendations = self.recommender.generate(&RuleContext {
            aggregates: &aggregates,
            breakdown: &top_breakdown,
            summary: &summary,
            estimated_savings,
        });

        info!(
            "Snapshot '{}': {} records, {} classified, {} flagged, {} unclassifiable",
            self.domain,
            summary.total_records,
            summary.classified_records,
            summary.flagged_count,
            outcome.unclassifiable.len()
        );

        MetricsSnapshot {
            domain: self.domain.clone(),
            aggregates,
            top_breakdown,
            recommendations,
            estimated_savings,
            computed_at,
            unclassifiable_count: outcome.unclassifiable.len(),
            summary,
        }
    }
}
