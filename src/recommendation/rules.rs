//! Declarative recommendation rules.

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::models::{round_cents, TierDefinition};
use crate::recommendation::engine::RuleContext;

/// When a rule fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleCondition {
    Always,
    TierCountAtLeast { tier: String, count: usize },
    TierPercentageAtLeast { tier: String, percentage: f64 },
    TierSumAtLeast { tier: String, amount: f64 },
    FlaggedCountAtLeast { count: usize },
    FlaggedPercentageAtLeast { percentage: f64 },
    /// The largest breakdown group holds at least this share of flagged records.
    TopShareAtLeast { percentage: f64 },
    UnclassifiableAtLeast { count: usize },
    All { conditions: Vec<RuleCondition> },
    Any { conditions: Vec<RuleCondition> },
}

impl RuleCondition {
    /// Check tier references and numeric thresholds.
    pub fn validate(&self, tiers: &[TierDefinition], rule: &str) -> Result<(), ConfigurationError> {
        match self {
            RuleCondition::TierCountAtLeast { tier, count } => {
                require_tier(tiers, tier, rule)?;
                require_positive(*count, rule)
            }
            RuleCondition::TierPercentageAtLeast { tier, percentage } => {
                require_tier(tiers, tier, rule)?;
                require_finite(*percentage, rule)
            }
            RuleCondition::TierSumAtLeast { tier, amount } => {
                require_tier(tiers, tier, rule)?;
                require_finite(*amount, rule)
            }
            RuleCondition::FlaggedPercentageAtLeast { percentage }
            | RuleCondition::TopShareAtLeast { percentage } => require_finite(*percentage, rule),
            RuleCondition::All { conditions } | RuleCondition::Any { conditions } => conditions
                .iter()
                .try_for_each(|c| c.validate(tiers, rule)),
            RuleCondition::FlaggedCountAtLeast { count }
            | RuleCondition::UnclassifiableAtLeast { count } => require_positive(*count, rule),
            RuleCondition::Always => Ok(()),
        }
    }

    /// Evaluate against the current aggregates.
    pub fn evaluate(&self, ctx: &RuleContext<'_>) -> bool {
        match self {
            RuleCondition::Always => true,
            RuleCondition::TierCountAtLeast { tier, count } => {
                ctx.tier(tier).is_some_and(|t| t.count >= *count)
            }
            RuleCondition::TierPercentageAtLeast { tier, percentage } => ctx
                .tier(tier)
                .is_some_and(|t| t.count > 0 && t.percentage_of_total >= *percentage),
            RuleCondition::TierSumAtLeast { tier, amount } => {
                ctx.tier(tier).is_some_and(|t| t.count > 0 && t.sum >= *amount)
            }
            RuleCondition::FlaggedCountAtLeast { count } => ctx.summary.flagged_count >= *count,
            RuleCondition::FlaggedPercentageAtLeast { percentage } => {
                ctx.summary.flagged_count > 0
                    && ctx.summary.flagged_percentage() >= *percentage
            }
            RuleCondition::TopShareAtLeast { percentage } => ctx
                .breakdown
                .first()
                .is_some_and(|top| top.percentage_of_flagged >= *percentage),
            RuleCondition::UnclassifiableAtLeast { count } => ctx.unclassifiable_count() >= *count,
            RuleCondition::All { conditions } => conditions.iter().all(|c| c.evaluate(ctx)),
            RuleCondition::Any { conditions } => conditions.iter().any(|c| c.evaluate(ctx)),
        }
    }
}

/// How a rule's financial impact is estimated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImpactEstimate {
    #[default]
    None,
    Fixed { amount: f64 },
    /// Tier value sum times a factor.
    TierSum { tier: String, factor: f64 },
    /// Tier record count times a unit value times a factor.
    TierCount {
        tier: String,
        unit_value: f64,
        factor: f64,
    },
    FlaggedSum { factor: f64 },
    /// A fraction of the snapshot's estimated savings.
    Savings { factor: f64 },
}

impl ImpactEstimate {
    pub fn validate(&self, tiers: &[TierDefinition], rule: &str) -> Result<(), ConfigurationError> {
        match self {
            ImpactEstimate::None => Ok(()),
            ImpactEstimate::Fixed { amount } => require_finite(*amount, rule),
            ImpactEstimate::TierSum { tier, factor } => {
                require_tier(tiers, tier, rule)?;
                require_finite(*factor, rule)
            }
            ImpactEstimate::TierCount {
                tier,
                unit_value,
                factor,
            } => {
                require_tier(tiers, tier, rule)?;
                require_finite(*unit_value, rule)?;
                require_finite(*factor, rule)
            }
            ImpactEstimate::FlaggedSum { factor } | ImpactEstimate::Savings { factor } => {
                require_finite(*factor, rule)
            }
        }
    }

    /// Estimated impact in currency units, rounded to cents.
    pub fn estimate(&self, ctx: &RuleContext<'_>) -> f64 {
        let raw = match self {
            ImpactEstimate::None => 0.0,
            ImpactEstimate::Fixed { amount } => *amount,
            ImpactEstimate::TierSum { tier, factor } => {
                ctx.tier(tier).map(|t| t.sum).unwrap_or(0.0) * factor
            }
            ImpactEstimate::TierCount {
                tier,
                unit_value,
                factor,
            } => ctx.tier(tier).map(|t| t.count as f64).unwrap_or(0.0) * unit_value * factor,
            ImpactEstimate::FlaggedSum { factor } => ctx.summary.flagged_sum * factor,
            ImpactEstimate::Savings { factor } => ctx.estimated_savings * factor,
        };
        round_cents(raw)
    }
}

/// A rule as written in a domain configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRule {
    #[serde(rename = "type")]
    pub rec_type: String,
    /// 1 is the highest priority.
    pub priority: u32,
    pub when: RuleCondition,
    /// Message template, see [`crate::recommendation::MessageTemplate`].
    pub message: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub impact: ImpactEstimate,
}

/// The domain's always-present closing recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultRecommendation {
    #[serde(rename = "type", default = "default_type")]
    pub rec_type: String,
    pub message: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub impact: ImpactEstimate,
}

fn default_type() -> String {
    "preventive".to_string()
}

fn require_tier(tiers: &[TierDefinition], tier: &str, rule: &str) -> Result<(), ConfigurationError> {
    if tiers.iter().any(|t| t.label == tier) {
        Ok(())
    } else {
        Err(ConfigurationError::UnknownTier {
            tier: tier.to_string(),
            context: format!("rule '{}'", rule),
        })
    }
}

/// Count thresholds start at 1; use `always` for an unconditional rule.
fn require_positive(count: usize, rule: &str) -> Result<(), ConfigurationError> {
    if count > 0 {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidRule {
            rule: rule.to_string(),
            reason: "count thresholds must be at least 1".to_string(),
        })
    }
}

fn require_finite(value: f64, rule: &str) -> Result<(), ConfigurationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidRule {
            rule: rule.to_string(),
            reason: "thresholds and factors must be finite numbers".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SecondaryAggregate, SnapshotSummary, TierAggregate, TierPredicate};

    fn tiers() -> Vec<TierDefinition> {
        vec![
            TierDefinition::new("Vencido", 0, TierPredicate::AtMost { bound: 0.0 }),
            TierDefinition::new("Normal", 1, TierPredicate::Always),
        ]
    }

    fn aggregates() -> Vec<TierAggregate> {
        vec![
            TierAggregate {
                tier_label: "Vencido".to_string(),
                severity_rank: 0,
                count: 4,
                sum: 250.0,
                distinct_entity_count: 3,
                percentage_of_total: 40.0,
            },
            TierAggregate {
                tier_label: "Normal".to_string(),
                severity_rank: 1,
                count: 6,
                sum: 600.0,
                distinct_entity_count: 6,
                percentage_of_total: 60.0,
            },
        ]
    }

    fn breakdown() -> Vec<SecondaryAggregate> {
        vec![SecondaryAggregate {
            key: "Lácteos".to_string(),
            count: 3,
            sum: 200.0,
            distinct_entity_count: 2,
            percentage_of_flagged: 75.0,
        }]
    }

    fn summary() -> SnapshotSummary {
        SnapshotSummary {
            total_records: 12,
            classified_records: 10,
            flagged_count: 4,
            flagged_sum: 250.0,
            total_sum: 850.0,
            ..Default::default()
        }
    }

    fn check(condition: RuleCondition) -> bool {
        let aggs = aggregates();
        let groups = breakdown();
        let summary = summary();
        condition.evaluate(&RuleContext {
            aggregates: &aggs,
            breakdown: &groups,
            summary: &summary,
            estimated_savings: 80.0,
        })
    }

    fn estimate(impact: ImpactEstimate) -> f64 {
        let aggs = aggregates();
        let summary = summary();
        impact.estimate(&RuleContext {
            aggregates: &aggs,
            breakdown: &[],
            summary: &summary,
            estimated_savings: 80.0,
        })
    }

    #[test]
    fn test_tier_sum_at_least() {
        let at = |amount| RuleCondition::TierSumAtLeast {
            tier: "Vencido".to_string(),
            amount,
        };
        assert!(check(at(250.0)));
        assert!(!check(at(250.01)));
    }

    #[test]
    fn test_top_share_at_least() {
        assert!(check(RuleCondition::TopShareAtLeast { percentage: 75.0 }));
        assert!(!check(RuleCondition::TopShareAtLeast { percentage: 75.1 }));

        let aggs = aggregates();
        let summary = summary();
        let without_groups = RuleContext {
            aggregates: &aggs,
            breakdown: &[],
            summary: &summary,
            estimated_savings: 0.0,
        };
        assert!(!RuleCondition::TopShareAtLeast { percentage: 0.0 }.evaluate(&without_groups));
    }

    #[test]
    fn test_unclassifiable_at_least() {
        assert!(check(RuleCondition::UnclassifiableAtLeast { count: 2 }));
        assert!(!check(RuleCondition::UnclassifiableAtLeast { count: 3 }));
    }

    #[test]
    fn test_thresholds_fire_on_equality() {
        assert!(check(RuleCondition::TierCountAtLeast {
            tier: "Vencido".to_string(),
            count: 4,
        }));
        assert!(check(RuleCondition::TierPercentageAtLeast {
            tier: "Vencido".to_string(),
            percentage: 40.0,
        }));
        assert!(check(RuleCondition::FlaggedCountAtLeast { count: 4 }));
        assert!(check(RuleCondition::FlaggedPercentageAtLeast { percentage: 40.0 }));
        assert!(!check(RuleCondition::FlaggedCountAtLeast { count: 5 }));
    }

    #[test]
    fn test_zero_count_thresholds_are_rejected() {
        for condition in [
            RuleCondition::TierCountAtLeast {
                tier: "Vencido".to_string(),
                count: 0,
            },
            RuleCondition::FlaggedCountAtLeast { count: 0 },
            RuleCondition::UnclassifiableAtLeast { count: 0 },
            RuleCondition::Any {
                conditions: vec![RuleCondition::UnclassifiableAtLeast { count: 0 }],
            },
        ] {
            assert!(matches!(
                condition.validate(&tiers(), "x"),
                Err(ConfigurationError::InvalidRule { .. })
            ));
        }
        assert!(RuleCondition::UnclassifiableAtLeast { count: 1 }
            .validate(&tiers(), "x")
            .is_ok());
    }

    #[test]
    fn test_impact_estimates() {
        assert_eq!(estimate(ImpactEstimate::None), 0.0);
        assert_eq!(estimate(ImpactEstimate::Fixed { amount: 99.999 }), 100.0);
        assert_eq!(
            estimate(ImpactEstimate::TierCount {
                tier: "Vencido".to_string(),
                unit_value: 12.5,
                factor: 0.5,
            }),
            25.0
        );
        assert_eq!(estimate(ImpactEstimate::Savings { factor: 0.25 }), 20.0);
        assert_eq!(estimate(ImpactEstimate::FlaggedSum { factor: 0.1 }), 25.0);
    }

    #[test]
    fn test_impact_validation() {
        let unknown = ImpactEstimate::TierCount {
            tier: "Crítico".to_string(),
            unit_value: 1.0,
            factor: 1.0,
        };
        assert!(matches!(
            unknown.validate(&tiers(), "x"),
            Err(ConfigurationError::UnknownTier { .. })
        ));
        assert!(ImpactEstimate::Fixed { amount: f64::INFINITY }
            .validate(&tiers(), "x")
            .is_err());
    }
}
