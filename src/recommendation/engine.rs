//! Rule evaluation.

use tracing::debug;

use crate::error::ConfigurationError;
use crate::models::{
    Recommendation, SecondaryAggregate, SnapshotSummary, TierAggregate, TierDefinition,
};
use crate::recommendation::rules::{
    DefaultRecommendation, ImpactEstimate, RecommendationRule, RuleCondition,
};
use crate::recommendation::template::MessageTemplate;

/// Everything a rule may look at.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub aggregates: &'a [TierAggregate],
    pub breakdown: &'a [SecondaryAggregate],
    pub summary: &'a SnapshotSummary,
    pub estimated_savings: f64,
}

impl<'a> RuleContext<'a> {
    pub fn tier(&self, label: &str) -> Option<&'a TierAggregate> {
        self.aggregates.iter().find(|a| a.tier_label == label)
    }

    pub fn unclassifiable_count(&self) -> usize {
        self.summary
            .total_records
            .saturating_sub(self.summary.classified_records)
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    rec_type: String,
    priority: u32,
    when: RuleCondition,
    message: MessageTemplate,
    action: MessageTemplate,
    impact: ImpactEstimate,
}

impl CompiledRule {
    fn emit(&self, ctx: &RuleContext<'_>) -> Recommendation {
        let impact = self.impact.estimate(ctx);
        Recommendation {
            rec_type: self.rec_type.clone(),
            priority: self.priority,
            message: self.message.render(ctx, impact),
            action: self.action.render(ctx, impact),
            estimated_impact: impact,
        }
    }
}

/// Evaluates a domain's rules against its aggregates.
#[derive(Debug, Clone)]
pub struct RecommendationEngine {
    rules: Vec<CompiledRule>,
    default: CompiledRule,
}

impl RecommendationEngine {
    /// Validate and compile rules against a tier table.
    ///
    /// The default recommendation takes the priority number after the
    /// largest configured one, so it always sorts last.
    pub fn new(
        rules: &[RecommendationRule],
        default: &DefaultRecommendation,
        tiers: &[TierDefinition],
    ) -> Result<Self, ConfigurationError> {
        let compiled = rules
            .iter()
            .map(|rule| compile_rule(rule, tiers))
            .collect::<Result<Vec<_>, _>>()?;

        let default_priority = compiled
            .iter()
            .map(|r| r.priority)
            .max()
            .unwrap_or(0)
            .checked_add(1)
            .ok_or_else(|| ConfigurationError::InvalidRule {
                rule: default.rec_type.clone(),
                reason: format!("no priority left after {} for the default", u32::MAX),
            })?;

        if default.rec_type.trim().is_empty() {
            return Err(ConfigurationError::InvalidRule {
                rule: "default".to_string(),
                reason: "type must not be blank".to_string(),
            });
        }
        default.impact.validate(tiers, &default.rec_type)?;

        let default = CompiledRule {
            rec_type: default.rec_type.clone(),
            priority: default_priority,
            when: RuleCondition::Always,
            message: MessageTemplate::parse(&default.message, tiers)?,
            action: MessageTemplate::parse(&default.action, tiers)?,
            impact: default.impact.clone(),
        };

        debug!(
            "Recommendation engine ready: {} rules, default '{}' at priority {}",
            compiled.len(),
            default.rec_type,
            default.priority
        );

        Ok(Self {
            rules: compiled,
            default,
        })
    }

    /// Priority assigned to the default recommendation.
    pub fn default_priority(&self) -> u32 {
        self.default.priority
    }

    /// Emit every matching recommendation, most urgent first, default last.
    pub fn generate(&self, ctx: &RuleContext<'_>) -> Vec<Recommendation> {
        let mut out: Vec<Recommendation> = self
            .rules
            .iter()
            .filter(|rule| rule.when.evaluate(ctx))
            .map(|rule| rule.emit(ctx))
            .collect();

        // Stable: equal priorities keep declaration order.
        out.sort_by_key(|r| r.priority);
        out.push(self.default.emit(ctx));

        debug!("{} recommendations generated", out.len());
        out
    }
}

fn compile_rule(
    rule: &RecommendationRule,
    tiers: &[TierDefinition],
) -> Result<CompiledRule, ConfigurationError> {
    if rule.rec_type.trim().is_empty() {
        return Err(ConfigurationError::InvalidRule {
            rule: rule.message.clone(),
            reason: "type must not be blank".to_string(),
        });
    }
    if rule.priority == 0 {
        return Err(ConfigurationError::ZeroPriority {
            rule: rule.rec_type.clone(),
        });
    }
    rule.when.validate(tiers, &rule.rec_type)?;
    rule.impact.validate(tiers, &rule.rec_type)?;

    Ok(CompiledRule {
        rec_type: rule.rec_type.clone(),
        priority: rule.priority,
        when: rule.when.clone(),
        message: MessageTemplate::parse(&rule.message, tiers)?,
        action: MessageTemplate::parse(&rule.action, tiers)?,
        impact: rule.impact.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TierPredicate;

    fn tiers() -> Vec<TierDefinition> {
        vec![
            TierDefinition::new("Vencido", 0, TierPredicate::AtMost { bound: 0.0 }),
            TierDefinition::new("Crítico", 1, TierPredicate::AtMost { bound: 3.0 }),
            TierDefinition::new("Normal", 2, TierPredicate::Always),
        ]
    }

    fn aggregates(vencido: usize, critico: usize, normal: usize) -> Vec<TierAggregate> {
        let total = (vencido + critico + normal).max(1) as f64;
        [("Vencido", vencido), ("Crítico", critico), ("Normal", normal)]
            .iter()
            .enumerate()
            .map(|(rank, (label, count))| TierAggregate {
                tier_label: label.to_string(),
                severity_rank: rank as u32,
                count: *count,
                sum: *count as f64 * 100.0,
                distinct_entity_count: *count,
                percentage_of_total: *count as f64 / total * 100.0,
            })
            .collect()
    }

    fn rule(rec_type: &str, priority: u32, when: RuleCondition) -> RecommendationRule {
        RecommendationRule {
            rec_type: rec_type.to_string(),
            priority,
            when,
            message: format!("{} fired", rec_type),
            action: String::new(),
            impact: ImpactEstimate::None,
        }
    }

    fn default_rec() -> DefaultRecommendation {
        DefaultRecommendation {
            rec_type: "preventive".to_string(),
            message: "Mantener revisión semanal".to_string(),
            action: "monitor".to_string(),
            impact: ImpactEstimate::None,
        }
    }

    fn generate(engine: &RecommendationEngine, aggs: &[TierAggregate]) -> Vec<Recommendation> {
        let summary = SnapshotSummary {
            total_records: aggs.iter().map(|a| a.count).sum(),
            classified_records: aggs.iter().map(|a| a.count).sum(),
            flagged_count: aggs.iter().take(2).map(|a| a.count).sum(),
            ..Default::default()
        };
        let ctx = RuleContext {
            aggregates: aggs,
            breakdown: &[],
            summary: &summary,
            estimated_savings: 0.0,
        };
        engine.generate(&ctx)
    }

    #[test]
    fn test_all_matching_rules_fire_in_priority_order() {
        let rules = vec![
            rule(
                "volume",
                2,
                RuleCondition::TierCountAtLeast {
                    tier: "Crítico".to_string(),
                    count: 1,
                },
            ),
            rule(
                "expired",
                1,
                RuleCondition::TierCountAtLeast {
                    tier: "Vencido".to_string(),
                    count: 1,
                },
            ),
            rule(
                "share",
                2,
                RuleCondition::FlaggedPercentageAtLeast { percentage: 10.0 },
            ),
        ];
        let engine = RecommendationEngine::new(&rules, &default_rec(), &tiers()).unwrap();

        let recs = generate(&engine, &aggregates(1, 2, 7));
        let types: Vec<&str> = recs.iter().map(|r| r.rec_type.as_str()).collect();

        assert_eq!(types, vec!["expired", "volume", "share", "preventive"]);
        assert_eq!(recs.last().map(|r| r.priority), Some(3));
        assert_eq!(engine.default_priority(), 3);
    }

    #[test]
    fn test_default_only_when_nothing_matches() {
        let rules = vec![rule(
            "expired",
            1,
            RuleCondition::TierCountAtLeast {
                tier: "Vencido".to_string(),
                count: 1,
            },
        )];
        let engine = RecommendationEngine::new(&rules, &default_rec(), &tiers()).unwrap();

        let recs = generate(&engine, &aggregates(0, 0, 0));
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].rec_type, "preventive");
        assert_eq!(recs[0].message, "Mantener revisión semanal");
    }

    #[test]
    fn test_default_priority_without_rules() {
        let engine = RecommendationEngine::new(&[], &default_rec(), &tiers()).unwrap();
        assert_eq!(engine.default_priority(), 1);
    }

    #[test]
    fn test_impact_is_estimated() {
        let mut r = rule(
            "expired",
            1,
            RuleCondition::TierCountAtLeast {
                tier: "Vencido".to_string(),
                count: 1,
            },
        );
        r.impact = ImpactEstimate::TierSum {
            tier: "Vencido".to_string(),
            factor: 0.5,
        };
        r.message = "Pérdida estimada {impact}".to_string();
        let engine = RecommendationEngine::new(&[r], &default_rec(), &tiers()).unwrap();

        let recs = generate(&engine, &aggregates(3, 0, 0));
        assert_eq!(recs[0].estimated_impact, 150.0);
        assert_eq!(recs[0].message, "Pérdida estimada 150.00");
    }

    #[test]
    fn test_composite_conditions() {
        let rules = vec![
            rule(
                "both",
                1,
                RuleCondition::All {
                    conditions: vec![
                        RuleCondition::TierCountAtLeast {
                            tier: "Vencido".to_string(),
                            count: 1,
                        },
                        RuleCondition::TierCountAtLeast {
                            tier: "Crítico".to_string(),
                            count: 1,
                        },
                    ],
                },
            ),
            rule(
                "either",
                1,
                RuleCondition::Any {
                    conditions: vec![
                        RuleCondition::TierCountAtLeast {
                            tier: "Vencido".to_string(),
                            count: 1,
                        },
                        RuleCondition::TierCountAtLeast {
                            tier: "Crítico".to_string(),
                            count: 1,
                        },
                    ],
                },
            ),
        ];
        let engine = RecommendationEngine::new(&rules, &default_rec(), &tiers()).unwrap();

        let recs = generate(&engine, &aggregates(0, 1, 0));
        let types: Vec<&str> = recs.iter().map(|r| r.rec_type.as_str()).collect();
        assert_eq!(types, vec!["either", "preventive"]);
    }

    #[test]
    fn test_rejects_invalid_rules() {
        let unknown = vec![rule(
            "x",
            1,
            RuleCondition::TierCountAtLeast {
                tier: "Urgente".to_string(),
                count: 1,
            },
        )];
        assert!(matches!(
            RecommendationEngine::new(&unknown, &default_rec(), &tiers()),
            Err(ConfigurationError::UnknownTier { .. })
        ));

        let zero = vec![rule("x", 0, RuleCondition::Always)];
        assert!(matches!(
            RecommendationEngine::new(&zero, &default_rec(), &tiers()),
            Err(ConfigurationError::ZeroPriority { .. })
        ));

        let mut bad_template = rule("x", 1, RuleCondition::Always);
        bad_template.message = "{count:Nada}".to_string();
        assert!(matches!(
            RecommendationEngine::new(&[bad_template], &default_rec(), &tiers()),
            Err(ConfigurationError::InvalidTemplate { .. })
        ));

        let mut nan = rule("x", 1, RuleCondition::Always);
        nan.impact = ImpactEstimate::FlaggedSum { factor: f64::NAN };
        assert!(matches!(
            RecommendationEngine::new(&[nan], &default_rec(), &tiers()),
            Err(ConfigurationError::InvalidRule { .. })
        ));
    }

    #[test]
    fn test_rejects_priority_without_room_for_default() {
        let last = vec![rule("x", u32::MAX, RuleCondition::Always)];
        assert!(matches!(
            RecommendationEngine::new(&last, &default_rec(), &tiers()),
            Err(ConfigurationError::InvalidRule { .. })
        ));

        let almost = vec![rule("x", u32::MAX - 1, RuleCondition::Always)];
        let engine = RecommendationEngine::new(&almost, &default_rec(), &tiers()).unwrap();
        assert_eq!(engine.default_priority(), u32::MAX);
    }
}
