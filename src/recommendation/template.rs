//! Message templates.
//!
//! Templates are plain text with `{placeholder}` slots. They are parsed
//! once when the engine is built so that a typo in a placeholder or tier
//! name is a configuration error rather than a broken message at runtime.
//!
//! Supported placeholders:
//!
//! | Placeholder        | Value                                        |
//! |--------------------|----------------------------------------------|
//! | `{total}`          | input records                                |
//! | `{classified}`     | classified records                           |
//! | `{unclassifiable}` | unclassifiable records                       |
//! | `{flagged_count}`  | records in flagged tiers                     |
//! | `{flagged_pct}`    | flagged share of classified records          |
//! | `{flagged_sum}`    | value sum of flagged records                 |
//! | `{count:TIER}`     | records in `TIER`                            |
//! | `{pct:TIER}`       | `TIER` share of classified records           |
//! | `{sum:TIER}`       | value sum of `TIER`                          |
//! | `{entities:TIER}`  | distinct entities in `TIER`                  |
//! | `{top_key}`        | largest breakdown group                      |
//! | `{top_count}`      | records in the largest group                 |
//! | `{top_sum}`        | value sum of the largest group               |
//! | `{top_share}`      | largest group's share of flagged records     |
//! | `{impact}`         | the rule's estimated impact                  |
//! | `{savings}`        | the snapshot's estimated savings             |

use crate::error::ConfigurationError;
use crate::models::TierDefinition;
use crate::recommendation::engine::RuleContext;

#[derive(Debug, Clone, PartialEq)]
enum Placeholder {
    Total,
    Classified,
    Unclassifiable,
    FlaggedCount,
    FlaggedPct,
    FlaggedSum,
    Count(String),
    Pct(String),
    Sum(String),
    Entities(String),
    TopKey,
    TopCount,
    TopSum,
    TopShare,
    Impact,
    Savings,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Slot(Placeholder),
}

/// A parsed message template.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl MessageTemplate {
    /// Parse a template, resolving tier names against `tiers`.
    pub fn parse(raw: &str, tiers: &[TierDefinition]) -> Result<Self, ConfigurationError> {
        let invalid = |reason: String| ConfigurationError::InvalidTemplate {
            template: raw.to_string(),
            reason,
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = raw.chars();

        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for n in chars.by_ref() {
                        match n {
                            '}' => {
                                closed = true;
                                break;
                            }
                            '{' => return Err(invalid("nested '{'".to_string())),
                            other => name.push(other),
                        }
                    }
                    if !closed {
                        return Err(invalid("unterminated placeholder".to_string()));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Slot(resolve(name.trim(), tiers).map_err(invalid)?));
                }
                '}' => return Err(invalid("unmatched '}'".to_string())),
                other => literal.push(other),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The template as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Fill the template from the current aggregates.
    pub fn render(&self, ctx: &RuleContext<'_>, impact: f64) -> String {
        let mut out = String::with_capacity(self.raw.len() + 16);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Slot(slot) => out.push_str(&fill(slot, ctx, impact)),
            }
        }
        out
    }
}

fn resolve(name: &str, tiers: &[TierDefinition]) -> Result<Placeholder, String> {
    if let Some((kind, tier)) = name.split_once(':') {
        let tier = tier.trim();
        if !tiers.iter().any(|t| t.label == tier) {
            return Err(format!("unknown tier '{}'", tier));
        }
        let tier = tier.to_string();
        return match kind.trim() {
            "count" => Ok(Placeholder::Count(tier)),
            "pct" => Ok(Placeholder::Pct(tier)),
            "sum" => Ok(Placeholder::Sum(tier)),
            "entities" => Ok(Placeholder::Entities(tier)),
            other => Err(format!("unknown placeholder '{}:'", other)),
        };
    }

    match name {
        "total" => Ok(Placeholder::Total),
        "classified" => Ok(Placeholder::Classified),
        "unclassifiable" => Ok(Placeholder::Unclassifiable),
        "flagged_count" => Ok(Placeholder::FlaggedCount),
        "flagged_pct" => Ok(Placeholder::FlaggedPct),
        "flagged_sum" => Ok(Placeholder::FlaggedSum),
        "top_key" => Ok(Placeholder::TopKey),
        "top_count" => Ok(Placeholder::TopCount),
        "top_sum" => Ok(Placeholder::TopSum),
        "top_share" => Ok(Placeholder::TopShare),
        "impact" => Ok(Placeholder::Impact),
        "savings" => Ok(Placeholder::Savings),
        other => Err(format!("unknown placeholder '{}'", other)),
    }
}

fn fill(slot: &Placeholder, ctx: &RuleContext<'_>, impact: f64) -> String {
    let summary = ctx.summary;
    let top = ctx.breakdown.first();

    match slot {
        Placeholder::Total => summary.total_records.to_string(),
        Placeholder::Classified => summary.classified_records.to_string(),
        Placeholder::Unclassifiable => ctx.unclassifiable_count().to_string(),
        Placeholder::FlaggedCount => summary.flagged_count.to_string(),
        Placeholder::FlaggedPct => format!("{:.1}", summary.flagged_percentage()),
        Placeholder::FlaggedSum => format!("{:.2}", summary.flagged_sum),
        Placeholder::Count(tier) => ctx.tier(tier).map(|t| t.count).unwrap_or(0).to_string(),
        Placeholder::Pct(tier) => format!(
            "{:.1}",
            ctx.tier(tier).map(|t| t.percentage_of_total).unwrap_or(0.0)
        ),
        Placeholder::Sum(tier) => {
            format!("{:.2}", ctx.tier(tier).map(|t| t.sum).unwrap_or(0.0))
        }
        Placeholder::Entities(tier) => ctx
            .tier(tier)
            .map(|t| t.distinct_entity_count)
            .unwrap_or(0)
            .to_string(),
        Placeholder::TopKey => top.map(|g| g.key.clone()).unwrap_or_else(|| "-".to_string()),
        Placeholder::TopCount => top.map(|g| g.count).unwrap_or(0).to_string(),
        Placeholder::TopSum => format!("{:.2}", top.map(|g| g.sum).unwrap_or(0.0)),
        Placeholder::TopShare => {
            format!("{:.1}", top.map(|g| g.percentage_of_flagged).unwrap_or(0.0))
        }
        Placeholder::Impact => format!("{:.2}", impact),
        Placeholder::Savings => format!("{:.2}", ctx.estimated_savings),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SecondaryAggregate, SnapshotSummary, TierAggregate, TierPredicate};

    fn tiers() -> Vec<TierDefinition> {
        vec![
            TierDefinition::new("Crítico", 0, TierPredicate::AtMost { bound: 3.0 }),
            TierDefinition::new("Normal", 1, TierPredicate::Always),
        ]
    }

    #[test]
    fn test_render_placeholders() {
        let aggregates = vec![
            TierAggregate {
                tier_label: "Crítico".to_string(),
                severity_rank: 0,
                count: 3,
                sum: 450.5,
                distinct_entity_count: 2,
                percentage_of_total: 30.0,
            },
            TierAggregate {
                tier_label: "Normal".to_string(),
                severity_rank: 1,
                count: 7,
                sum: 100.0,
                distinct_entity_count: 7,
                percentage_of_total: 70.0,
            },
        ];
        let breakdown = vec![SecondaryAggregate {
            key: "Lácteos".to_string(),
            count: 2,
            sum: 300.0,
            distinct_entity_count: 2,
            percentage_of_flagged: 66.7,
        }];
        let summary = SnapshotSummary {
            total_records: 11,
            classified_records: 10,
            flagged_count: 3,
            flagged_sum: 450.5,
            total_sum: 550.5,
            ..Default::default()
        };
        let ctx = RuleContext {
            aggregates: &aggregates,
            breakdown: &breakdown,
            summary: &summary,
            estimated_savings: 1200.0,
        };

        let template = MessageTemplate::parse(
            "{count:Crítico} lotes críticos ({pct:Crítico}%), ${sum:Crítico}; \
             {top_key} concentra {top_share}%. Impacto {impact}, ahorro {savings}. \
             {unclassifiable}/{total}",
            &tiers(),
        )
        .unwrap();

        assert_eq!(
            template.render(&ctx, 315.35),
            "3 lotes críticos (30.0%), $450.50; Lácteos concentra 66.7%. \
             Impacto 315.35, ahorro 1200.00. 1/11"
        );
    }

    #[test]
    fn test_plain_text_round_trips() {
        let template = MessageTemplate::parse("Revisar procesos", &tiers()).unwrap();
        assert_eq!(template.as_str(), "Revisar procesos");
        let summary = SnapshotSummary::default();
        let ctx = RuleContext {
            aggregates: &[],
            breakdown: &[],
            summary: &summary,
            estimated_savings: 0.0,
        };
        assert_eq!(template.render(&ctx, 0.0), "Revisar procesos");
        assert_eq!(
            MessageTemplate::parse("top: {top_key}", &tiers())
                .unwrap()
                .render(&ctx, 0.0),
            "top: -"
        );
    }

    #[test]
    fn test_rejects_bad_templates() {
        assert!(MessageTemplate::parse("{count:Urgente}", &tiers()).is_err());
        assert!(MessageTemplate::parse("{nope}", &tiers()).is_err());
        assert!(MessageTemplate::parse("{avg:Crítico}", &tiers()).is_err());
        assert!(MessageTemplate::parse("open {total", &tiers()).is_err());
        assert!(MessageTemplate::parse("close }", &tiers()).is_err());
        assert!(MessageTemplate::parse("{{total}}", &tiers()).is_err());
    }
}
