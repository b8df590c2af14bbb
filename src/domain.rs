//! Domain configuration.
//!
//! A domain is everything needed to turn raw records into a snapshot: how
//! the metric is read, the tier table, the optional breakdown, the savings
//! model and the recommendation rules. Domains are plain TOML so new ones
//! can be added without code changes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::analysis::BreakdownSpec;
use crate::error::ConfigurationError;
use crate::models::{TierDefinition, TierPredicate};
use crate::recommendation::{DefaultRecommendation, RecommendationRule};
use crate::record::MetricSource;

/// Complete description of one BI domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Name reported in the snapshot.
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Field summed into tier and breakdown totals.
    pub value_field: String,

    /// Field identifying the entity behind a record (lot, product, customer).
    pub entity_field: String,

    /// Highest severity rank counted as flagged. Defaults to every tier
    /// except the catch-all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag_through_rank: Option<u32>,

    pub metric: MetricSource,

    /// Most severe first, catch-all last.
    pub tiers: Vec<TierSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<BreakdownSpec>,

    #[serde(default)]
    pub savings: SavingsConfig,

    #[serde(default)]
    pub rules: Vec<RecommendationRule>,

    pub default_recommendation: DefaultRecommendation,
}

/// One row of a tier table as written in TOML.
///
/// At most one of `at_most`, `at_least` and `between` may be set. A row
/// with none of them is the catch-all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierSpec {
    pub label: String,

    /// Explicit severity rank; defaults to the row position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_most: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_least: Option<f64>,

    /// Inclusive `[min, max]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub between: Option<[f64; 2]>,
}

impl TierSpec {
    pub fn at_most(label: &str, bound: f64) -> Self {
        Self {
            label: label.to_string(),
            at_most: Some(bound),
            ..Self::default()
        }
    }

    pub fn at_least(label: &str, bound: f64) -> Self {
        Self {
            label: label.to_string(),
            at_least: Some(bound),
            ..Self::default()
        }
    }

    pub fn catch_all(label: &str) -> Self {
        Self {
            label: label.to_string(),
            ..Self::default()
        }
    }

    /// Convert to a [`TierDefinition`] sitting at `position` in the table.
    pub fn to_definition(&self, position: usize) -> Result<TierDefinition, ConfigurationError> {
        let predicate = match (self.at_most, self.at_least, self.between) {
            (None, None, None) => TierPredicate::Always,
            (Some(bound), None, None) => TierPredicate::AtMost { bound },
            (None, Some(bound), None) => TierPredicate::AtLeast { bound },
            (None, None, Some([min, max])) => TierPredicate::Between { min, max },
            _ => {
                return Err(ConfigurationError::AmbiguousPredicate {
                    label: self.label.clone(),
                })
            }
        };

        Ok(TierDefinition::new(
            self.label.clone(),
            self.rank.unwrap_or(position as u32),
            predicate,
        ))
    }
}

/// Inputs of the savings estimate.
///
/// Savings are `Σ count(tier) × average_unit_value × loss_weight(tier)`
/// over the weighted tiers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SavingsConfig {
    #[serde(default)]
    pub average_unit_value: f64,

    /// Tier label to loss weight in `[0, 1]`.
    #[serde(default)]
    pub loss_weights: BTreeMap<String, f64>,
}

impl DomainConfig {
    /// Tier table in definition form. Structural checks happen in
    /// [`crate::classifier::TierClassifier::new`].
    pub fn tier_definitions(&self) -> Result<Vec<TierDefinition>, ConfigurationError> {
        self.tiers
            .iter()
            .enumerate()
            .map(|(position, spec)| spec.to_definition(position))
            .collect()
    }

    /// Parse a domain from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse domain config")
    }

    /// Load a domain from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read domain config: {}", path.display()))?;

        let domain: DomainConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse domain config: {}", path.display()))?;

        debug!("Loaded domain '{}' from {}", domain.name, path.display());
        Ok(domain)
    }

    /// Load every `*.toml` domain under a directory, sorted by path.
    pub fn load_dir(dir: &Path) -> Result<Vec<Self>> {
        if !dir.is_dir() {
            anyhow::bail!("Domain config directory not found: {}", dir.display());
        }

        let mut paths: Vec<PathBuf> = WalkDir::new(dir)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        paths.sort();

        paths.iter().map(|path| Self::load(path)).collect()
    }

    /// Serialize to TOML, e.g. for `--init-domain`.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize domain config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::BreakdownOrder;
    use crate::recommendation::RuleCondition;

    const EXPIRY_TOML: &str = r#"
name = "expiry"
value_field = "value"
entity_field = "lot_id"

[metric]
kind = "days_until"
field = "expiry_date"

[[tiers]]
label = "Vencido"
at_most = 0

[[tiers]]
label = "Crítico"
at_most = 3

[[tiers]]
label = "Normal"

[breakdown]
field = "category"
top_n = 3

[savings]
average_unit_value = 100.0

[savings.loss_weights]
"Vencido" = 1.0

[[rules]]
type = "expired"
priority = 1
message = "{count:Vencido} lotes vencidos"
when = { kind = "tier_count_at_least", tier = "Vencido", count = 1 }

[default_recommendation]
message = "Revisar semanalmente"
"#;

    #[test]
    fn test_parse_domain_toml() {
        let domain = DomainConfig::from_toml_str(EXPIRY_TOML).unwrap();

        assert_eq!(domain.name, "expiry");
        assert_eq!(
            domain.metric,
            MetricSource::DaysUntil {
                field: "expiry_date".to_string()
            }
        );
        assert_eq!(domain.tiers.len(), 3);
        assert_eq!(domain.flag_through_rank, None);

        let breakdown = domain.breakdown.as_ref().unwrap();
        assert_eq!(breakdown.top_n, 3);
        assert_eq!(breakdown.order_by, BreakdownOrder::Count);

        assert_eq!(domain.savings.loss_weights.get("Vencido"), Some(&1.0));
        assert_eq!(
            domain.rules[0].when,
            RuleCondition::TierCountAtLeast {
                tier: "Vencido".to_string(),
                count: 1
            }
        );
        assert_eq!(domain.default_recommendation.rec_type, "preventive");
    }

    #[test]
    fn test_tier_definitions() {
        let domain = DomainConfig::from_toml_str(EXPIRY_TOML).unwrap();
        let tiers = domain.tier_definitions().unwrap();

        assert_eq!(tiers[0].predicate, TierPredicate::AtMost { bound: 0.0 });
        assert_eq!(tiers[1].severity_rank, 1);
        assert_eq!(tiers[2].predicate, TierPredicate::Always);
    }

    #[test]
    fn test_ambiguous_tier_spec() {
        let spec = TierSpec {
            label: "Raro".to_string(),
            at_most: Some(1.0),
            at_least: Some(0.0),
            ..TierSpec::default()
        };
        assert_eq!(
            spec.to_definition(0),
            Err(ConfigurationError::AmbiguousPredicate {
                label: "Raro".to_string()
            })
        );
    }

    #[test]
    fn test_toml_round_trip() {
        let domain = DomainConfig::from_toml_str(EXPIRY_TOML).unwrap();
        let text = domain.to_toml().unwrap();
        assert_eq!(DomainConfig::from_toml_str(&text).unwrap(), domain);
    }

    #[test]
    fn test_load_dir_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let b = EXPIRY_TOML.replace("name = \"expiry\"", "name = \"b\"");
        let a = EXPIRY_TOML.replace("name = \"expiry\"", "name = \"a\"");
        std::fs::write(dir.path().join("b.toml"), b).unwrap();
        std::fs::write(dir.path().join("a.toml"), a).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let domains = DomainConfig::load_dir(dir.path()).unwrap();
        let names: Vec<&str> = domains.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_load_dir_missing() {
        assert!(DomainConfig::load_dir(Path::new("/nonexistent/tiersnap")).is_err());
    }
}
