//! Error types.
//!
//! Configuration problems are fatal and surface once, when an engine is
//! built. Data problems never become errors: a record that cannot be
//! classified is reported as an [`UnclassifiableRecordWarning`] and counted.
//! Provider failures are passed through untouched.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// A malformed tier table, rule set, template or savings model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("tier table is empty")]
    EmptyTierTable,

    #[error("tier table has no catch-all entry as its last tier")]
    MissingCatchAll,

    #[error("catch-all tier '{label}' must be the last tier (found at position {position})")]
    CatchAllNotLast { label: String, position: usize },

    #[error("tier at position {position} has a blank label")]
    BlankLabel { position: usize },

    #[error("duplicate tier label '{0}'")]
    DuplicateLabel(String),

    #[error("tier '{label}' declares severity rank {declared} but sits at position {expected}")]
    RankMismatch {
        label: String,
        declared: u32,
        expected: u32,
    },

    #[error("tier '{label}' declares more than one predicate")]
    AmbiguousPredicate { label: String },

    #[error("tier '{label}' has a non-finite bound")]
    NonFiniteBound { label: String },

    #[error("tier '{label}' has an inverted range ({min} > {max})")]
    InvertedRange { label: String, min: f64, max: f64 },

    #[error("tier table mixes predicate kinds ('{first}' and '{second}')")]
    MixedPredicates { first: String, second: String },

    #[error("tier '{label}' is out of severity order relative to '{previous}'")]
    OutOfOrder { label: String, previous: String },

    #[error("tiers '{first}' and '{second}' overlap")]
    Overlap { first: String, second: String },

    #[error("unknown tier '{tier}' referenced by {context}")]
    UnknownTier { tier: String, context: String },

    #[error("rule '{rule}' has priority 0 (priorities start at 1)")]
    ZeroPriority { rule: String },

    #[error("invalid rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("invalid message template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("invalid savings model: {0}")]
    InvalidSavings(String),

    #[error("invalid breakdown: {0}")]
    InvalidBreakdown(String),

    #[error("{0} must not be blank")]
    BlankSetting(String),

    #[error("invalid metric source: {0}")]
    InvalidMetric(String),

    #[error("flag_through_rank {rank} is outside the tier table (0..={max})")]
    FlagRankOutOfRange { rank: u32, max: u32 },
}

/// Why a single record could not be classified.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "field", rename_all = "snake_case")]
pub enum UnclassifiableReason {
    #[error("missing field '{0}'")]
    MissingField(String),

    #[error("field '{0}' is not a finite number")]
    InvalidNumber(String),

    #[error("field '{0}' is not a valid date")]
    InvalidDate(String),

    #[error("field '{0}' is zero, ratio is undefined")]
    ZeroDenominator(String),
}

impl UnclassifiableReason {
    /// Stable key used when summarising reasons.
    pub fn kind(&self) -> &'static str {
        match self {
            UnclassifiableReason::MissingField(_) => "missing_field",
            UnclassifiableReason::InvalidNumber(_) => "invalid_number",
            UnclassifiableReason::InvalidDate(_) => "invalid_date",
            UnclassifiableReason::ZeroDenominator(_) => "zero_denominator",
        }
    }
}

/// A record that was counted as unclassifiable instead of aborting the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnclassifiableRecordWarning {
    /// Position of the record in the input slice.
    pub index: usize,
    pub reason: UnclassifiableReason,
}

impl fmt::Display for UnclassifiableRecordWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record #{}: {}", self.index, self.reason)
    }
}

/// Failure reported by a [`crate::provider::DataProvider`].
#[derive(Error, Debug)]
pub enum DataProviderError {
    #[error("failed to read records from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse records: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected payload shape: {0}")]
    Shape(String),
}
