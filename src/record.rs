//! Raw input records and metric extraction.
//!
//! Records arrive as JSON objects from a data provider. The pipeline only
//! ever reads the fields a domain configuration names, so a record is kept
//! as an untyped map with typed accessors.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ConfigurationError, UnclassifiableReason};

/// One row supplied by a data provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(Map<String, Value>);

impl RawRecord {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style field setter.
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.insert(field.to_string(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Read a field as a finite number.
    ///
    /// Numeric strings are accepted since database drivers commonly
    /// serialize decimal columns that way.
    pub fn number(&self, field: &str) -> Result<f64, UnclassifiableReason> {
        let parsed = match self.0.get(field) {
            None | Some(Value::Null) => {
                return Err(UnclassifiableReason::MissingField(field.to_string()))
            }
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) if s.trim().is_empty() => {
                return Err(UnclassifiableReason::MissingField(field.to_string()))
            }
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            Some(_) => None,
        };

        match parsed {
            Some(v) if v.is_finite() => Ok(v),
            _ => Err(UnclassifiableReason::InvalidNumber(field.to_string())),
        }
    }

    /// Read a field as a calendar date.
    ///
    /// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` and RFC 3339 timestamps.
    pub fn date(&self, field: &str) -> Result<NaiveDate, UnclassifiableReason> {
        let raw = match self.0.get(field) {
            None | Some(Value::Null) => {
                return Err(UnclassifiableReason::MissingField(field.to_string()))
            }
            Some(Value::String(s)) => s.trim(),
            Some(_) => return Err(UnclassifiableReason::InvalidDate(field.to_string())),
        };

        if raw.is_empty() {
            return Err(UnclassifiableReason::MissingField(field.to_string()));
        }

        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|dt| dt.date()))
            .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.date_naive()))
            .map_err(|_| UnclassifiableReason::InvalidDate(field.to_string()))
    }

    /// Read a field as a grouping key (entity id, category, ...).
    pub fn key(&self, field: &str) -> Option<String> {
        match self.0.get(field)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl From<Map<String, Value>> for RawRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// How the classified metric is derived from a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricSource {
    /// The numeric value of one field.
    Field { field: String },
    /// Whole days from the reference date to a date field (negative when past).
    DaysUntil { field: String },
    /// `numerator / denominator * 100`.
    Ratio {
        numerator: String,
        denominator: String,
    },
    /// The field as a percentage of its total over all records.
    ShareOfTotal { field: String },
}

impl MetricSource {
    /// Reject blank field names.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let fields: Vec<&str> = match self {
            MetricSource::Field { field }
            | MetricSource::DaysUntil { field }
            | MetricSource::ShareOfTotal { field } => vec![field.as_str()],
            MetricSource::Ratio {
                numerator,
                denominator,
            } => vec![numerator.as_str(), denominator.as_str()],
        };

        if fields.iter().any(|f| f.trim().is_empty()) {
            return Err(ConfigurationError::InvalidMetric(
                "metric field names must not be blank".to_string(),
            ));
        }
        Ok(())
    }

    /// The field the metric is primarily read from.
    pub fn primary_field(&self) -> &str {
        match self {
            MetricSource::Field { field }
            | MetricSource::DaysUntil { field }
            | MetricSource::ShareOfTotal { field } => field,
            MetricSource::Ratio { numerator, .. } => numerator,
        }
    }

    /// Compute whatever batch-level context the metric needs.
    pub fn prepare(&self, records: &[RawRecord], reference_date: NaiveDate) -> MetricContext {
        let share_total = match self {
            MetricSource::ShareOfTotal { field } => Some(
                records
                    .iter()
                    .filter_map(|r| r.number(field).ok())
                    .sum::<f64>(),
            ),
            _ => None,
        };

        MetricContext {
            reference_date,
            share_total,
        }
    }

    /// Extract the metric for one record.
    pub fn extract(
        &self,
        record: &RawRecord,
        ctx: &MetricContext,
    ) -> Result<f64, UnclassifiableReason> {
        match self {
            MetricSource::Field { field } => record.number(field),
            MetricSource::DaysUntil { field } => {
                let date = record.date(field)?;
                Ok((date - ctx.reference_date).num_days() as f64)
            }
            MetricSource::Ratio {
                numerator,
                denominator,
            } => {
                let num = record.number(numerator)?;
                let den = record.number(denominator)?;
                if den == 0.0 {
                    return Err(UnclassifiableReason::ZeroDenominator(denominator.clone()));
                }
                Ok(num / den * 100.0)
            }
            MetricSource::ShareOfTotal { field } => {
                let value = record.number(field)?;
                match ctx.share_total {
                    Some(total) if total != 0.0 => Ok(value / total * 100.0),
                    _ => Err(UnclassifiableReason::ZeroDenominator(field.clone())),
                }
            }
        }
    }
}

/// Batch-level inputs for metric extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricContext {
    /// "Today" for `days_until` metrics.
    pub reference_date: NaiveDate,
    /// Field total for `share_of_total` metrics.
    pub share_total: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_number_accepts_numeric_strings() {
        let record = RawRecord::new()
            .with("a", 12.5)
            .with("b", " 7 ")
            .with("c", "abc")
            .with("d", Value::Null)
            .with("e", "NaN")
            .with("f", true);

        assert_eq!(record.number("a"), Ok(12.5));
        assert_eq!(record.number("b"), Ok(7.0));
        assert_eq!(
            record.number("c"),
            Err(UnclassifiableReason::InvalidNumber("c".to_string()))
        );
        assert_eq!(
            record.number("d"),
            Err(UnclassifiableReason::MissingField("d".to_string()))
        );
        assert_eq!(
            record.number("e"),
            Err(UnclassifiableReason::InvalidNumber("e".to_string()))
        );
        assert_eq!(
            record.number("f"),
            Err(UnclassifiableReason::InvalidNumber("f".to_string()))
        );
        assert_eq!(
            record.number("missing"),
            Err(UnclassifiableReason::MissingField("missing".to_string()))
        );
    }

    #[test]
    fn test_date_formats() {
        let record = RawRecord::new()
            .with("plain", "2026-03-10")
            .with("sql", "2026-03-10 08:30:00")
            .with("rfc", "2026-03-10T08:30:00Z")
            .with("bad", "10/03/2026")
            .with("num", 20260310);

        assert_eq!(record.date("plain"), Ok(date("2026-03-10")));
        assert_eq!(record.date("sql"), Ok(date("2026-03-10")));
        assert_eq!(record.date("rfc"), Ok(date("2026-03-10")));
        assert_eq!(
            record.date("bad"),
            Err(UnclassifiableReason::InvalidDate("bad".to_string()))
        );
        assert_eq!(
            record.date("num"),
            Err(UnclassifiableReason::InvalidDate("num".to_string()))
        );
    }

    #[test]
    fn test_key() {
        let record = RawRecord::new()
            .with("id", "LOT-1")
            .with("n", 42)
            .with("blank", "  ");
        assert_eq!(record.key("id"), Some("LOT-1".to_string()));
        assert_eq!(record.key("n"), Some("42".to_string()));
        assert_eq!(record.key("blank"), None);
        assert_eq!(record.key("absent"), None);
    }

    #[test]
    fn test_days_until() {
        let source = MetricSource::DaysUntil {
            field: "expiry_date".to_string(),
        };
        let ctx = source.prepare(&[], date("2026-01-10"));

        let future = RawRecord::new().with("expiry_date", "2026-01-13");
        let past = RawRecord::new().with("expiry_date", "2026-01-08");
        assert_eq!(source.extract(&future, &ctx), Ok(3.0));
        assert_eq!(source.extract(&past, &ctx), Ok(-2.0));
    }

    #[test]
    fn test_ratio_rejects_zero_denominator() {
        let source = MetricSource::Ratio {
            numerator: "discount".to_string(),
            denominator: "subtotal".to_string(),
        };
        let ctx = source.prepare(&[], date("2026-01-01"));

        let ok = RawRecord::new().with("discount", 25).with("subtotal", 100);
        let zero = RawRecord::new().with("discount", 5).with("subtotal", 0);
        assert_eq!(source.extract(&ok, &ctx), Ok(25.0));
        assert_eq!(
            source.extract(&zero, &ctx),
            Err(UnclassifiableReason::ZeroDenominator("subtotal".to_string()))
        );
    }

    #[test]
    fn test_share_of_total() {
        let source = MetricSource::ShareOfTotal {
            field: "tx".to_string(),
        };
        let records = vec![
            RawRecord::new().with("tx", 30),
            RawRecord::new().with("tx", 70),
            RawRecord::new().with("tx", "oops"),
        ];
        let ctx = source.prepare(&records, date("2026-01-01"));

        assert_eq!(ctx.share_total, Some(100.0));
        assert_eq!(source.extract(&records[0], &ctx), Ok(30.0));
        assert_eq!(source.extract(&records[1], &ctx), Ok(70.0));
        assert!(source.extract(&records[2], &ctx).is_err());
    }

    #[test]
    fn test_metric_source_from_json() {
        let source: MetricSource =
            serde_json::from_value(json!({"kind": "days_until", "field": "expiry_date"})).unwrap();
        assert_eq!(
            source,
            MetricSource::DaysUntil {
                field: "expiry_date".to_string()
            }
        );
        assert!(MetricSource::Field {
            field: " ".to_string()
        }
        .validate()
        .is_err());
    }
}
