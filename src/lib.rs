//! Tiersnap - tiered classification, aggregation and recommendation
//! snapshots for BI dashboards.
//!
//! The pipeline is the same for every domain:
//!
//! 1. a [`provider::DataProvider`] fetches raw records;
//! 2. a [`record::MetricSource`] extracts the metric from each record;
//! 3. a [`classifier::TierClassifier`] assigns it to a severity tier;
//! 4. [`analysis`] rolls records up per tier and along a breakdown;
//! 5. a [`recommendation::RecommendationEngine`] turns the totals into
//!    prioritized action items.
//!
//! [`snapshot::SnapshotAssembler`] runs steps 2 to 5 for one
//! [`domain::DomainConfig`] and returns a [`models::MetricsSnapshot`].
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use tiersnap::presets::Domain;
//! use tiersnap::record::RawRecord;
//! use tiersnap::snapshot::SnapshotAssembler;
//!
//! let assembler = SnapshotAssembler::new(&Domain::Payments.config()).unwrap();
//! let records: Vec<RawRecord> = [5000.0, 12000.0, 20000.0]
//!     .iter()
//!     .map(|total| RawRecord::new().with("total", *total))
//!     .collect();
//!
//! let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let snapshot = assembler.assemble_at(&records, at);
//! assert_eq!(snapshot.summary.flagged_count, 2);
//! assert_eq!(snapshot.summary.flagged_sum, 32000.0);
//! ```

pub mod analysis;
pub mod classifier;
pub mod domain;
pub mod error;
pub mod models;
pub mod presets;
pub mod provider;
pub mod recommendation;
pub mod record;
pub mod report;
pub mod service;
pub mod snapshot;

pub use classifier::TierClassifier;
pub use domain::DomainConfig;
pub use error::{ConfigurationError, DataProviderError, UnclassifiableRecordWarning};
pub use models::MetricsSnapshot;
pub use snapshot::SnapshotAssembler;
