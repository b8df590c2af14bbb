//! Domain services.
//!
//! A [`DomainService`] pairs a [`SnapshotAssembler`] with the provider that
//! feeds it. Services for different domains share nothing and can run
//! concurrently.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{debug, error};

use crate::error::DataProviderError;
use crate::models::MetricsSnapshot;
use crate::provider::DataProvider;
use crate::snapshot::SnapshotAssembler;

/// One domain ready to produce snapshots.
pub struct DomainService {
    assembler: SnapshotAssembler,
    provider: Box<dyn DataProvider>,
}

impl DomainService {
    pub fn new(assembler: SnapshotAssembler, provider: Box<dyn DataProvider>) -> Self {
        Self {
            assembler,
            provider,
        }
    }

    pub fn domain(&self) -> &str {
        self.assembler.domain()
    }

    /// Fetch records and assemble a snapshot stamped with the current time.
    pub async fn snapshot(&self) -> Result<MetricsSnapshot, DataProviderError> {
        self.snapshot_at(Utc::now()).await
    }

    /// Fetch records and assemble a snapshot as of `computed_at`.
    ///
    /// Provider errors are returned as they are.
    pub async fn snapshot_at(
        &self,
        computed_at: DateTime<Utc>,
    ) -> Result<MetricsSnapshot, DataProviderError> {
        debug!(
            "Fetching '{}' records from {}",
            self.domain(),
            self.provider.name()
        );
        let records = self.provider.fetch().await?;
        Ok(self.assembler.assemble_at(&records, computed_at))
    }
}

/// Run every service concurrently, keeping input order in the output.
pub async fn run_all(
    services: &[DomainService],
    computed_at: DateTime<Utc>,
) -> Vec<Result<MetricsSnapshot, DataProviderError>> {
    let results = join_all(services.iter().map(|s| s.snapshot_at(computed_at))).await;

    for (service, result) in services.iter().zip(&results) {
        if let Err(e) = result {
            error!("Snapshot '{}' failed: {}", service.domain(), e);
        }
    }

    results
}
