//! Report output.

pub mod generator;

pub use generator::{generate_json_report, generate_markdown_report, generate_snapshot_section};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `{ success, data, timestamp }` wrapper expected by dashboard clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    pub data: T,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: T, timestamp: DateTime<Utc>) -> Self {
        Self {
            success: true,
            data,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_envelope_shape() {
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 8, 30, 0).unwrap();
        let envelope = ApiEnvelope::ok(vec![1, 2], at);
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(
            value,
            json!({
                "success": true,
                "data": [1, 2],
                "timestamp": "2024-01-15T08:30:00Z"
            })
        );
    }
}
