//! Data providers.
//!
//! A provider is the only asynchronous step of a snapshot: it fetches the
//! raw records for one domain. Payloads are either a JSON array of objects
//! or an object carrying such an array under `data`, the shape produced by
//! [`crate::report::ApiEnvelope`].

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use crate::error::DataProviderError;
use crate::record::RawRecord;

/// Source of raw records for one domain.
#[async_trait]
pub trait DataProvider: Send + Sync {
    async fn fetch(&self) -> Result<Vec<RawRecord>, DataProviderError>;

    /// Human-readable origin, used in logs.
    fn name(&self) -> String;
}

/// Records held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    records: Vec<RawRecord>,
}

impl InMemoryProvider {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl DataProvider for InMemoryProvider {
    async fn fetch(&self) -> Result<Vec<RawRecord>, DataProviderError> {
        Ok(self.records.clone())
    }

    fn name(&self) -> String {
        format!("memory ({} records)", self.records.len())
    }
}

/// Records read from a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileProvider {
    path: PathBuf,
}

impl JsonFileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DataProvider for JsonFileProvider {
    async fn fetch(&self) -> Result<Vec<RawRecord>, DataProviderError> {
        let content =
            tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|source| DataProviderError::Io {
                    path: self.path.display().to_string(),
                    source,
                })?;

        let records = parse_records(serde_json::from_str(&content)?)?;
        debug!("Read {} records from {}", records.len(), self.path.display());
        Ok(records)
    }

    fn name(&self) -> String {
        self.path.display().to_string()
    }
}

/// Records fetched with an HTTP GET.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    url: String,
    client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(url: impl Into<String>, timeout_seconds: u64) -> Result<Self, DataProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;

        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl DataProvider for HttpProvider {
    async fn fetch(&self) -> Result<Vec<RawRecord>, DataProviderError> {
        let payload: Value = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let records = parse_records(payload)?;
        debug!("Fetched {} records from {}", records.len(), self.url);
        Ok(records)
    }

    fn name(&self) -> String {
        self.url.clone()
    }
}

/// Accept a bare array of objects or an object with a `data` array.
pub fn parse_records(payload: Value) -> Result<Vec<RawRecord>, DataProviderError> {
    let items = match payload {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(DataProviderError::Shape(
                    "'data' is not an array".to_string(),
                ))
            }
            None => {
                return Err(DataProviderError::Shape(
                    "object payload has no 'data' array".to_string(),
                ))
            }
        },
        other => {
            return Err(DataProviderError::Shape(format!(
                "expected an array or an object, got {}",
                json_kind(&other)
            )))
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(map) => Ok(RawRecord::from(map)),
            other => Err(DataProviderError::Shape(format!(
                "item {} is {}, expected an object",
                i,
                json_kind(&other)
            ))),
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_records_shapes() {
        let bare = parse_records(json!([{"a": 1}, {"a": 2}])).unwrap();
        assert_eq!(bare.len(), 2);

        let wrapped = parse_records(json!({"success": true, "data": [{"a": 1}]})).unwrap();
        assert_eq!(wrapped[0].number("a"), Ok(1.0));

        assert!(matches!(
            parse_records(json!({"rows": []})),
            Err(DataProviderError::Shape(_))
        ));
        assert!(matches!(
            parse_records(json!([1, 2])),
            Err(DataProviderError::Shape(_))
        ));
        assert!(matches!(
            parse_records(json!("nope")),
            Err(DataProviderError::Shape(_))
        ));
    }

    #[test]
    fn test_in_memory_provider() {
        let provider = InMemoryProvider::new(vec![RawRecord::new().with("a", 1)]);
        let records = tokio_test::block_on(provider.fetch()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(provider.name(), "memory (1 records)");
    }

    #[tokio::test]
    async fn test_json_file_provider() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lots.json");
        std::fs::write(&path, r#"{"data": [{"lot_id": "L1", "lot_value": 120.5}]}"#).unwrap();

        let records = JsonFileProvider::new(&path).fetch().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key("lot_id"), Some("L1".to_string()));
    }

    #[tokio::test]
    async fn test_json_file_provider_errors() {
        let missing = JsonFileProvider::new("/nonexistent/tiersnap.json");
        assert!(matches!(
            missing.fetch().await,
            Err(DataProviderError::Io { .. })
        ));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "[{").unwrap();
        assert!(matches!(
            JsonFileProvider::new(&path).fetch().await,
            Err(DataProviderError::Parse(_))
        ));
    }
}
