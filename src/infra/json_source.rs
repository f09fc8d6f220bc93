use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{info, instrument};

use crate::app::ports::SourcePort;
use crate::domain::{Dataset, Row, Value};
use crate::error::{ConsolidatorError, Result};

/// JSON file holding either an array of objects or one object per line
pub struct JsonSource {
    name: String,
    path: PathBuf,
}

impl JsonSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: format!("json:{}", path.display()),
            path,
        }
    }
}

fn object_to_row(record: &serde_json::Value) -> Result<Row> {
    let serde_json::Value::Object(map) = record else {
        return Err(ConsolidatorError::Extraction(format!(
            "expected a JSON object per record, got {}",
            record
        )));
    };
    Ok(map
        .iter()
        .map(|(key, value)| (key.clone(), Value::from_json(value)))
        .collect())
}

/// Build a dataset from already parsed JSON records.
pub fn dataset_from_records(records: &[serde_json::Value]) -> Result<Dataset> {
    let rows = records.iter().map(object_to_row).collect::<Result<Vec<_>>>()?;
    Ok(Dataset::from_rows(rows))
}

/// Parse a JSON array of objects, or NDJSON when the text is not an array.
pub fn parse_json(content: &str) -> Result<Dataset> {
    let trimmed = content.trim_start();
    if trimmed.is_empty() {
        return Ok(Dataset::new());
    }
    if trimmed.starts_with('[') {
        let records: Vec<serde_json::Value> = serde_json::from_str(trimmed)?;
        return dataset_from_records(&records);
    }
    let records = trimmed
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(serde_json::from_str)
        .collect::<std::result::Result<Vec<serde_json::Value>, _>>()?;
    dataset_from_records(&records)
}

#[async_trait]
impl SourcePort for JsonSource {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn extract(&self) -> Result<Dataset> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ConsolidatorError::Extraction(format!("cannot read '{}': {}", self.path.display(), e))
        })?;
        let dataset = parse_json(&content).map_err(|e| match e {
            ConsolidatorError::Extraction(_) => e,
            other => ConsolidatorError::Extraction(format!("malformed JSON: {}", other)),
        })?;
        info!(
            "📄 Loaded {} rows × {} columns from {}",
            dataset.row_count(),
            dataset.column_count(),
            self.path.display()
        );
        Ok(dataset)
    }
}
