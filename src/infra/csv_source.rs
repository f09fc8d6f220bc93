use async_trait::async_trait;
use csv::{ReaderBuilder, Trim};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

use crate::app::ports::SourcePort;
use crate::domain::{Dataset, Value};
use crate::error::{ConsolidatorError, Result};

/// Delimited-text file with a header row
pub struct CsvSource {
    name: String,
    path: PathBuf,
    delimiter: u8,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: format!("csv:{}", path.display()),
            path,
            delimiter: b',',
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parse CSV text into a dataset; short records are padded with nulls.
pub fn parse_csv(content: &[u8], delimiter: u8) -> Result<Dataset> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(Trim::Headers)
        .from_reader(content);

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let mut records = Vec::new();
    for record in reader.records() {
        let record = record?;
        records.push(record.iter().map(Value::from_cell).collect::<Vec<_>>());
    }
    debug!("Parsed {} CSV records with {} headers", records.len(), headers.len());
    Ok(Dataset::from_records(&headers, records))
}

#[async_trait]
impl SourcePort for CsvSource {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn extract(&self) -> Result<Dataset> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            ConsolidatorError::Extraction(format!("cannot read '{}': {}", self.path.display(), e))
        })?;
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Dataset::new());
        }
        let dataset = parse_csv(&bytes, self.delimiter)
            .map_err(|e| ConsolidatorError::Extraction(format!("malformed CSV: {}", e)))?;
        info!(
            "📄 Loaded {} rows × {} columns from {}",
            dataset.row_count(),
            dataset.column_count(),
            self.path.display()
        );
        Ok(dataset)
    }
}
