use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::Dataset;
use crate::error::{ConsolidatorError, Result};
use crate::pipeline::orchestrator::RunReport;

/// Input collaborator: yields one rectangular dataset. An empty result is an
/// empty `Dataset`, never an error; unreachable sources are `Extraction` errors.
#[async_trait]
pub trait SourcePort: Send + Sync {
    fn name(&self) -> &str;
    async fn extract(&self) -> Result<Dataset>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
    GeoJson,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 3] = [ExportFormat::Csv, ExportFormat::Json, ExportFormat::GeoJson];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::GeoJson => "geojson",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = ConsolidatorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "geojson" => Ok(ExportFormat::GeoJson),
            other => Err(ConsolidatorError::Configuration(format!(
                "unknown export format '{}' (expected csv, json or geojson)",
                other
            ))),
        }
    }
}

/// Run metadata handed to output collaborators
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub config_version: String,
}

/// What an exporter reports back
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportOutcome {
    pub success: bool,
    pub formats_written: Vec<ExportFormat>,
    pub file_paths: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExportOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Output collaborator for the final dataset and the run report.
#[async_trait]
pub trait ExportPort: Send + Sync {
    async fn export(&self, dataset: &Dataset, meta: &RunMetadata) -> Result<ExportOutcome>;

    /// Persist the structured report and its rendered summary.
    async fn write_report(&self, report: &RunReport) -> Result<Vec<PathBuf>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_format_parsing() {
        assert_eq!("GeoJSON".parse::<ExportFormat>().unwrap(), ExportFormat::GeoJson);
        assert_eq!(" csv ".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!(matches!(
            "parquet".parse::<ExportFormat>(),
            Err(ConsolidatorError::Configuration(_))
        ));
    }
}
