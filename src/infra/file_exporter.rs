use async_trait::async_trait;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use crate::app::ports::{ExportFormat, ExportOutcome, ExportPort, RunMetadata};
use crate::config::GeoSettings;
use crate::domain::Dataset;
use crate::error::{ConsolidatorError, Result};
use crate::observability::metrics;
use crate::pipeline::orchestrator::RunReport;

pub const REPORT_JSON: &str = "report.json";
pub const REPORT_MARKDOWN: &str = "report.md";

/// Writes the final dataset and the run report into one directory
pub struct FileExporter {
    output_dir: PathBuf,
    basename: String,
    formats: Vec<ExportFormat>,
    geo: Option<GeoSettings>,
}

impl FileExporter {
    pub fn new(output_dir: impl Into<PathBuf>, formats: Vec<ExportFormat>) -> Self {
        Self {
            output_dir: output_dir.into(),
            basename: "listings".to_string(),
            formats,
            geo: None,
        }
    }

    /// Coordinate fields used for the GeoJSON features.
    pub fn with_geo(mut self, geo: Option<GeoSettings>) -> Self {
        self.geo = geo;
        self
    }

    pub fn with_basename(mut self, basename: impl Into<String>) -> Self {
        self.basename = basename.into();
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn path_for(&self, format: ExportFormat) -> PathBuf {
        self.output_dir.join(format!("{}.{}", self.basename, format.as_str()))
    }

    fn render(&self, format: ExportFormat, dataset: &Dataset, meta: &RunMetadata) -> Result<Vec<u8>> {
        match format {
            ExportFormat::Csv => to_csv(dataset),
            ExportFormat::Json => {
                let document = json!({
                    "run_id": meta.run_id,
                    "generated_at": meta.started_at,
                    "config_version": meta.config_version,
                    "records": dataset.to_json_records(),
                });
                Ok(serde_json::to_vec_pretty(&document)?)
            }
            ExportFormat::GeoJson => {
                let geo = self.geo.as_ref().ok_or_else(|| {
                    ConsolidatorError::Validation("no geographic settings for GeoJSON export".into())
                })?;
                Ok(serde_json::to_vec_pretty(&to_geojson(dataset, geo)?)?)
            }
        }
    }
}

/// Serialize a dataset as CSV with a header row; nulls become empty cells.
pub fn to_csv(dataset: &Dataset) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(dataset.column_names())?;
    for idx in 0..dataset.row_count() {
        writer.write_record(dataset.row_values(idx).iter().map(|v| v.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|e| ConsolidatorError::Io(e.into_error()))
}

/// Point features for every row with both coordinates present.
pub fn to_geojson(dataset: &Dataset, geo: &GeoSettings) -> Result<serde_json::Value> {
    let (Some(lat), Some(lon)) = (
        dataset.column(&geo.latitude_field),
        dataset.column(&geo.longitude_field),
    ) else {
        return Err(ConsolidatorError::Validation(format!(
            "coordinate columns '{}'/'{}' are missing",
            geo.latitude_field, geo.longitude_field
        )));
    };

    let records = dataset.to_json_records();
    let features: Vec<serde_json::Value> = records
        .into_iter()
        .enumerate()
        .filter_map(|(idx, mut properties)| {
            let (y, x) = (lat[idx].as_f64()?, lon[idx].as_f64()?);
            properties.remove(&geo.latitude_field);
            properties.remove(&geo.longitude_field);
            Some(json!({
                "type": "Feature",
                "geometry": { "type": "Point", "coordinates": [x, y] },
                "properties": properties,
            }))
        })
        .collect();

    Ok(json!({ "type": "FeatureCollection", "features": features }))
}

#[async_trait]
impl ExportPort for FileExporter {
    #[instrument(skip(self, dataset, meta), fields(dir = %self.output_dir.display()))]
    async fn export(&self, dataset: &Dataset, meta: &RunMetadata) -> Result<ExportOutcome> {
        if let Err(e) = tokio::fs::create_dir_all(&self.output_dir).await {
            return Ok(ExportOutcome::failed(format!(
                "cannot create '{}': {}",
                self.output_dir.display(),
                e
            )));
        }

        let mut outcome = ExportOutcome {
            success: true,
            ..Default::default()
        };
        let mut errors = Vec::new();
        for format in &self.formats {
            let path = self.path_for(*format);
            let written = match self.render(*format, dataset, meta) {
                Ok(bytes) => tokio::fs::write(&path, bytes).await.map_err(ConsolidatorError::from),
                Err(e) => Err(e),
            };
            match written {
                Ok(()) => {
                    metrics::export::file_written(format.as_str());
                    info!("💾 Wrote {} export to {}", format, path.display());
                    outcome.formats_written.push(*format);
                    outcome.file_paths.push(path);
                }
                Err(e) => {
                    warn!("⚠️ {} export failed: {}", format, e);
                    errors.push(format!("{}: {}", format, e));
                }
            }
        }

        if !errors.is_empty() {
            outcome.success = false;
            outcome.error = Some(errors.join("; "));
        }
        Ok(outcome)
    }

    async fn write_report(&self, report: &RunReport) -> Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let json_path = self.output_dir.join(REPORT_JSON);
        let md_path = self.output_dir.join(REPORT_MARKDOWN);
        tokio::fs::write(&json_path, serde_json::to_vec_pretty(report)?).await?;
        tokio::fs::write(&md_path, report.render_markdown()).await?;
        info!("📝 Report written to {}", self.output_dir.display());
        Ok(vec![json_path, md_path])
    }
}
