//! Cleaning phase: sanitation, imputation, bounds, de-duplication and dtype
//! normalization, each recorded in a [`CleaningReport`].

pub mod impute;
pub mod outliers;
pub mod text;

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::config::{ConsolidationConfig, DataType, FieldBounds, OutlierPolicy};
use crate::domain::{Dataset, Value};
use crate::error::{ConsolidatorError, Result};
use crate::observability::metrics;
use crate::pipeline::processing::stats;

pub use impute::{ImputationStats, ImputeMethod, ImputedColumn, RequiredFieldFlag};
pub use outliers::{BoundOrigin, BoundsAdjustment};
pub use text::{ColumnKind, SanitationStats};

/// Everything the Cleaner did to a dataset
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleaningReport {
    pub rows_in: usize,
    pub columns_in: usize,
    pub rows_out: usize,
    pub columns_out: usize,
    pub sanitation: SanitationStats,
    pub imputation: ImputationStats,
    pub bounds: Vec<BoundsAdjustment>,
    pub duplicates_dropped: usize,
    /// Text columns converted to numeric or datetime cells
    pub normalized_columns: Vec<String>,
}

impl CleaningReport {
    pub fn values_clipped(&self) -> usize {
        self.bounds.iter().map(|b| b.clipped).sum()
    }

    pub fn rows_excluded(&self) -> usize {
        self.bounds.iter().map(|b| b.rows_excluded).sum()
    }

    pub fn values_imputed(&self) -> usize {
        self.imputation.imputed.iter().map(|c| c.count).sum()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} placeholders nulled, {} values imputed ({} protected columns left with gaps), {} clipped, {} rows excluded, {} duplicates dropped",
            self.sanitation.placeholders_nulled,
            self.values_imputed(),
            self.imputation.skipped_protected.len(),
            self.values_clipped(),
            self.rows_excluded(),
            self.duplicates_dropped
        )
    }
}

pub struct Cleaner {
    config: Arc<ConsolidationConfig>,
}

impl Cleaner {
    pub fn new(config: Arc<ConsolidationConfig>) -> Self {
        Self { config }
    }

    #[instrument(skip(self, dataset), fields(rows = dataset.row_count(), columns = dataset.column_count()))]
    pub fn clean(&self, dataset: &mut Dataset) -> Result<CleaningReport> {
        if dataset.is_empty() {
            return Err(ConsolidatorError::Extraction(
                "source returned an empty dataset".to_string(),
            ));
        }
        let cleaning = &self.config.cleaning;
        let mut report = CleaningReport {
            rows_in: dataset.row_count(),
            columns_in: dataset.column_count(),
            ..Default::default()
        };

        // (a) sanitation
        let placeholders: HashSet<String> = cleaning
            .placeholder_tokens
            .iter()
            .map(|t| t.trim().to_lowercase())
            .collect();
        report.sanitation = text::sanitize(dataset, &placeholders);
        metrics::clean::placeholders_nulled(report.sanitation.placeholders_nulled);
        if dataset.is_empty() {
            return Err(ConsolidatorError::Extraction(
                "source returned only empty rows".to_string(),
            ));
        }

        // (b) imputation and required-field flags
        let finalized = self.finalized_fields();
        let mut protected = finalized.clone();
        protected.extend(self.config.source_fields().into_iter().map(str::to_string));
        report.imputation = impute::impute(dataset, &self.config, &protected);

        // (c) bounds
        report.bounds = self.bound_columns(dataset, &finalized);

        // (d) exact duplicates
        if cleaning.drop_duplicates {
            report.duplicates_dropped = drop_duplicates(dataset);
            metrics::clean::duplicates_dropped(report.duplicates_dropped);
        }

        // (e) dtype normalization
        report.normalized_columns = text::normalize_dtypes(
            dataset,
            cleaning.numeric_coercion_ratio,
            |name| self.keeps_raw_text(name),
        );

        report.rows_out = dataset.row_count();
        report.columns_out = dataset.column_count();
        info!("🧹 Cleaning complete: {}", report.summary());
        Ok(report)
    }

    /// Canonical and derived fields, already produced by an earlier run.
    fn finalized_fields(&self) -> HashSet<String> {
        self.config
            .groups
            .iter()
            .map(|g| g.canonical_field.clone())
            .chain(self.config.derived_fields().into_iter().map(str::to_string))
            .collect()
    }

    /// Text columns whose literal form matters (postal codes, free text) are
    /// not converted to numbers.
    fn keeps_raw_text(&self, column: &str) -> bool {
        self.config
            .group(column)
            .or_else(|| self.config.group_for_source(column))
            .map_or(false, |g| matches!(g.data_type, DataType::Categorical | DataType::Mixed))
    }

    /// Declared bounds for a column. Bounds on a canonical field carry over to
    /// each of its group's source columns, scaled by the source unit factor.
    pub fn static_bounds(&self, column: &str) -> Option<FieldBounds> {
        if let Some(bounds) = self.config.bounds_for(column) {
            return Some(bounds);
        }
        let group = self.config.group_for_source(column)?;
        let mut bounds = self.config.bounds_for(&group.canonical_field)?;
        let factor = group.source(column).map_or(1.0, |s| s.factor_or_one());
        bounds.field = column.to_string();
        bounds.min = bounds.min.map(|v| v / factor);
        bounds.max = bounds.max.map(|v| v / factor);
        Some(bounds)
    }

    fn iqr_applies(&self, column: &str, finalized: &HashSet<String>) -> bool {
        let cleaning = &self.config.cleaning;
        if !cleaning.iqr_enabled || finalized.contains(column) {
            return false;
        }
        if cleaning.iqr_exempt.iter().any(|e| e == column) {
            return false;
        }
        match self.config.group_for_source(column) {
            Some(group) => {
                group.data_type == DataType::Numeric
                    && !cleaning.iqr_exempt.iter().any(|e| *e == group.canonical_field)
            }
            None => true,
        }
    }

    fn bound_columns(&self, dataset: &mut Dataset, finalized: &HashSet<String>) -> Vec<BoundsAdjustment> {
        let cleaning = &self.config.cleaning;
        let mut adjustments = Vec::new();

        for name in dataset.column_names() {
            let Some(values) = dataset.column(&name) else {
                continue;
            };
            let declared = self.static_bounds(&name);
            let numbers = stats::numeric_values(values);
            if numbers.is_empty() {
                continue;
            }
            let iqr = if self.iqr_applies(&name, finalized)
                && numbers.len() >= cleaning.iqr_min_sample
                && text::column_kind(values, cleaning.numeric_coercion_ratio) == Some(ColumnKind::Numeric)
            {
                outliers::iqr_bounds(&numbers, cleaning.iqr_multiplier)
            } else {
                None
            };
            let Some((lower, upper, origin)) =
                outliers::combine(declared.as_ref().map(|b| (b.min, b.max)), iqr)
            else {
                continue;
            };

            let mask = outliers::violations(values, lower, upper);
            let violating = mask.iter().filter(|v| **v).count();
            if violating == 0 {
                continue;
            }
            let mut adjustment = BoundsAdjustment {
                column: name.clone(),
                lower,
                upper,
                origin,
                clipped: 0,
                rows_excluded: 0,
            };

            let policy = declared.map(|b| b.policy).unwrap_or_default();
            match policy {
                OutlierPolicy::Exclude { tolerance }
                    if violating as f64 / numbers.len() as f64 > tolerance =>
                {
                    let keep: Vec<bool> = mask.iter().map(|v| !v).collect();
                    dataset.retain_rows(&keep);
                    adjustment.rows_excluded = violating;
                    metrics::clean::rows_excluded(&name, violating);
                    info!(
                        "🚫 Excluded {} rows violating bounds of '{}' (above {:.0}% tolerance)",
                        violating,
                        name,
                        tolerance * 100.0
                    );
                }
                _ => {
                    if let Some(column) = dataset.column_mut(&name) {
                        adjustment.clipped = outliers::clip(column, lower, upper);
                    }
                    metrics::clean::values_clipped(&name, adjustment.clipped);
                    debug!(
                        "Clipped {} values of '{}' to [{:?}, {:?}]",
                        adjustment.clipped, name, lower, upper
                    );
                }
            }
            adjustments.push(adjustment);
        }
        adjustments
    }
}

/// SHA-256 over the `(column, value)` pairs of a row.
pub fn row_fingerprint(names: &[String], values: &[&Value]) -> String {
    let mut hasher = Sha256::new();
    for (name, value) in names.iter().zip(values) {
        hasher.update(name.as_bytes());
        hasher.update([0x1f]);
        hasher.update(value.key().as_bytes());
        hasher.update([0x1e]);
    }
    hex::encode(hasher.finalize())
}

/// Drop exact duplicate rows, keeping the first occurrence.
pub fn drop_duplicates(dataset: &mut Dataset) -> usize {
    let names = dataset.column_names();
    let mut seen = HashSet::new();
    let keep: Vec<bool> = (0..dataset.row_count())
        .map(|i| seen.insert(row_fingerprint(&names, &dataset.row_values(i))))
        .collect();
    let dropped = keep.iter().filter(|k| !**k).count();
    if dropped > 0 {
        dataset.retain_rows(&keep);
    }
    dropped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConsolidationGroup, GeoSettings, MergeStrategy, SourceField};
    use crate::domain::Column;

    fn config() -> Arc<ConsolidationConfig> {
        let mut config = ConsolidationConfig::with_groups(vec![
            ConsolidationGroup::new(
                "Latitude",
                "latitude_final",
                DataType::Numeric,
                MergeStrategy::FirstValid,
                vec![SourceField::new("latitude"), SourceField::new("lat")],
            ),
            ConsolidationGroup::new(
                "Surface",
                "surface_final",
                DataType::Numeric,
                MergeStrategy::FirstValid,
                vec![
                    SourceField::new("surface"),
                    SourceField::with_factor("living_area", 0.092903),
                ],
            ),
            ConsolidationGroup::new(
                "Chambres",
                "bedrooms_final",
                DataType::Numeric,
                MergeStrategy::FirstValid,
                vec![SourceField::new("bedrooms")],
            ),
        ]);
        config.geo = Some(GeoSettings {
            latitude_field: "latitude_final".to_string(),
            longitude_field: "longitude_final".to_string(),
            min_latitude: 45.0,
            max_latitude: 47.5,
            min_longitude: 5.0,
            max_longitude: 11.0,
        });
        config
            .cleaning
            .bounds
            .push(FieldBounds::new("surface_final", Some(10.0), Some(5000.0)));
        let mut bedrooms = FieldBounds::new("bedrooms_final", Some(0.0), Some(30.0));
        bedrooms.policy = OutlierPolicy::Exclude { tolerance: 0.2 };
        config.cleaning.bounds.push(bedrooms);
        Arc::new(config)
    }

    #[test]
    fn test_empty_dataset_is_extraction_error() {
        let cleaner = Cleaner::new(config());
        let err = cleaner.clean(&mut Dataset::new()).unwrap_err();
        assert!(matches!(err, ConsolidatorError::Extraction(_)));
    }

    #[test]
    fn test_geo_bounds_clip_source_columns() {
        let cleaner = Cleaner::new(config());
        let mut ds = Dataset::from_columns(vec![Column::new("latitude", vec![Value::Float(90.0)])]).unwrap();
        let report = cleaner.clean(&mut ds).unwrap();
        assert_eq!(ds.column("latitude").unwrap()[0], Value::Float(47.5));
        assert_eq!(report.values_clipped(), 1);
        assert_eq!(report.bounds[0].origin, BoundOrigin::Static);
    }

    #[test]
    fn test_group_sources_keep_gaps_and_report_them() {
        let cleaner = Cleaner::new(config());
        let mut ds = Dataset::from_columns(vec![
            Column::new("ref", vec!["a".into(), "b".into(), "c".into()]),
            Column::new("surface", vec![Value::Int(100), Value::Null, Value::Int(80)]),
            Column::new("rooms", vec![Value::Int(2), Value::Null, Value::Int(4)]),
        ])
        .unwrap();
        let report = cleaner.clean(&mut ds).unwrap();

        assert_eq!(ds.column("surface").unwrap()[1], Value::Null);
        assert_eq!(ds.column("rooms").unwrap()[1], Value::Int(3));
        assert_eq!(report.imputation.skipped_protected, vec!["surface".to_string()]);
        assert!(report.summary().contains("1 protected columns left with gaps"));
    }

    #[test]
    fn test_canonical_bounds_scale_by_unit_factor() {
        let cleaner = Cleaner::new(config());
        let bounds = cleaner.static_bounds("living_area").unwrap();
        assert!((bounds.max.unwrap() - 5000.0 / 0.092903).abs() < 1e-6);
        assert!((bounds.min.unwrap() - 10.0 / 0.092903).abs() < 1e-6);
        assert!(cleaner.static_bounds("unrelated").is_none());
    }

    #[test]
    fn test_exclusion_above_tolerance_drops_rows() {
        let cleaner = Cleaner::new(config());
        let mut ds = Dataset::from_columns(vec![
            Column::new(
                "bedrooms",
                vec![Value::Int(2), Value::Int(99), Value::Int(3), Value::Int(120)],
            ),
            Column::new("ref", vec!["a".into(), "b".into(), "c".into(), "d".into()]),
        ])
        .unwrap();
        let report = cleaner.clean(&mut ds).unwrap();
        assert_eq!(report.rows_excluded(), 2);
        assert_eq!(ds.row_count(), 2);
        assert_eq!(ds.column("ref").unwrap(), &[Value::from("a"), Value::from("c")]);
    }

    #[test]
    fn test_exclusion_below_tolerance_clips() {
        let cleaner = Cleaner::new(config());
        let mut values: Vec<Value> = (0..9).map(|i| Value::Int(i % 4)).collect();
        values.push(Value::Int(45));
        let ids: Vec<Value> = (0..10).map(Value::Int).collect();
        let mut ds = Dataset::from_columns(vec![Column::new("bedrooms", values), Column::new("ref", ids)]).unwrap();
        let report = cleaner.clean(&mut ds).unwrap();
        assert_eq!(report.rows_excluded(), 0);
        assert_eq!(ds.row_count(), 10);
        assert!(ds
            .column("bedrooms")
            .unwrap()
            .iter()
            .all(|v| v.as_f64().map_or(false, |x| (0.0..=30.0).contains(&x))));
    }

    #[test]
    fn test_duplicates_dropped_keep_first() {
        let mut ds = Dataset::from_columns(vec![
            Column::new("a", vec![Value::Int(1), Value::Int(1), Value::Int(2)]),
            Column::new("b", vec!["x".into(), "x".into(), "x".into()]),
        ])
        .unwrap();
        assert_eq!(drop_duplicates(&mut ds), 1);
        assert_eq!(ds.row_count(), 2);
    }

    #[test]
    fn test_fingerprint_distinguishes_column_placement() {
        let names = vec!["a".to_string(), "b".to_string()];
        let one = Value::Int(1);
        let null = Value::Null;
        assert_ne!(
            row_fingerprint(&names, &[&one, &null]),
            row_fingerprint(&names, &[&null, &one])
        );
    }
}
