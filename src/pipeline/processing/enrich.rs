use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::config::{BucketMode, ConsolidationConfig, DerivedMetric, IndexComponent, MetricKind};
use crate::domain::{Dataset, Value};
use crate::error::{ConsolidatorError, Result};
use crate::observability::metrics;
use crate::pipeline::processing::stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricStatus {
    Computed,
    Failed,
}

/// Outcome of one derived metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricOutcome {
    pub name: String,
    pub kind: String,
    pub status: MetricStatus,
    /// Non-null share of the derived column
    pub completeness: f64,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentReport {
    pub outcomes: Vec<MetricOutcome>,
}

impl EnrichmentReport {
    pub fn computed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == MetricStatus::Computed)
            .count()
    }

    pub fn failed(&self) -> Vec<&MetricOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == MetricStatus::Failed)
            .collect()
    }
}

/// Trait for computing derived metrics from canonical columns
pub trait Enricher {
    /// Add derived columns to the dataset; per-metric failures are reported,
    /// not returned.
    fn enrich(&self, dataset: &mut Dataset) -> Result<EnrichmentReport>;
}

/// Computes the derived metrics declared in the catalog, in declaration order
pub struct DefaultEnricher {
    config: Arc<ConsolidationConfig>,
    reference_year: i32,
}

impl DefaultEnricher {
    pub fn new(config: Arc<ConsolidationConfig>) -> Self {
        Self {
            config,
            reference_year: Utc::now().year(),
        }
    }

    /// Pin the year used by `age` metrics without an explicit reference year.
    pub fn with_reference_year(mut self, year: i32) -> Self {
        self.reference_year = year;
        self
    }

    /// Only canonical and derived fields may feed a metric.
    fn check_declared(&self, field: &str) -> Result<()> {
        if self.config.group(field).is_some() || self.config.derived_metric(field).is_some() {
            return Ok(());
        }
        let reason = if self.config.source_fields().contains(field) {
            "is a raw source field"
        } else {
            "is not a canonical or derived field"
        };
        Err(ConsolidatorError::Enrichment(format!("input '{}' {}", field, reason)))
    }

    fn input<'a>(&self, dataset: &'a Dataset, field: &str) -> Result<&'a [Value]> {
        self.check_declared(field)?;
        dataset
            .column(field)
            .ok_or_else(|| ConsolidatorError::Enrichment(format!("input column '{}' is absent", field)))
    }

    fn compute(&self, dataset: &Dataset, metric: &DerivedMetric) -> Result<Vec<Value>> {
        match &metric.kind {
            MetricKind::Ratio {
                numerator,
                denominator,
            } => {
                let num = self.input(dataset, numerator)?;
                let den = self.input(dataset, denominator)?;
                Ok(ratio(num, den))
            }
            MetricKind::Bucket {
                source,
                cut_points,
                labels,
                mode,
            } => bucket(self.input(dataset, source)?, cut_points, labels, *mode),
            MetricKind::Index { components } => {
                for component in components {
                    self.check_declared(&component.field)?;
                }
                let available: Vec<(&IndexComponent, &[Value])> = components
                    .iter()
                    .filter_map(|c| dataset.column(&c.field).map(|values| (c, values)))
                    .collect();
                if available.is_empty() {
                    return Err(ConsolidatorError::Enrichment(
                        "none of the index components is present".to_string(),
                    ));
                }
                if available.len() < components.len() {
                    warn!(
                        "Index '{}' computed from {} of {} components",
                        metric.name,
                        available.len(),
                        components.len()
                    );
                }
                Ok(composite_index(&available, dataset.row_count()))
            }
            MetricKind::Lookup {
                source,
                table,
                default,
            } => Ok(lookup(self.input(dataset, source)?, table, *default)),
            MetricKind::Age {
                source,
                reference_year,
            } => Ok(age(
                self.input(dataset, source)?,
                reference_year.unwrap_or(self.reference_year),
            )),
        }
    }
}

impl Enricher for DefaultEnricher {
    #[instrument(skip(self, dataset), fields(rows = dataset.row_count()))]
    fn enrich(&self, dataset: &mut Dataset) -> Result<EnrichmentReport> {
        let mut report = EnrichmentReport::default();

        for metric in &self.config.enrichment.metrics {
            let kind = metric.kind.as_str();
            let computed = self
                .compute(dataset, metric)
                .and_then(|values| {
                    let completeness = stats::completeness(&values);
                    dataset.set_column(metric.name.clone(), values)?;
                    Ok(completeness)
                });
            let outcome = match computed {
                Ok(completeness) => {
                    metrics::enrich::metric_computed(kind);
                    MetricOutcome {
                        name: metric.name.clone(),
                        kind: kind.to_string(),
                        status: MetricStatus::Computed,
                        completeness,
                        message: None,
                    }
                }
                Err(e) => {
                    warn!("⚠️ Derived metric '{}' ({}) failed: {}", metric.name, kind, e);
                    metrics::enrich::metric_failed(kind);
                    MetricOutcome {
                        name: metric.name.clone(),
                        kind: kind.to_string(),
                        status: MetricStatus::Failed,
                        completeness: 0.0,
                        message: Some(e.to_string()),
                    }
                }
            };
            report.outcomes.push(outcome);
        }

        info!(
            "✨ Enrichment complete: {} computed, {} failed",
            report.computed(),
            report.failed().len()
        );
        Ok(report)
    }
}

/// `numerator / denominator`, null when either side is missing or the
/// denominator is not positive.
pub fn ratio(numerator: &[Value], denominator: &[Value]) -> Vec<Value> {
    numerator
        .iter()
        .zip(denominator)
        .map(|(n, d)| match (n.as_f64(), d.as_f64()) {
            (Some(n), Some(d)) if d > 0.0 => Value::from(n / d),
            _ => Value::Null,
        })
        .collect()
}

/// Label each value with the band it falls in. In quantile mode the cut
/// points are quantiles of the column, otherwise absolute values.
pub fn bucket(values: &[Value], cut_points: &[f64], labels: &[String], mode: BucketMode) -> Result<Vec<Value>> {
    if labels.len() != cut_points.len() + 1 {
        return Err(ConsolidatorError::Enrichment(format!(
            "{} labels for {} cut points",
            labels.len(),
            cut_points.len()
        )));
    }
    let thresholds: Vec<f64> = match mode {
        BucketMode::Absolute => cut_points.to_vec(),
        BucketMode::Quantile => {
            let numbers = stats::numeric_values(values);
            if numbers.is_empty() {
                return Err(ConsolidatorError::Enrichment(
                    "no numeric values to derive quantiles from".to_string(),
                ));
            }
            let mut sorted = numbers;
            sorted.sort_by(|a, b| a.total_cmp(b));
            cut_points
                .iter()
                .map(|q| stats::quantile_sorted(&sorted, *q))
                .collect()
        }
    };
    Ok(values
        .iter()
        .map(|v| match v.as_f64() {
            Some(x) => {
                let idx = thresholds.iter().take_while(|t| x >= **t).count();
                Value::Text(labels[idx].clone())
            }
            None => Value::Null,
        })
        .collect())
}

/// Weighted mean of min–max normalized signals, renormalized per row over the
/// signals present in that row. Always within [0, 1].
pub fn composite_index(components: &[(&IndexComponent, &[Value])], rows: usize) -> Vec<Value> {
    let ranges: Vec<Option<(f64, f64)>> = components
        .iter()
        .map(|(_, values)| stats::min_max(&stats::numeric_values(values)))
        .collect();

    (0..rows)
        .map(|row| {
            let mut weighted = 0.0;
            let mut weight_sum = 0.0;
            for ((component, values), range) in components.iter().zip(&ranges) {
                let (Some(x), Some((lo, hi))) = (values[row].as_f64(), range) else {
                    continue;
                };
                if component.weight <= 0.0 {
                    continue;
                }
                let mut norm = if hi > lo { (x - lo) / (hi - lo) } else { 0.5 };
                if component.invert {
                    norm = 1.0 - norm;
                }
                weighted += component.weight * norm;
                weight_sum += component.weight;
            }
            if weight_sum > 0.0 {
                Value::from((weighted / weight_sum).clamp(0.0, 1.0))
            } else {
                Value::Null
            }
        })
        .collect()
}

/// Case-insensitive static table lookup.
pub fn lookup(values: &[Value], table: &BTreeMap<String, f64>, default: Option<f64>) -> Vec<Value> {
    let normalized: BTreeMap<String, f64> = table
        .iter()
        .map(|(k, v)| (k.trim().to_lowercase(), *v))
        .collect();
    values
        .iter()
        .map(|v| match v.as_text() {
            Some(key) => normalized
                .get(&key.trim().to_lowercase())
                .copied()
                .or(default)
                .into(),
            None => Value::Null,
        })
        .collect()
}

/// Years elapsed since a year-valued (or datetime) column; future years are null.
pub fn age(values: &[Value], reference_year: i32) -> Vec<Value> {
    values
        .iter()
        .map(|v| {
            let year = match v {
                Value::DateTime(dt) => Some(dt.year()),
                other => other.as_f64().map(|y| y.round() as i32),
            };
            match year {
                Some(y) if y <= reference_year => Value::Int((reference_year - y) as i64),
                _ => Value::Null,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConsolidationGroup, DataType, MergeStrategy, SourceField};
    use crate::domain::Column;

    fn config(metrics: Vec<DerivedMetric>) -> Arc<ConsolidationConfig> {
        let mut config = ConsolidationConfig::with_groups(vec![
            ConsolidationGroup::new(
                "Prix",
                "price_final",
                DataType::Numeric,
                MergeStrategy::FirstValid,
                vec![SourceField::new("price")],
            ),
            ConsolidationGroup::new(
                "Surface",
                "surface_final",
                DataType::Numeric,
                MergeStrategy::FirstValid,
                vec![SourceField::new("surface")],
            ),
            ConsolidationGroup::new(
                "Canton",
                "region_final",
                DataType::Categorical,
                MergeStrategy::FirstValid,
                vec![SourceField::new("canton")],
            ),
        ]);
        config.enrichment.metrics = metrics;
        Arc::new(config)
    }

    fn dataset() -> Dataset {
        Dataset::from_columns(vec![
            Column::new(
                "price_final",
                vec![Value::Float(500000.0), Value::Float(1000000.0), Value::Null],
            ),
            Column::new(
                "surface_final",
                vec![Value::Float(100.0), Value::Float(0.0), Value::Float(50.0)],
            ),
            Column::new("region_final", vec!["Vaud".into(), "GENÈVE".into(), "Jura".into()]),
            Column::new("price", vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
        ])
        .unwrap()
    }

    fn ratio_metric() -> DerivedMetric {
        DerivedMetric::new(
            "price_per_m2",
            MetricKind::Ratio {
                numerator: "price_final".to_string(),
                denominator: "surface_final".to_string(),
            },
        )
    }

    #[test]
    fn test_ratio_nulls_non_positive_denominator() {
        let mut ds = dataset();
        let report = DefaultEnricher::new(config(vec![ratio_metric()]))
            .enrich(&mut ds)
            .unwrap();
        assert_eq!(report.computed(), 1);
        let column = ds.column("price_per_m2").unwrap();
        assert_eq!(column[0], Value::Float(5000.0));
        assert_eq!(column[1], Value::Null);
        assert_eq!(column[2], Value::Null);
    }

    #[test]
    fn test_raw_source_input_fails_only_that_metric() {
        let bad = DerivedMetric::new(
            "raw_ratio",
            MetricKind::Ratio {
                numerator: "price".to_string(),
                denominator: "surface_final".to_string(),
            },
        );
        let mut ds = dataset();
        let report = DefaultEnricher::new(config(vec![bad, ratio_metric()]))
            .enrich(&mut ds)
            .unwrap();
        assert_eq!(report.computed(), 1);
        let failed = report.failed();
        assert_eq!(failed.len(), 1);
        assert!(failed[0].message.as_deref().unwrap().contains("raw source"));
        assert!(!ds.has_column("raw_ratio"));
        assert!(ds.has_column("price_per_m2"));
    }

    #[test]
    fn test_absolute_buckets() {
        let values = vec![Value::Float(30.0), Value::Float(80.0), Value::Float(200.0), Value::Null];
        let labels: Vec<String> = ["small", "medium", "large"].iter().map(|s| s.to_string()).collect();
        let out = bucket(&values, &[50.0, 120.0], &labels, BucketMode::Absolute).unwrap();
        assert_eq!(
            out,
            vec![
                Value::from("small"),
                Value::from("medium"),
                Value::from("large"),
                Value::Null
            ]
        );
    }

    #[test]
    fn test_quantile_buckets_split_population() {
        let values: Vec<Value> = (1..=10).map(|v| Value::Float(v as f64)).collect();
        let labels: Vec<String> = ["low", "high"].iter().map(|s| s.to_string()).collect();
        let out = bucket(&values, &[0.5], &labels, BucketMode::Quantile).unwrap();
        let lows = out.iter().filter(|v| **v == Value::from("low")).count();
        assert_eq!(lows, 5);
    }

    #[test]
    fn test_composite_index_bounds_and_renormalization() {
        let a_values = vec![Value::Float(0.0), Value::Float(10.0), Value::Null];
        let b_values = vec![Value::Float(100.0), Value::Float(0.0), Value::Float(50.0)];
        let a = IndexComponent {
            field: "a".to_string(),
            weight: 1.0,
            invert: false,
        };
        let b = IndexComponent {
            field: "b".to_string(),
            weight: 3.0,
            invert: true,
        };
        let out = composite_index(&[(&a, &a_values), (&b, &b_values)], 3);
        // Row 0: a=0, b inverted=0 → 0. Row 1: a=1, b inverted=1 → 1.
        assert_eq!(out[0], Value::Float(0.0));
        assert_eq!(out[1], Value::Float(1.0));
        // Row 2 only has b (inverted 0.5), renormalized over its own weight.
        assert_eq!(out[2], Value::Float(0.5));
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut table = BTreeMap::new();
        table.insert("vaud".to_string(), 260.0);
        table.insert("Genève".to_string(), 2100.0);
        let values = vec![Value::from("VAUD"), Value::from("genève"), Value::from("Jura"), Value::Null];
        let out = lookup(&values, &table, Some(100.0));
        assert_eq!(out[0], Value::Float(260.0));
        assert_eq!(out[1], Value::Float(2100.0));
        assert_eq!(out[2], Value::Float(100.0));
        assert_eq!(out[3], Value::Null);
    }

    #[test]
    fn test_age_from_year() {
        let values = vec![Value::Int(1990), Value::Float(2030.0), Value::from("1875")];
        let out = age(&values, 2024);
        assert_eq!(out, vec![Value::Int(34), Value::Null, Value::Int(149)]);
    }

    #[test]
    fn test_missing_canonical_input_fails_metric() {
        let metric = DerivedMetric::new(
            "building_age",
            MetricKind::Age {
                source: "construction_year_final".to_string(),
                reference_year: Some(2024),
            },
        );
        let mut ds = dataset();
        let report = DefaultEnricher::new(config(vec![metric])).enrich(&mut ds).unwrap();
        assert_eq!(report.failed().len(), 1);
    }
}
