//! The five quality checks. Each one reads the dataset and the catalog only,
//! so they can run in any order.

use chrono::Datelike;
use std::collections::BTreeMap;

use super::{QualityIssue, QualityIssueType};
use crate::config::{BusinessRule, ConsolidationConfig, DataType, Severity};
use crate::domain::{Dataset, Value};
use crate::error::{ConsolidatorError, Result};
use crate::pipeline::processing::stats;

/// Raw output of a check before it is placed on the status ladder
#[derive(Debug, Clone, Default)]
pub struct CheckOutput {
    pub score: f64,
    pub issues: Vec<QualityIssue>,
    pub details: BTreeMap<String, f64>,
}

impl CheckOutput {
    fn from_parts(parts: &[f64], issues: Vec<QualityIssue>, details: BTreeMap<String, f64>) -> Self {
        Self {
            score: stats::mean(parts).unwrap_or(1.0),
            issues,
            details,
        }
    }
}

fn ensure_rows(dataset: &Dataset) -> Result<()> {
    if dataset.row_count() == 0 {
        return Err(ConsolidatorError::Validation(
            "dataset has no rows to validate".to_string(),
        ));
    }
    Ok(())
}

fn pct(x: f64) -> String {
    format!("{:.1}%", x * 100.0)
}

/// Whether a present value reads as the declared type.
fn conforms(value: &Value, data_type: DataType) -> bool {
    match data_type {
        DataType::Numeric => value.as_f64().is_some(),
        DataType::Datetime => value.as_datetime().is_some(),
        DataType::Categorical | DataType::Mixed => true,
    }
}

fn share_passing(column: &[Value], keep: impl Fn(&Value) -> bool) -> Option<f64> {
    let present: Vec<&Value> = column.iter().filter(|v| !v.is_null()).collect();
    if present.is_empty() {
        return None;
    }
    Some(present.iter().filter(|v| keep(v)).count() as f64 / present.len() as f64)
}

/// Per-column completeness, uniqueness of identifier fields and declared-type
/// consistency. Each dimension scores the share of columns meeting its threshold.
pub fn basic_quality(dataset: &Dataset, config: &ConsolidationConfig) -> Result<CheckOutput> {
    ensure_rows(dataset)?;
    let q = &config.quality;
    let mut issues = Vec::new();
    let mut details = BTreeMap::new();

    let mut complete_ok = 0usize;
    for column in dataset.columns() {
        let completeness = column.completeness();
        details.insert(format!("completeness.{}", column.name), completeness);
        if completeness >= q.min_completeness {
            complete_ok += 1;
        } else {
            issues.push(
                QualityIssue::new(
                    QualityIssueType::MissingData,
                    Severity::Warning,
                    format!(
                        "completeness {} below {}",
                        pct(completeness),
                        pct(q.min_completeness)
                    ),
                )
                .on_field(&column.name)
                .rows(column.null_count()),
            );
        }
    }
    let mut parts = vec![complete_ok as f64 / dataset.column_count().max(1) as f64];

    let mut unique_checked = 0usize;
    let mut unique_ok = 0usize;
    for field in &q.unique_fields {
        let Some(uniqueness) = dataset.column(field).and_then(stats::uniqueness) else {
            continue;
        };
        unique_checked += 1;
        details.insert(format!("uniqueness.{}", field), uniqueness);
        if uniqueness >= q.min_uniqueness {
            unique_ok += 1;
        } else {
            issues.push(
                QualityIssue::new(
                    QualityIssueType::LowUniqueness,
                    Severity::Warning,
                    format!("uniqueness {} below {}", pct(uniqueness), pct(q.min_uniqueness)),
                )
                .on_field(field),
            );
        }
    }
    if unique_checked > 0 {
        parts.push(unique_ok as f64 / unique_checked as f64);
    }

    let mut typed_checked = 0usize;
    let mut typed_ok = 0usize;
    for column in dataset.columns() {
        let Some(data_type) = config.declared_type(&column.name) else {
            continue;
        };
        let Some(consistency) = share_passing(&column.values, |v| conforms(v, data_type)) else {
            continue;
        };
        typed_checked += 1;
        details.insert(format!("type_consistency.{}", column.name), consistency);
        if consistency >= q.min_type_consistency {
            typed_ok += 1;
        } else {
            let present = column.values.len() - column.null_count();
            issues.push(
                QualityIssue::new(
                    QualityIssueType::TypeInconsistency,
                    Severity::Warning,
                    format!("only {} of values read as {}", pct(consistency), data_type),
                )
                .on_field(&column.name)
                .rows(((1.0 - consistency) * present as f64).round() as usize),
            );
        }
    }
    if typed_checked > 0 {
        parts.push(typed_ok as f64 / typed_checked as f64);
    }

    Ok(CheckOutput::from_parts(&parts, issues, details))
}

/// Rows violating one business rule.
fn rule_violations(rule: &BusinessRule, column: &[Value]) -> (usize, usize, usize) {
    let allowed: Option<Vec<String>> = rule
        .allowed_values
        .as_ref()
        .map(|vals| vals.iter().map(|v| v.trim().to_lowercase()).collect());
    let mut missing = 0;
    let mut invalid = 0;
    let mut out_of_range = 0;
    for value in column {
        if value.is_null() {
            if rule.required {
                missing += 1;
            }
            continue;
        }
        if let Some(allowed) = &allowed {
            let text = value.as_text().unwrap_or_default().trim().to_lowercase();
            if !allowed.contains(&text) {
                invalid += 1;
                continue;
            }
        }
        if rule.min.is_some() || rule.max.is_some() {
            match value.as_f64() {
                Some(x) if rule.min.map_or(false, |m| x < m) || rule.max.map_or(false, |m| x > m) => {
                    out_of_range += 1
                }
                Some(_) => {}
                None => invalid += 1,
            }
        }
    }
    (missing, invalid, out_of_range)
}

/// Per-rule compliance: required presence, allowed values and numeric ranges.
pub fn business_rules(dataset: &Dataset, config: &ConsolidationConfig) -> Result<CheckOutput> {
    ensure_rows(dataset)?;
    let rows = dataset.row_count();
    let mut issues = Vec::new();
    let mut details = BTreeMap::new();
    let mut parts = Vec::new();

    for rule in &config.quality.business_rules {
        let Some(column) = dataset.column(&rule.field) else {
            if rule.required {
                issues.push(
                    QualityIssue::new(
                        QualityIssueType::MissingData,
                        rule.severity,
                        "required field is absent from the dataset",
                    )
                    .on_field(&rule.field)
                    .rows(rows),
                );
                details.insert(format!("compliance.{}", rule.field), 0.0);
                parts.push(0.0);
            }
            continue;
        };

        let (missing, invalid, out_of_range) = rule_violations(rule, column);
        let violating = missing + invalid + out_of_range;
        let compliance = 1.0 - violating as f64 / rows as f64;
        details.insert(format!("compliance.{}", rule.field), compliance);
        parts.push(compliance);

        for (count, issue_type, what) in [
            (missing, QualityIssueType::MissingData, "missing a required value"),
            (invalid, QualityIssueType::InvalidValue, "holding a value outside the allowed set"),
            (out_of_range, QualityIssueType::OutOfRange, "outside the allowed range"),
        ] {
            if count > 0 {
                issues.push(
                    QualityIssue::new(issue_type, rule.severity, format!("{} rows {}", count, what))
                        .on_field(&rule.field)
                        .rows(count),
                );
            }
        }
    }

    Ok(CheckOutput::from_parts(&parts, issues, details))
}

/// Read a year from either a plain number or a timestamp.
fn year_of(value: &Value) -> Option<i32> {
    match value.as_f64() {
        Some(x) if x.fract() == 0.0 && (0.0..10_000.0).contains(&x) => Some(x as i32),
        _ => value.as_datetime().map(|dt| dt.year()),
    }
}

/// Ratio anomalies against the median ratio, coordinates outside the covered
/// area and impossible years.
pub fn cross_field(dataset: &Dataset, config: &ConsolidationConfig, current_year: i32) -> Result<CheckOutput> {
    ensure_rows(dataset)?;
    let q = &config.quality;
    let mut issues = Vec::new();
    let mut details = BTreeMap::new();
    let mut parts = Vec::new();

    for check in &q.ratio_checks {
        let (Some(num), Some(den)) = (dataset.column(&check.numerator), dataset.column(&check.denominator)) else {
            continue;
        };
        let ratios: Vec<f64> = num
            .iter()
            .zip(den)
            .filter_map(|(n, d)| match (n.as_f64(), d.as_f64()) {
                (Some(n), Some(d)) if d > 0.0 => Some(n / d),
                _ => None,
            })
            .collect();
        let Some(median) = stats::median(&ratios).filter(|m| *m > 0.0) else {
            continue;
        };
        let anomalies = ratios
            .iter()
            .filter(|r| **r > median * check.factor || **r < median / check.factor)
            .count();
        let compliance = 1.0 - anomalies as f64 / ratios.len() as f64;
        let key = format!("ratio.{}/{}", check.numerator, check.denominator);
        details.insert(key, compliance);
        parts.push(compliance);
        if anomalies > 0 {
            issues.push(
                QualityIssue::new(
                    QualityIssueType::RatioAnomaly,
                    Severity::Warning,
                    format!(
                        "{} rows with {}/{} beyond {}x the median {:.2}",
                        anomalies, check.numerator, check.denominator, check.factor, median
                    ),
                )
                .on_field(&check.numerator)
                .rows(anomalies),
            );
        }
    }

    if let Some(geo) = &config.geo {
        if let (Some(lat), Some(lon)) = (
            dataset.column(&geo.latitude_field),
            dataset.column(&geo.longitude_field),
        ) {
            let coords: Vec<(f64, f64)> = lat
                .iter()
                .zip(lon)
                .filter_map(|(a, b)| Some((a.as_f64()?, b.as_f64()?)))
                .collect();
            if !coords.is_empty() {
                let outside = coords.iter().filter(|(a, b)| !geo.contains(*a, *b)).count();
                let compliance = 1.0 - outside as f64 / coords.len() as f64;
                details.insert("geo.in_bounds".to_string(), compliance);
                parts.push(compliance);
                if outside > 0 {
                    issues.push(
                        QualityIssue::new(
                            QualityIssueType::OutOfGeography,
                            Severity::Warning,
                            format!("{} rows with coordinates outside the covered area", outside),
                        )
                        .on_field(&geo.latitude_field)
                        .rows(outside),
                    );
                }
            }
        }
    }

    for check in &q.temporal_checks {
        let Some(column) = dataset.column(&check.field) else {
            continue;
        };
        let years: Vec<i32> = column.iter().filter_map(year_of).collect();
        if years.is_empty() {
            continue;
        }
        let bad = years
            .iter()
            .filter(|y| **y > current_year || check.min_year.map_or(false, |m| **y < m))
            .count();
        let compliance = 1.0 - bad as f64 / years.len() as f64;
        details.insert(format!("temporal.{}", check.field), compliance);
        parts.push(compliance);
        if bad > 0 {
            issues.push(
                QualityIssue::new(
                    QualityIssueType::TemporalInconsistency,
                    Severity::Warning,
                    format!("{} rows with an impossible year", bad),
                )
                .on_field(&check.field)
                .rows(bad),
            );
        }
    }

    Ok(CheckOutput::from_parts(&parts, issues, details))
}

/// Mean completeness over every expected canonical field, absent ones counting 0.
pub fn consolidation_coverage(dataset: &Dataset, config: &ConsolidationConfig) -> Result<CheckOutput> {
    ensure_rows(dataset)?;
    let expected = config.canonical_fields();
    let mut issues = Vec::new();
    let mut details = BTreeMap::new();
    let mut parts = Vec::with_capacity(expected.len());
    let mut present = 0usize;

    for field in &expected {
        match dataset.column_entry(field) {
            Some(column) => {
                present += 1;
                let completeness = column.completeness();
                details.insert(format!("completeness.{}", field), completeness);
                parts.push(completeness);
                if completeness < config.quality.min_completeness {
                    issues.push(
                        QualityIssue::new(
                            QualityIssueType::LowCoverage,
                            Severity::Warning,
                            format!("canonical field only {} complete", pct(completeness)),
                        )
                        .on_field(*field)
                        .rows(column.null_count()),
                    );
                }
            }
            None => {
                parts.push(0.0);
                issues.push(
                    QualityIssue::new(
                        QualityIssueType::MissingField,
                        Severity::Warning,
                        "canonical field was not produced",
                    )
                    .on_field(*field),
                );
            }
        }
    }
    if !expected.is_empty() {
        details.insert("coverage".to_string(), present as f64 / expected.len() as f64);
    }

    Ok(CheckOutput::from_parts(&parts, issues, details))
}

/// Presence, completeness and plausibility of every derived metric.
pub fn enrichment_coverage(dataset: &Dataset, config: &ConsolidationConfig) -> Result<CheckOutput> {
    ensure_rows(dataset)?;
    let mut issues = Vec::new();
    let mut details = BTreeMap::new();
    let mut parts = Vec::new();

    for metric in &config.enrichment.metrics {
        let Some(column) = dataset.column_entry(&metric.name) else {
            parts.push(0.0);
            issues.push(
                QualityIssue::new(
                    QualityIssueType::MissingField,
                    Severity::Warning,
                    "derived metric was not produced",
                )
                .on_field(&metric.name),
            );
            continue;
        };

        let completeness = column.completeness();
        let ranged = metric.plausible_min.is_some() || metric.plausible_max.is_some();
        let plausibility = if ranged {
            share_passing(&column.values, |v| {
                v.as_f64().map_or(false, |x| {
                    metric.plausible_min.map_or(true, |m| x >= m)
                        && metric.plausible_max.map_or(true, |m| x <= m)
                })
            })
            .unwrap_or(0.0)
        } else {
            1.0
        };
        let score = completeness * plausibility;
        details.insert(format!("completeness.{}", metric.name), completeness);
        details.insert(format!("plausibility.{}", metric.name), plausibility);
        parts.push(score);

        if completeness < config.quality.min_completeness || plausibility < 1.0 {
            let implausible = ((1.0 - plausibility) * (column.values.len() - column.null_count()) as f64).round() as usize;
            issues.push(
                QualityIssue::new(
                    QualityIssueType::LowCoverage,
                    Severity::Warning,
                    format!(
                        "{} complete, {} of values plausible",
                        pct(completeness),
                        pct(plausibility)
                    ),
                )
                .on_field(&metric.name)
                .rows(column.null_count() + implausible),
            );
        }
    }

    Ok(CheckOutput::from_parts(&parts, issues, details))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DerivedMetric, GeoSettings, MetricKind, RatioCheck, TemporalCheck};
    use crate::domain::Column;

    fn dataset(columns: Vec<(&str, Vec<Value>)>) -> Dataset {
        Dataset::from_columns(
            columns
                .into_iter()
                .map(|(name, values)| Column::new(name, values))
                .collect(),
        )
        .unwrap()
    }

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().map(|v| Value::Int(*v)).collect()
    }

    #[test]
    fn test_empty_dataset_errors() {
        let config = ConsolidationConfig::with_groups(Vec::new());
        assert!(basic_quality(&Dataset::new(), &config).is_err());
        assert!(enrichment_coverage(&Dataset::new(), &config).is_err());
    }

    #[test]
    fn test_basic_flags_incomplete_columns() {
        let config = ConsolidationConfig::with_groups(Vec::new());
        let ds = dataset(vec![
            ("full", ints(&[1, 2, 3, 4])),
            ("sparse", vec![Value::Int(1), Value::Null, Value::Null, Value::Null]),
        ]);
        let output = basic_quality(&ds, &config).unwrap();
        assert!((output.score - 0.5).abs() < 1e-9);
        assert_eq!(output.issues.len(), 1);
        assert_eq!(output.issues[0].field.as_deref(), Some("sparse"));
        assert_eq!(output.issues[0].affected_rows, 3);
    }

    #[test]
    fn test_business_rule_compliance() {
        let mut config = ConsolidationConfig::with_groups(Vec::new());
        let mut rule = BusinessRule::new("rooms_final");
        rule.min = Some(1.0);
        rule.max = Some(20.0);
        rule.severity = Severity::Error;
        let mut kind = BusinessRule::new("type_final");
        kind.allowed_values = Some(vec!["Apartment".into(), "House".into()]);
        config.quality.business_rules = vec![rule, kind];

        let ds = dataset(vec![
            ("rooms_final", ints(&[3, 4, 50, 2])),
            (
                "type_final",
                vec!["apartment".into(), "HOUSE".into(), "castle".into(), Value::Null],
            ),
        ]);
        let output = business_rules(&ds, &config).unwrap();
        // 3/4 and 3/4 compliant
        assert!((output.score - 0.75).abs() < 1e-9);
        let range = output
            .issues
            .iter()
            .find(|i| i.issue_type == QualityIssueType::OutOfRange)
            .unwrap();
        assert_eq!(range.severity, Severity::Error);
        assert_eq!(range.affected_rows, 1);
    }

    #[test]
    fn test_absent_required_rule_field_scores_zero() {
        let mut config = ConsolidationConfig::with_groups(Vec::new());
        let mut rule = BusinessRule::new("price_final");
        rule.required = true;
        config.quality.business_rules = vec![rule];
        let ds = dataset(vec![("other", ints(&[1, 2]))]);
        let output = business_rules(&ds, &config).unwrap();
        assert_eq!(output.score, 0.0);
    }

    #[test]
    fn test_cross_field_ratio_geo_and_temporal() {
        let mut config = ConsolidationConfig::with_groups(Vec::new());
        config.quality.ratio_checks = vec![RatioCheck {
            numerator: "price".into(),
            denominator: "surface".into(),
            factor: 3.0,
        }];
        config.quality.temporal_checks = vec![TemporalCheck {
            field: "year".into(),
            min_year: Some(1800),
        }];
        config.geo = Some(GeoSettings {
            latitude_field: "lat".into(),
            longitude_field: "lon".into(),
            min_latitude: 45.0,
            max_latitude: 47.5,
            min_longitude: 5.0,
            max_longitude: 11.0,
        });
        let ds = dataset(vec![
            ("price", ints(&[100_000, 110_000, 90_000, 1_000_000])),
            ("surface", ints(&[10, 11, 9, 10])),
            ("lat", vec![46.0.into(), 46.5.into(), 40.0.into(), 47.0.into()]),
            ("lon", vec![6.0.into(), 7.0.into(), 7.0.into(), 8.0.into()]),
            ("year", ints(&[1990, 2030, 2001, 1750])),
        ]);
        let output = cross_field(&ds, &config, 2024).unwrap();
        assert_eq!(output.details["ratio.price/surface"], 0.75);
        assert_eq!(output.details["geo.in_bounds"], 0.75);
        assert_eq!(output.details["temporal.year"], 0.5);
        assert_eq!(output.issues.len(), 3);
    }

    #[test]
    fn test_consolidation_coverage_counts_absent_fields_as_zero() {
        use crate::config::{ConsolidationGroup, MergeStrategy, SourceField};
        let group = |canonical: &str| {
            ConsolidationGroup::new(
                canonical,
                canonical,
                DataType::Numeric,
                MergeStrategy::FirstValid,
                vec![SourceField::new(format!("{}_src", canonical))],
            )
        };
        let config = ConsolidationConfig::with_groups(vec![group("a_final"), group("b_final")]);
        let ds = dataset(vec![("a_final", ints(&[1, 2]))]);
        let output = consolidation_coverage(&ds, &config).unwrap();
        assert!((output.score - 0.5).abs() < 1e-9);
        assert_eq!(output.details["coverage"], 0.5);
        assert_eq!(output.issues[0].issue_type, QualityIssueType::MissingField);
    }

    #[test]
    fn test_enrichment_plausibility() {
        let mut config = ConsolidationConfig::with_groups(Vec::new());
        config.enrichment.metrics = vec![DerivedMetric::new(
            "price_per_m2",
            MetricKind::Ratio {
                numerator: "price_final".into(),
                denominator: "surface_final".into(),
            },
        )
        .with_range(Some(1000.0), Some(30000.0))];
        let ds = dataset(vec![(
            "price_per_m2",
            vec![5000.0.into(), 7000.0.into(), 50.0.into(), 9000.0.into()],
        )]);
        let output = enrichment_coverage(&ds, &config).unwrap();
        assert!((output.score - 0.75).abs() < 1e-9);
        assert_eq!(output.issues.len(), 1);
    }
}
