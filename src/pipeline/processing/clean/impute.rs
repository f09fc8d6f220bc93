use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, warn};

use super::text::{column_kind, number_value, ColumnKind};
use crate::config::{ConsolidationConfig, Severity};
use crate::domain::{Dataset, Value};
use crate::observability::metrics;
use crate::pipeline::processing::stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputeMethod {
    Median,
    Mode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImputedColumn {
    pub column: String,
    pub method: ImputeMethod,
    pub fill_value: Value,
    pub count: usize,
}

/// A required field missing more often than its threshold allows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequiredFieldFlag {
    pub field: String,
    pub missing_rate: f64,
    pub max_missing_rate: f64,
    pub severity: Severity,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImputationStats {
    pub imputed: Vec<ImputedColumn>,
    /// Columns too sparse to impute
    pub skipped_sparse: Vec<String>,
    /// Group sources, canonical and derived fields left with their gaps
    pub skipped_protected: Vec<String>,
    pub required_flags: Vec<RequiredFieldFlag>,
}

/// Fill missing cells: numeric columns by median, categorical by mode.
/// Columns in `protected` (group sources, canonical and derived fields) are
/// never imputed; datetime columns are left as they are.
pub fn impute(
    dataset: &mut Dataset,
    config: &ConsolidationConfig,
    protected: &HashSet<String>,
) -> ImputationStats {
    let mut report = ImputationStats::default();
    let max_missing = config.cleaning.max_impute_missing_rate;
    let ratio = config.cleaning.numeric_coercion_ratio;

    for name in dataset.column_names() {
        let Some(values) = dataset.column_mut(&name) else {
            continue;
        };
        let missing = values.iter().filter(|v| v.is_null()).count();
        if missing == 0 {
            continue;
        }
        if protected.contains(&name) {
            report.skipped_protected.push(name);
            continue;
        }
        if missing as f64 / values.len() as f64 > max_missing {
            report.skipped_sparse.push(name);
            continue;
        }

        let (method, fill) = match column_kind(values, ratio) {
            Some(ColumnKind::Numeric) => {
                let numbers = stats::numeric_values(values);
                let has_float = values.iter().any(|v| matches!(v, Value::Float(_)));
                let fill = match stats::median(&numbers) {
                    Some(m) if has_float => Value::from(m),
                    Some(m) => number_value(m),
                    None => continue,
                };
                (ImputeMethod::Median, fill)
            }
            Some(ColumnKind::Categorical) => match stats::mode(values) {
                Some(mode) => (ImputeMethod::Mode, mode),
                None => continue,
            },
            Some(ColumnKind::Datetime) | None => continue,
        };

        for value in values.iter_mut().filter(|v| v.is_null()) {
            *value = fill.clone();
        }
        metrics::clean::values_imputed(&name, missing);
        report.imputed.push(ImputedColumn {
            column: name,
            method,
            fill_value: fill,
            count: missing,
        });
    }

    if !report.skipped_protected.is_empty() {
        debug!(
            "Left {} protected columns unimputed: {:?}",
            report.skipped_protected.len(),
            report.skipped_protected
        );
    }
    report.required_flags = required_field_flags(dataset, config);
    report
}

/// Missing rate of `field`. When the field is a canonical column that does
/// not exist yet, a row counts as missing when every present source of its
/// group is null; with no present source at all the field is fully missing.
pub fn missing_rate(dataset: &Dataset, config: &ConsolidationConfig, field: &str) -> f64 {
    let rows = dataset.row_count();
    if rows == 0 {
        return 1.0;
    }
    if let Some(values) = dataset.column(field) {
        return 1.0 - stats::completeness(values);
    }
    let Some(group) = config.group(field) else {
        return 1.0;
    };
    let sources: Vec<&[Value]> = group
        .source_names()
        .filter_map(|s| dataset.column(s))
        .collect();
    if sources.is_empty() {
        return 1.0;
    }
    let missing = (0..rows)
        .filter(|&row| sources.iter().all(|col| col[row].is_null()))
        .count();
    missing as f64 / rows as f64
}

/// Flag (never drop) required fields whose missing rate exceeds their limit.
pub fn required_field_flags(dataset: &Dataset, config: &ConsolidationConfig) -> Vec<RequiredFieldFlag> {
    config
        .cleaning
        .required_fields
        .iter()
        .filter_map(|required| {
            let rate = missing_rate(dataset, config, &required.field);
            if rate <= required.max_missing_rate {
                return None;
            }
            warn!(
                "⚠️ Required field '{}' missing in {:.1}% of rows (limit {:.1}%, severity {})",
                required.field,
                rate * 100.0,
                required.max_missing_rate * 100.0,
                required.severity
            );
            metrics::clean::required_field_flagged(&required.field, &required.severity.to_string());
            Some(RequiredFieldFlag {
                field: required.field.clone(),
                missing_rate: rate,
                max_missing_rate: required.max_missing_rate,
                severity: required.severity,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConsolidationGroup, DataType, MergeStrategy, RequiredField, SourceField};
    use crate::domain::Column;

    fn config() -> ConsolidationConfig {
        let mut config = ConsolidationConfig::with_groups(vec![ConsolidationGroup::new(
            "Prix",
            "price_final",
            DataType::Numeric,
            MergeStrategy::FirstValid,
            vec![SourceField::new("price"), SourceField::new("prix")],
        )]);
        config.cleaning.required_fields.push(RequiredField {
            field: "price_final".to_string(),
            max_missing_rate: 0.1,
            severity: Severity::Error,
        });
        config
    }

    #[test]
    fn test_impute_median_and_mode_skip_protected() {
        let config = config();
        let mut ds = Dataset::from_columns(vec![
            Column::new("rooms", vec![Value::Int(2), Value::Null, Value::Int(4), Value::Int(3)]),
            Column::new("heating", vec!["gas".into(), "gas".into(), Value::Null, "oil".into()]),
            Column::new("price", vec![Value::Int(1), Value::Null, Value::Null, Value::Int(2)]),
        ])
        .unwrap();
        let protected: HashSet<String> = ["price".to_string()].into_iter().collect();
        let stats = impute(&mut ds, &config, &protected);

        assert_eq!(ds.column("rooms").unwrap()[1], Value::Int(3));
        assert_eq!(ds.column("heating").unwrap()[2], Value::from("gas"));
        assert_eq!(ds.column("price").unwrap()[1], Value::Null);
        assert_eq!(stats.imputed.len(), 2);
        assert_eq!(stats.skipped_protected, vec!["price".to_string()]);
    }

    #[test]
    fn test_sparse_columns_are_not_imputed() {
        let config = config();
        let mut ds = Dataset::from_columns(vec![Column::new(
            "floor",
            vec![Value::Int(1), Value::Null, Value::Null, Value::Null],
        )])
        .unwrap();
        let stats = impute(&mut ds, &config, &HashSet::new());
        assert_eq!(stats.skipped_sparse, vec!["floor".to_string()]);
        assert!(stats.skipped_protected.is_empty());
        assert_eq!(ds.column("floor").unwrap()[1], Value::Null);
    }

    #[test]
    fn test_required_field_measured_across_sources() {
        let config = config();
        let ds = Dataset::from_columns(vec![
            Column::new("price", vec![Value::Int(1), Value::Null, Value::Null, Value::Null]),
            Column::new("prix", vec![Value::Null, Value::Int(2), Value::Null, Value::Null]),
        ])
        .unwrap();
        assert_eq!(missing_rate(&ds, &config, "price_final"), 0.5);
        let flags = required_field_flags(&ds, &config);
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].severity, Severity::Error);
        // Flagging never removes data.
        assert_eq!(ds.row_count(), 4);
    }
}
