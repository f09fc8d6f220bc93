use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::config::ConsolidationConfig;
use crate::domain::{Dataset, Value};
use crate::pipeline::processing::clean::drop_duplicates;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OptimizationReport {
    pub columns_before: usize,
    pub columns_after: usize,
    pub dropped_sparse: Vec<String>,
    pub dropped_constant: Vec<String>,
    pub downcast: Vec<String>,
    /// Rows left identical once sparse or constant columns were dropped
    pub duplicates_dropped: usize,
}

/// Final tidy-up of the processed table before export.
pub struct Optimizer {
    config: Arc<ConsolidationConfig>,
}

impl Optimizer {
    pub fn new(config: Arc<ConsolidationConfig>) -> Self {
        Self { config }
    }

    #[instrument(skip(self, dataset), fields(columns = dataset.column_count()))]
    pub fn optimize(&self, dataset: &mut Dataset) -> OptimizationReport {
        let settings = &self.config.optimize;
        let mut report = OptimizationReport {
            columns_before: dataset.column_count(),
            ..Default::default()
        };
        if !settings.enabled {
            report.columns_after = report.columns_before;
            return report;
        }

        let canonical = self.config.canonical_fields();
        let derived = self.config.derived_fields();
        let protected: HashSet<&str> = canonical.iter().chain(derived.iter()).copied().collect();

        for column in dataset.columns() {
            if protected.contains(column.name.as_str()) {
                continue;
            }
            if 1.0 - column.completeness() > settings.max_missing_rate {
                report.dropped_sparse.push(column.name.clone());
            } else if settings.drop_constant_columns && is_constant(&column.values) {
                report.dropped_constant.push(column.name.clone());
            }
        }
        let dropped: HashSet<&String> = report
            .dropped_sparse
            .iter()
            .chain(report.dropped_constant.iter())
            .collect();
        dataset.retain_columns(|c| !dropped.contains(&c.name));

        if settings.downcast_integral_floats {
            for name in dataset.column_names() {
                if let Some(values) = dataset.column_mut(&name) {
                    if downcast_integral(values) {
                        report.downcast.push(name);
                    }
                }
            }
        }

        let mut order: Vec<String> = canonical
            .iter()
            .chain(derived.iter())
            .filter(|f| dataset.has_column(f))
            .map(|f| f.to_string())
            .collect();
        order.extend(
            dataset
                .column_names()
                .into_iter()
                .filter(|n| !protected.contains(n.as_str())),
        );
        dataset.reorder_columns(&order);

        if self.config.cleaning.drop_duplicates {
            report.duplicates_dropped = drop_duplicates(dataset);
        }

        report.columns_after = dataset.column_count();
        debug!("Optimization details: {:?}", report);
        info!(
            "🧹 Optimized dataset: {} → {} columns ({} sparse, {} constant dropped, {} downcast, {} duplicate rows)",
            report.columns_before,
            report.columns_after,
            report.dropped_sparse.len(),
            report.dropped_constant.len(),
            report.downcast.len(),
            report.duplicates_dropped
        );
        report
    }
}

/// At most one distinct non-null value.
fn is_constant(values: &[Value]) -> bool {
    let mut first: Option<String> = None;
    for value in values.iter().filter(|v| !v.is_null()) {
        let key = value.key();
        match &first {
            None => first = Some(key),
            Some(k) if *k != key => return false,
            Some(_) => {}
        }
    }
    true
}

/// Rewrite a numeric column holding only whole floats as integers.
fn downcast_integral(values: &mut [Value]) -> bool {
    let mut has_float = false;
    for value in values.iter() {
        match value {
            Value::Null | Value::Int(_) => {}
            Value::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => has_float = true,
            _ => return false,
        }
    }
    if !has_float {
        return false;
    }
    for value in values.iter_mut() {
        if let Value::Float(f) = value {
            *value = Value::Int(*f as i64);
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConsolidationGroup, DataType, MergeStrategy, SourceField};
    use crate::domain::Column;

    fn config() -> Arc<ConsolidationConfig> {
        Arc::new(ConsolidationConfig::with_groups(vec![ConsolidationGroup::new(
            "Prix",
            "price_final",
            DataType::Numeric,
            MergeStrategy::FirstValid,
            vec![SourceField::new("price")],
        )]))
    }

    #[test]
    fn test_optimize_drops_orders_and_downcasts() {
        let mut ds = Dataset::from_columns(vec![
            Column::new("listing_ref", vec!["a".into(), "b".into(), "c".into()]),
            Column::new("country", vec!["CH".into(), "CH".into(), Value::Null]),
            Column::new("legacy", vec![Value::Null, Value::Null, Value::Int(1)]),
            Column::new(
                "price_final",
                vec![Value::Float(1000.0), Value::Float(2000.0), Value::Null],
            ),
        ])
        .unwrap();
        let mut cfg = (*config()).clone();
        cfg.optimize.max_missing_rate = 0.5;

        let report = Optimizer::new(Arc::new(cfg)).optimize(&mut ds);
        assert_eq!(report.dropped_sparse, vec!["legacy".to_string()]);
        assert_eq!(report.dropped_constant, vec!["country".to_string()]);
        assert_eq!(report.downcast, vec!["price_final".to_string()]);
        assert_eq!(ds.column_names(), vec!["price_final", "listing_ref"]);
        assert_eq!(ds.column("price_final").unwrap()[0], Value::Int(1000));
    }

    #[test]
    fn test_canonical_columns_are_never_dropped() {
        let mut ds = Dataset::from_columns(vec![
            Column::new("price_final", vec![Value::Null, Value::Null, Value::Null]),
            Column::new("ref", vec!["a".into(), "b".into(), "c".into()]),
        ])
        .unwrap();
        let report = Optimizer::new(config()).optimize(&mut ds);
        assert!(report.dropped_sparse.is_empty());
        assert!(ds.has_column("price_final"));
    }

    #[test]
    fn test_rows_left_identical_by_dropped_columns_are_removed() {
        let mut ds = Dataset::from_columns(vec![
            Column::new("price_final", vec![Value::Int(1000), Value::Int(1000), Value::Int(2000)]),
            Column::new("legacy", vec![Value::Int(1), Value::Null, Value::Null]),
        ])
        .unwrap();
        let mut cfg = (*config()).clone();
        cfg.optimize.max_missing_rate = 0.5;

        let report = Optimizer::new(Arc::new(cfg)).optimize(&mut ds);
        assert_eq!(report.dropped_sparse, vec!["legacy".to_string()]);
        assert_eq!(report.duplicates_dropped, 1);
        assert_eq!(ds.row_count(), 2);
    }

    #[test]
    fn test_fractional_floats_are_kept() {
        let mut values = vec![Value::Float(1.5), Value::Int(2)];
        assert!(!downcast_integral(&mut values));
        assert_eq!(values[0], Value::Float(1.5));
    }
}
