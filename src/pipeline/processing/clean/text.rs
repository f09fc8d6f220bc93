use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;

use crate::domain::{Dataset, InferredType, Value};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Counters for the sanitation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SanitationStats {
    pub values_trimmed: usize,
    pub placeholders_nulled: usize,
    pub empty_rows_dropped: usize,
    pub empty_columns_dropped: Vec<String>,
}

/// Trim and collapse internal whitespace runs to a single space.
pub fn normalize_text(raw: &str) -> String {
    WHITESPACE.replace_all(raw.trim(), " ").into_owned()
}

/// Normalize text cells, null out placeholder tokens, then drop rows and
/// columns that hold nothing but nulls.
pub fn sanitize(dataset: &mut Dataset, placeholders: &HashSet<String>) -> SanitationStats {
    let mut stats = SanitationStats::default();

    for name in dataset.column_names() {
        let Some(values) = dataset.column_mut(&name) else {
            continue;
        };
        for value in values.iter_mut() {
            let replacement = match value {
                Value::Text(text) => {
                    let normalized = normalize_text(text);
                    if placeholders.contains(&normalized.to_lowercase()) {
                        Some(Value::Null)
                    } else if normalized != *text {
                        Some(Value::Text(normalized))
                    } else {
                        None
                    }
                }
                _ => None,
            };
            if let Some(replacement) = replacement {
                if replacement.is_null() {
                    stats.placeholders_nulled += 1;
                } else {
                    stats.values_trimmed += 1;
                }
                *value = replacement;
            }
        }
    }

    stats.empty_columns_dropped = dataset
        .columns()
        .iter()
        .filter(|c| c.is_all_null())
        .map(|c| c.name.clone())
        .collect();
    dataset.retain_columns(|c| !c.is_all_null());

    let keep: Vec<bool> = (0..dataset.row_count())
        .map(|i| dataset.row_values(i).iter().any(|v| !v.is_null()))
        .collect();
    stats.empty_rows_dropped = keep.iter().filter(|k| !**k).count();
    if stats.empty_rows_dropped > 0 {
        dataset.retain_rows(&keep);
    }

    stats
}

/// Storage kind a column should be normalized to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Datetime,
    Categorical,
}

/// Kind of a column judged from its non-null values: numeric or datetime when
/// at least `ratio` of them read as such, categorical otherwise.
pub fn column_kind(values: &[Value], ratio: f64) -> Option<ColumnKind> {
    let (mut present, mut numeric, mut datetime) = (0usize, 0usize, 0usize);
    for value in values {
        match value.infer_type() {
            None => continue,
            Some(InferredType::Numeric) => numeric += 1,
            Some(InferredType::Datetime) => datetime += 1,
            Some(InferredType::Categorical) => {}
        }
        present += 1;
    }
    if present == 0 {
        return None;
    }
    let share = |n: usize| n as f64 / present as f64;
    if share(numeric) >= ratio {
        Some(ColumnKind::Numeric)
    } else if share(datetime) >= ratio {
        Some(ColumnKind::Datetime)
    } else {
        Some(ColumnKind::Categorical)
    }
}

/// Integral readings become `Int`, the rest `Float`.
pub fn number_value(v: f64) -> Value {
    if v.fract() == 0.0 && v.abs() < 9.0e15 {
        Value::Int(v as i64)
    } else {
        Value::from(v)
    }
}

fn to_number(value: &Value) -> Value {
    value.as_f64().map(number_value).unwrap_or(Value::Null)
}

fn to_datetime(value: &Value) -> Value {
    value.as_datetime().map(Value::DateTime).unwrap_or(Value::Null)
}

/// Convert text cells of numeric- and datetime-looking columns to typed
/// values. Columns for which `skip` returns true are left alone.
pub fn normalize_dtypes<F: Fn(&str) -> bool>(dataset: &mut Dataset, ratio: f64, skip: F) -> Vec<String> {
    let mut converted = Vec::new();
    for name in dataset.column_names() {
        if skip(&name) {
            continue;
        }
        let Some(values) = dataset.column_mut(&name) else {
            continue;
        };
        if !values.iter().any(|v| matches!(v, Value::Text(_))) {
            continue;
        }
        let convert: fn(&Value) -> Value = match column_kind(values, ratio) {
            Some(ColumnKind::Numeric) => to_number,
            Some(ColumnKind::Datetime) => to_datetime,
            _ => continue,
        };
        for value in values.iter_mut() {
            if matches!(value, Value::Text(_)) {
                *value = convert(value);
            }
        }
        converted.push(name);
    }
    converted
}
