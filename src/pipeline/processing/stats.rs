//! Small descriptive-statistics helpers shared by the processing phases.

use std::collections::HashMap;

use crate::domain::Value;

/// Quantile with linear interpolation between closest ranks (`q` in [0,1]).
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    Some(quantile_sorted(&sorted, q))
}

/// Same as [`quantile`] for an already sorted, non-empty slice.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

pub fn median(values: &[f64]) -> Option<f64> {
    quantile(values, 0.5)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    values.iter().copied().fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

/// Numeric readings of the non-null cells of a column.
pub fn numeric_values(values: &[Value]) -> Vec<f64> {
    values.iter().filter_map(Value::as_f64).collect()
}

/// Most frequent non-null value; ties go to the value seen first.
pub fn mode(values: &[Value]) -> Option<Value> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for (idx, value) in values.iter().enumerate() {
        if value.is_null() {
            continue;
        }
        let entry = counts.entry(value.key()).or_insert((0, idx));
        entry.0 += 1;
    }
    counts
        .into_values()
        .max_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))
        .map(|(_, first_idx)| values[first_idx].clone())
}

/// Share of non-null values that differ from the most frequent one.
/// `None` when there are no non-null values.
pub fn diversity(values: &[Value]) -> Option<f64> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut total = 0usize;
    for value in values.iter().filter(|v| !v.is_null()) {
        *counts.entry(value.key()).or_insert(0) += 1;
        total += 1;
    }
    if total == 0 {
        return None;
    }
    let dominant = counts.values().copied().max().unwrap_or(0);
    Some(1.0 - dominant as f64 / total as f64)
}

/// Distinct non-null values over non-null count.
pub fn uniqueness(values: &[Value]) -> Option<f64> {
    let present: Vec<String> = values.iter().filter(|v| !v.is_null()).map(Value::key).collect();
    if present.is_empty() {
        return None;
    }
    let distinct: std::collections::HashSet<&String> = present.iter().collect();
    Some(distinct.len() as f64 / present.len() as f64)
}

pub fn completeness(values: &[Value]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().filter(|v| !v.is_null()).count() as f64 / values.len() as f64
}
