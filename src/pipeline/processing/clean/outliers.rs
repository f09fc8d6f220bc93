use serde::Serialize;

use crate::domain::Value;
use crate::pipeline::processing::stats;

/// Where the effective bounds of a column came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundOrigin {
    Static,
    Iqr,
    Combined,
}

/// One column whose values were clipped or whose rows were excluded
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundsAdjustment {
    pub column: String,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub origin: BoundOrigin,
    pub clipped: usize,
    pub rows_excluded: usize,
}

/// Tukey fences `[Q1 - k·IQR, Q3 + k·IQR]`. A zero spread yields no fences,
/// otherwise every value off the dominant one would be clipped onto it.
pub fn iqr_bounds(values: &[f64], k: f64) -> Option<(f64, f64)> {
    let q1 = stats::quantile(values, 0.25)?;
    let q3 = stats::quantile(values, 0.75)?;
    let iqr = q3 - q1;
    if iqr <= 0.0 {
        return None;
    }
    Some((q1 - k * iqr, q3 + k * iqr))
}

/// Intersect static and IQR bounds. When the intersection is empty the
/// static bounds win.
pub fn combine(
    declared: Option<(Option<f64>, Option<f64>)>,
    iqr: Option<(f64, f64)>,
) -> Option<(Option<f64>, Option<f64>, BoundOrigin)> {
    match (declared, iqr) {
        (None, None) => None,
        (Some((lo, hi)), None) => Some((lo, hi, BoundOrigin::Static)),
        (None, Some((lo, hi))) => Some((Some(lo), Some(hi), BoundOrigin::Iqr)),
        (Some((s_lo, s_hi)), Some((i_lo, i_hi))) => {
            let lower = Some(s_lo.map_or(i_lo, |s| s.max(i_lo)));
            let upper = Some(s_hi.map_or(i_hi, |s| s.min(i_hi)));
            match (lower, upper) {
                (Some(lo), Some(hi)) if lo > hi => Some((s_lo, s_hi, BoundOrigin::Static)),
                _ => Some((lower, upper, BoundOrigin::Combined)),
            }
        }
    }
}

pub fn is_violation(value: f64, lower: Option<f64>, upper: Option<f64>) -> bool {
    lower.map_or(false, |lo| value < lo) || upper.map_or(false, |hi| value > hi)
}

/// Row mask of numeric cells lying outside the bounds.
pub fn violations(values: &[Value], lower: Option<f64>, upper: Option<f64>) -> Vec<bool> {
    values
        .iter()
        .map(|v| v.as_f64().map_or(false, |x| is_violation(x, lower, upper)))
        .collect()
}

/// Clip numeric cells to the nearest bound, returning how many changed.
pub fn clip(values: &mut [Value], lower: Option<f64>, upper: Option<f64>) -> usize {
    let mut clipped = 0;
    for value in values.iter_mut() {
        let Some(x) = value.as_f64() else {
            continue;
        };
        let bound = match (lower, upper) {
            (Some(lo), _) if x < lo => lo,
            (_, Some(hi)) if x > hi => hi,
            _ => continue,
        };
        let keep_int = matches!(value, Value::Int(_)) && bound.fract() == 0.0;
        *value = if keep_int {
            Value::Int(bound as i64)
        } else {
            Value::from(bound)
        };
        clipped += 1;
    }
    clipped
}
