//! The single merge dispatch table.
//!
//! Every `(type, strategy)` pair maps to one row-merge function operating on a
//! row's candidate values, already coerced to the target type and ordered by
//! source precedence. Mixed groups resolve a type per row and reuse the same
//! table.

use std::collections::HashSet;

use crate::config::{DataType, MergeStrategy};
use crate::domain::{InferredType, Value};
use crate::pipeline::processing::stats;

/// Per-row combination over precedence-ordered, typed candidates
pub type RowMerge = fn(&[Value], &MergeContext) -> Value;

#[derive(Debug, Clone)]
pub struct MergeContext<'a> {
    pub separator: &'a str,
}

const DISPATCH: &[(InferredType, MergeStrategy, RowMerge)] = &[
    (InferredType::Numeric, MergeStrategy::FirstValid, first_valid),
    (InferredType::Numeric, MergeStrategy::Mean, numeric_mean),
    (InferredType::Numeric, MergeStrategy::Median, numeric_median),
    (InferredType::Numeric, MergeStrategy::Sum, numeric_sum),
    (InferredType::Numeric, MergeStrategy::Max, numeric_max),
    (InferredType::Numeric, MergeStrategy::Min, numeric_min),
    (InferredType::Categorical, MergeStrategy::FirstValid, first_valid),
    (InferredType::Categorical, MergeStrategy::MostFrequent, most_frequent),
    (InferredType::Categorical, MergeStrategy::Concatenate, concatenate),
    (InferredType::Datetime, MergeStrategy::Latest, latest),
    (InferredType::Datetime, MergeStrategy::Earliest, earliest),
    (InferredType::Datetime, MergeStrategy::FirstValid, first_valid),
];

/// Merge function for a concrete type, if the strategy applies to it.
pub fn lookup(target: InferredType, strategy: MergeStrategy) -> Option<RowMerge> {
    DISPATCH
        .iter()
        .find(|(t, s, _)| *t == target && *s == strategy)
        .map(|(_, _, f)| *f)
}

/// Concrete target type of a non-mixed group.
pub fn target_type(data_type: DataType) -> Option<InferredType> {
    match data_type {
        DataType::Numeric => Some(InferredType::Numeric),
        DataType::Categorical => Some(InferredType::Categorical),
        DataType::Datetime => Some(InferredType::Datetime),
        DataType::Mixed => None,
    }
}

/// Coerce a raw cell into `target`; unparsable cells become null.
pub fn coerce(value: &Value, target: InferredType, factor: f64) -> Value {
    match target {
        InferredType::Numeric => value
            .as_f64()
            .map(|v| Value::from(v * factor))
            .unwrap_or(Value::Null),
        InferredType::Datetime => value.as_datetime().map(Value::DateTime).unwrap_or(Value::Null),
        InferredType::Categorical => match value.as_text() {
            Some(text) if !text.trim().is_empty() => Value::Text(text.trim().to_string()),
            _ => Value::Null,
        },
    }
}

/// One source column with its unit factor
pub struct SourceColumn<'a> {
    pub values: &'a [Value],
    pub factor: f64,
}

/// Merge whole columns for a group of a concrete type.
pub fn merge_typed(
    sources: &[SourceColumn<'_>],
    row_count: usize,
    target: InferredType,
    merge: RowMerge,
    ctx: &MergeContext,
) -> Vec<Value> {
    let mut candidates = Vec::with_capacity(sources.len());
    (0..row_count)
        .map(|row| {
            candidates.clear();
            candidates.extend(
                sources
                    .iter()
                    .map(|s| coerce(&s.values[row], target, s.factor)),
            );
            merge(&candidates, ctx)
        })
        .collect()
}

/// Merge whole columns for a mixed group: per row, the dominant type among the
/// present values wins a majority vote (ties resolved datetime → numeric →
/// categorical) and only values of that type are merged.
pub fn merge_mixed(
    sources: &[SourceColumn<'_>],
    row_count: usize,
    strategy: MergeStrategy,
    ctx: &MergeContext,
) -> Vec<Value> {
    (0..row_count)
        .map(|row| {
            let typed: Vec<(InferredType, &Value, f64)> = sources
                .iter()
                .filter_map(|s| {
                    let value = &s.values[row];
                    value.infer_type().map(|t| (t, value, s.factor))
                })
                .collect();
            let Some(dominant) = dominant_type(typed.iter().map(|(t, _, _)| *t)) else {
                return Value::Null;
            };
            let merge = lookup(dominant, strategy).unwrap_or(first_valid);
            let candidates: Vec<Value> = typed
                .iter()
                .filter(|(t, _, _)| *t == dominant)
                .map(|(_, v, factor)| coerce(v, dominant, *factor))
                .collect();
            merge(&candidates, ctx)
        })
        .collect()
}

/// Majority vote over inferred types; earlier entries of
/// [`InferredType::ORDER`] win ties.
pub fn dominant_type<I: IntoIterator<Item = InferredType>>(types: I) -> Option<InferredType> {
    let mut counts = [0usize; 3];
    for t in types {
        let idx = InferredType::ORDER
            .iter()
            .position(|o| *o == t)
            .unwrap_or(2);
        counts[idx] += 1;
    }
    let mut best: Option<(InferredType, usize)> = None;
    for (idx, count) in counts.iter().enumerate() {
        if *count > 0 && best.map_or(true, |(_, c)| *count > c) {
            best = Some((InferredType::ORDER[idx], *count));
        }
    }
    best.map(|(t, _)| t)
}

fn present(values: &[Value]) -> impl Iterator<Item = &Value> {
    values.iter().filter(|v| !v.is_null())
}

fn numbers(values: &[Value]) -> Vec<f64> {
    present(values).filter_map(Value::as_f64).collect()
}

pub fn first_valid(values: &[Value], _ctx: &MergeContext) -> Value {
    present(values).next().cloned().unwrap_or(Value::Null)
}

fn numeric_mean(values: &[Value], _ctx: &MergeContext) -> Value {
    stats::mean(&numbers(values)).into()
}

fn numeric_median(values: &[Value], _ctx: &MergeContext) -> Value {
    stats::median(&numbers(values)).into()
}

fn numeric_sum(values: &[Value], _ctx: &MergeContext) -> Value {
    let nums = numbers(values);
    if nums.is_empty() {
        Value::Null
    } else {
        Value::from(nums.iter().sum::<f64>())
    }
}

fn numeric_max(values: &[Value], _ctx: &MergeContext) -> Value {
    stats::min_max(&numbers(values)).map(|(_, hi)| hi).into()
}

fn numeric_min(values: &[Value], _ctx: &MergeContext) -> Value {
    stats::min_max(&numbers(values)).map(|(lo, _)| lo).into()
}

fn most_frequent(values: &[Value], _ctx: &MergeContext) -> Value {
    stats::mode(values).unwrap_or(Value::Null)
}

fn concatenate(values: &[Value], ctx: &MergeContext) -> Value {
    let mut seen = HashSet::new();
    let parts: Vec<String> = present(values)
        .filter_map(Value::as_text)
        .filter(|t| seen.insert(t.to_lowercase()))
        .collect();
    if parts.is_empty() {
        Value::Null
    } else {
        Value::Text(parts.join(ctx.separator))
    }
}

fn latest(values: &[Value], _ctx: &MergeContext) -> Value {
    present(values)
        .filter_map(Value::as_datetime)
        .max()
        .map(Value::DateTime)
        .unwrap_or(Value::Null)
}

fn earliest(values: &[Value], _ctx: &MergeContext) -> Value {
    present(values)
        .filter_map(Value::as_datetime)
        .min()
        .map(Value::DateTime)
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const CTX: MergeContext<'static> = MergeContext { separator: " | " };

    #[test]
    fn test_every_supported_pair_is_dispatchable() {
        for data_type in [DataType::Numeric, DataType::Categorical, DataType::Datetime] {
            let target = target_type(data_type).unwrap();
            for strategy in data_type.supported_strategies() {
                assert!(
                    lookup(target, *strategy).is_some(),
                    "{} / {} has no merge function",
                    data_type,
                    strategy
                );
            }
        }
    }

    #[test]
    fn test_numeric_strategies_ignore_nulls() {
        let row = [Value::Null, Value::Float(10.0), Value::Float(30.0)];
        let run = |s| lookup(InferredType::Numeric, s).unwrap()(&row, &CTX);
        assert_eq!(run(MergeStrategy::FirstValid), Value::Float(10.0));
        assert_eq!(run(MergeStrategy::Mean), Value::Float(20.0));
        assert_eq!(run(MergeStrategy::Median), Value::Float(20.0));
        assert_eq!(run(MergeStrategy::Sum), Value::Float(40.0));
        assert_eq!(run(MergeStrategy::Max), Value::Float(30.0));
        assert_eq!(run(MergeStrategy::Min), Value::Float(10.0));
        let empty = [Value::Null, Value::Null];
        assert_eq!(numeric_sum(&empty, &CTX), Value::Null);
    }

    #[test]
    fn test_concatenate_dedupes_case_insensitively() {
        let row = [Value::from("Balcon"), Value::Null, Value::from("balcon"), Value::from("Vue lac")];
        assert_eq!(concatenate(&row, &CTX), Value::from("Balcon | Vue lac"));
    }

    #[test]
    fn test_latest_and_earliest() {
        let a = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let row = [Value::DateTime(a), Value::Null, Value::DateTime(b)];
        assert_eq!(latest(&row, &CTX), Value::DateTime(b));
        assert_eq!(earliest(&row, &CTX), Value::DateTime(a));
    }

    #[test]
    fn test_dominant_type_tie_prefers_datetime_then_numeric() {
        use InferredType::*;
        assert_eq!(dominant_type([Numeric, Datetime]), Some(Datetime));
        assert_eq!(dominant_type([Categorical, Numeric]), Some(Numeric));
        assert_eq!(dominant_type([Categorical, Categorical, Numeric]), Some(Categorical));
        assert_eq!(dominant_type(std::iter::empty()), None);
    }

    #[test]
    fn test_merge_mixed_uses_dominant_type_only() {
        let a = vec![Value::from("2024-05-01"), Value::from("dès que possible")];
        let b = vec![Value::from("immediately"), Value::from("2024-07-01")];
        let c = vec![Value::from("2024-06-01"), Value::Null];
        let sources = [
            SourceColumn { values: &a, factor: 1.0 },
            SourceColumn { values: &b, factor: 1.0 },
            SourceColumn { values: &c, factor: 1.0 },
        ];
        let merged = merge_mixed(&sources, 2, MergeStrategy::FirstValid, &CTX);
        assert_eq!(
            merged[0],
            Value::DateTime(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap())
        );
        // One datetime vs one categorical: the tie goes to datetime.
        assert_eq!(
            merged[1],
            Value::DateTime(Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_coerce_applies_unit_factor() {
        let v = coerce(&Value::Int(1200), InferredType::Numeric, 0.092903);
        match v {
            Value::Float(f) => assert!((f - 111.4836).abs() < 1e-3),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(coerce(&Value::from("n/a"), InferredType::Numeric, 1.0), Value::Null);
        assert_eq!(coerce(&Value::Int(1003), InferredType::Categorical, 1.0), Value::from("1003"));
    }
}
