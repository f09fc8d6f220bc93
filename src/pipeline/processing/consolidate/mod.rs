//! Consolidation phase: collapse each group's source columns into one
//! canonical column, in priority order.

pub mod strategies;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::config::{ConsolidationConfig, ConsolidationGroup, PostRule};
use crate::domain::{Dataset, Value};
use crate::error::{ConsolidatorError, Result};
use crate::observability::metrics;
use crate::pipeline::processing::clean::drop_duplicates;
use crate::pipeline::processing::stats;

use strategies::{MergeContext, SourceColumn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsolidationStatus {
    Success,
    ValidationFailed,
    NoSourceColumns,
    Error,
}

impl ConsolidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsolidationStatus::Success => "success",
            ConsolidationStatus::ValidationFailed => "validation_failed",
            ConsolidationStatus::NoSourceColumns => "no_source_columns",
            ConsolidationStatus::Error => "error",
        }
    }
}

impl fmt::Display for ConsolidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationResult {
    pub group: String,
    pub canonical_field: String,
    /// Columns that fed the merge, in precedence order
    pub used_columns: Vec<String>,
    /// Non-null share of the merged column
    pub completeness: f64,
    pub diversity: Option<f64>,
    pub status: ConsolidationStatus,
    pub message: Option<String>,
}

impl ConsolidationResult {
    fn new(group: &ConsolidationGroup, status: ConsolidationStatus) -> Self {
        Self {
            group: group.name.clone(),
            canonical_field: group.canonical_field.clone(),
            used_columns: Vec::new(),
            completeness: 0.0,
            diversity: None,
            status,
            message: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ConsolidationStatus::Success
    }
}

/// All group outcomes of one Consolidate phase
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationReport {
    pub results: Vec<ConsolidationResult>,
    pub columns_before: usize,
    pub columns_after: usize,
    /// Rows that became exact duplicates once their sources were merged
    #[serde(default)]
    pub duplicates_dropped: usize,
}

impl ConsolidationReport {
    pub fn count(&self, status: ConsolidationStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn result(&self, canonical_field: &str) -> Option<&ConsolidationResult> {
        self.results.iter().find(|r| r.canonical_field == canonical_field)
    }

    pub fn summary(&self) -> String {
        format!(
            "{} consolidated, {} failed validation, {} without sources, {} errors; {} → {} columns",
            self.count(ConsolidationStatus::Success),
            self.count(ConsolidationStatus::ValidationFailed),
            self.count(ConsolidationStatus::NoSourceColumns),
            self.count(ConsolidationStatus::Error),
            self.columns_before,
            self.columns_after
        )
    }
}

pub struct Consolidator {
    config: Arc<ConsolidationConfig>,
}

impl Consolidator {
    pub fn new(config: Arc<ConsolidationConfig>) -> Self {
        Self { config }
    }

    /// Consolidate every group in priority order. A failing group is recorded
    /// and never stops the others.
    #[instrument(skip(self, dataset), fields(rows = dataset.row_count(), columns = dataset.column_count()))]
    pub fn consolidate(&self, dataset: &mut Dataset) -> ConsolidationReport {
        let mut report = ConsolidationReport {
            columns_before: dataset.column_count(),
            ..Default::default()
        };

        for group in self.config.groups_by_priority() {
            let result = match self.consolidate_group(dataset, group) {
                Ok(result) => result,
                Err(e) => {
                    let mut result = ConsolidationResult::new(group, ConsolidationStatus::Error);
                    result.message = Some(e.to_string());
                    result
                }
            };
            match result.status {
                ConsolidationStatus::ValidationFailed | ConsolidationStatus::Error => warn!(
                    "⚠️ Group '{}' → {}: {}",
                    result.group,
                    result.status,
                    result.message.as_deref().unwrap_or("")
                ),
                _ => {}
            }
            metrics::consolidate::group_result(&result.group, result.status.as_str());
            if result.is_success() {
                metrics::consolidate::completeness(&result.group, result.completeness);
            }
            report.results.push(result);
        }

        // Rows that only differed by which synonym column held a value are
        // identical now.
        if self.config.cleaning.drop_duplicates {
            report.duplicates_dropped = drop_duplicates(dataset);
            if report.duplicates_dropped > 0 {
                metrics::clean::duplicates_dropped(report.duplicates_dropped);
                info!("🧬 Dropped {} rows duplicated by consolidation", report.duplicates_dropped);
            }
        }

        report.columns_after = dataset.column_count();
        info!("🔗 Consolidation complete: {}", report.summary());
        report
    }

    pub fn consolidate_group(&self, dataset: &mut Dataset, group: &ConsolidationGroup) -> Result<ConsolidationResult> {
        let canonical = group.canonical_field.as_str();
        let mut used: Vec<(String, f64)> = group
            .source_fields
            .iter()
            .filter(|s| s.name != canonical && dataset.has_column(&s.name))
            .map(|s| (s.name.clone(), s.factor_or_one()))
            .collect();

        if used.is_empty() {
            let mut result = ConsolidationResult::new(group, ConsolidationStatus::NoSourceColumns);
            if let Some(existing) = dataset.column(canonical) {
                result.completeness = stats::completeness(existing);
                result.message = Some("canonical column already present".to_string());
            }
            return Ok(result);
        }
        // An existing canonical column (from an earlier run) takes precedence.
        if dataset.has_column(canonical) {
            used.insert(0, (canonical.to_string(), 1.0));
        }

        let merged = {
            let sources: Vec<SourceColumn<'_>> = used
                .iter()
                .filter_map(|(name, factor)| {
                    dataset.column(name).map(|values| SourceColumn {
                        values,
                        factor: *factor,
                    })
                })
                .collect();
            let ctx = MergeContext {
                separator: group.separator(),
            };
            let rows = dataset.row_count();
            match strategies::target_type(group.data_type) {
                Some(target) => {
                    let merge = strategies::lookup(target, group.strategy).ok_or_else(|| {
                        ConsolidatorError::Configuration(format!(
                            "no merge function for {} / {}",
                            group.data_type, group.strategy
                        ))
                    })?;
                    strategies::merge_typed(&sources, rows, target, merge, &ctx)
                }
                None => strategies::merge_mixed(&sources, rows, group.strategy, &ctx),
            }
        };
        let merged = apply_post_rules(merged, &group.rules);

        let mut result = ConsolidationResult::new(group, ConsolidationStatus::Success);
        result.used_columns = used.iter().map(|(name, _)| name.clone()).collect();
        result.completeness = stats::completeness(&merged);
        let non_null = merged.iter().filter(|v| !v.is_null()).count();
        if non_null >= self.config.thresholds.diversity_min_sample {
            result.diversity = stats::diversity(&merged);
        }

        let min_completeness = group
            .min_completeness
            .unwrap_or(self.config.thresholds.min_completeness);
        let min_diversity = group.min_diversity.unwrap_or(self.config.thresholds.min_diversity);
        if result.completeness < min_completeness {
            result.status = ConsolidationStatus::ValidationFailed;
            result.message = Some(format!(
                "completeness {:.1}% below {:.1}%",
                result.completeness * 100.0,
                min_completeness * 100.0
            ));
            return Ok(result);
        }
        if let Some(diversity) = result.diversity {
            if diversity < min_diversity {
                result.status = ConsolidationStatus::ValidationFailed;
                result.message = Some(format!(
                    "diversity {:.1}% below {:.1}%",
                    diversity * 100.0,
                    min_diversity * 100.0
                ));
                return Ok(result);
            }
        }

        dataset.set_column(canonical, merged)?;
        if group.drop_sources {
            for (name, _) in &used {
                if name != canonical {
                    dataset.remove_column(name);
                }
            }
        }
        Ok(result)
    }
}

/// Post-merge rules; only numeric cells are affected.
pub fn apply_post_rules(mut values: Vec<Value>, rules: &[PostRule]) -> Vec<Value> {
    for rule in rules {
        for value in values.iter_mut() {
            let Some(x) = (if value.is_numeric() { value.as_f64() } else { None }) else {
                continue;
            };
            *value = match rule {
                PostRule::Positive if x <= 0.0 => Value::Null,
                PostRule::NonNegative if x < 0.0 => Value::Null,
                PostRule::Integer => Value::Int(x.round() as i64),
                _ => continue,
            };
        }
    }
    values
}
