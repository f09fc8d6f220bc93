//! Quality validation of the fully processed dataset.
//!
//! Five independent checks each produce a [`CheckResult`]; their weighted
//! average is the global score. The validator only reads the dataset.

pub mod checks;
pub mod narrative;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::config::{ConsolidationConfig, CutPoints, Severity};
use crate::domain::Dataset;
use crate::error::{ConsolidatorError, Result};
use crate::observability::metrics;

/// The five check categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckCategory {
    Basic,
    BusinessRules,
    CrossField,
    Consolidation,
    Enrichment,
}

impl CheckCategory {
    pub const ALL: [CheckCategory; 5] = [
        CheckCategory::Basic,
        CheckCategory::BusinessRules,
        CheckCategory::CrossField,
        CheckCategory::Consolidation,
        CheckCategory::Enrichment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckCategory::Basic => "basic",
            CheckCategory::BusinessRules => "business_rules",
            CheckCategory::CrossField => "cross_field",
            CheckCategory::Consolidation => "consolidation",
            CheckCategory::Enrichment => "enrichment",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            CheckCategory::Basic => "Basic quality",
            CheckCategory::BusinessRules => "Business-rule compliance",
            CheckCategory::CrossField => "Cross-field consistency",
            CheckCategory::Consolidation => "Consolidation coverage",
            CheckCategory::Enrichment => "Enrichment coverage",
        }
    }

    pub fn weight(&self, config: &ConsolidationConfig) -> f64 {
        let w = &config.quality.weights;
        match self {
            CheckCategory::Basic => w.basic,
            CheckCategory::BusinessRules => w.business_rules,
            CheckCategory::CrossField => w.cross_field,
            CheckCategory::Consolidation => w.consolidation,
            CheckCategory::Enrichment => w.enrichment,
        }
    }
}

impl fmt::Display for CheckCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a score on the cut-point ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityStatus {
    Failed,
    Warning,
    Passed,
}

impl fmt::Display for QualityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QualityStatus::Passed => "PASSED",
            QualityStatus::Warning => "WARNING",
            QualityStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Finer grade on the same ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityGrade {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl fmt::Display for QualityGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QualityGrade::Excellent => "excellent",
            QualityGrade::Good => "good",
            QualityGrade::Fair => "fair",
            QualityGrade::Poor => "poor",
        };
        f.write_str(s)
    }
}

/// Whether a check validated, failed to validate, or could not run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationOutcome {
    Valid,
    Invalid,
    Error,
}

/// Types of quality issues that can be detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityIssueType {
    /// Missing required data
    MissingData,
    /// Too many repeated values in a field that should be unique
    LowUniqueness,
    /// Values that do not read as the declared type
    TypeInconsistency,
    /// Values outside declared numeric bounds
    OutOfRange,
    /// Values outside an allowed set
    InvalidValue,
    /// Ratios far from the population median
    RatioAnomaly,
    /// Coordinates outside the covered area
    OutOfGeography,
    /// Dates or years that cannot be right
    TemporalInconsistency,
    /// Expected canonical or derived field not produced
    MissingField,
    /// Produced field with poor completeness or plausibility
    LowCoverage,
    /// The check itself could not be evaluated
    CheckError,
}

impl QualityIssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityIssueType::MissingData => "missing_data",
            QualityIssueType::LowUniqueness => "low_uniqueness",
            QualityIssueType::TypeInconsistency => "type_inconsistency",
            QualityIssueType::OutOfRange => "out_of_range",
            QualityIssueType::InvalidValue => "invalid_value",
            QualityIssueType::RatioAnomaly => "ratio_anomaly",
            QualityIssueType::OutOfGeography => "out_of_geography",
            QualityIssueType::TemporalInconsistency => "temporal_inconsistency",
            QualityIssueType::MissingField => "missing_field",
            QualityIssueType::LowCoverage => "low_coverage",
            QualityIssueType::CheckError => "check_error",
        }
    }
}

/// Individual quality issue found during validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub issue_type: QualityIssueType,
    pub severity: Severity,
    pub description: String,
    /// Field that triggered this issue
    pub field: Option<String>,
    /// Rows affected, when countable
    pub affected_rows: usize,
}

impl QualityIssue {
    pub fn new(issue_type: QualityIssueType, severity: Severity, description: impl Into<String>) -> Self {
        Self {
            issue_type,
            severity,
            description: description.into(),
            field: None,
            affected_rows: 0,
        }
    }

    pub fn on_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn rows(mut self, affected_rows: usize) -> Self {
        self.affected_rows = affected_rows;
        self
    }

    /// How this violation is reported: warnings as WARNING, errors as FAILED.
    pub fn status(&self) -> QualityStatus {
        match self.severity {
            Severity::Info => QualityStatus::Passed,
            Severity::Warning => QualityStatus::Warning,
            Severity::Error | Severity::Critical => QualityStatus::Failed,
        }
    }
}

/// Result of one check category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub category: CheckCategory,
    pub score: f64,
    pub status: QualityStatus,
    pub grade: QualityGrade,
    pub outcome: ValidationOutcome,
    pub issues: Vec<QualityIssue>,
    /// Named sub-measurements (per-field completeness, compliance ratios…)
    pub details: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub generated_at: DateTime<Utc>,
    pub row_count: usize,
    pub column_count: usize,
    pub checks: Vec<CheckResult>,
    pub global_score: f64,
    pub global_status: QualityStatus,
    pub global_grade: QualityGrade,
    pub narrative: String,
}

impl QualityReport {
    pub fn check(&self, category: CheckCategory) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.category == category)
    }

    pub fn issue_count(&self) -> usize {
        self.checks.iter().map(|c| c.issues.len()).sum()
    }
}

pub fn status_for(score: f64, cuts: &CutPoints) -> QualityStatus {
    if score >= cuts.passed {
        QualityStatus::Passed
    } else if score >= cuts.warning {
        QualityStatus::Warning
    } else {
        QualityStatus::Failed
    }
}

pub fn grade_for(score: f64, cuts: &CutPoints) -> QualityGrade {
    if score >= cuts.excellent {
        QualityGrade::Excellent
    } else if score >= cuts.passed {
        QualityGrade::Good
    } else if score >= cuts.warning {
        QualityGrade::Fair
    } else {
        QualityGrade::Poor
    }
}

/// Weighted average of category scores, clamped to [0, 1].
pub fn weighted_score(scores: &[(f64, f64)]) -> f64 {
    let total: f64 = scores.iter().map(|(_, w)| w).sum();
    if total <= 0.0 {
        return 0.0;
    }
    let sum: f64 = scores.iter().map(|(s, w)| s.clamp(0.0, 1.0) * w).sum();
    (sum / total).clamp(0.0, 1.0)
}

/// Trait for implementing dataset quality validation
pub trait QualityValidator {
    fn validate(&self, dataset: &Dataset) -> Result<QualityReport>;
}

/// Default validator running the five configured checks
pub struct DefaultQualityValidator {
    config: Arc<ConsolidationConfig>,
    current_year: i32,
}

impl DefaultQualityValidator {
    pub fn new(config: Arc<ConsolidationConfig>) -> Self {
        Self {
            config,
            current_year: Utc::now().year(),
        }
    }

    /// Pin the year used by temporal plausibility checks.
    pub fn with_current_year(mut self, year: i32) -> Self {
        self.current_year = year;
        self
    }

    fn run_check(&self, category: CheckCategory, dataset: &Dataset) -> Result<checks::CheckOutput> {
        let config = self.config.as_ref();
        match category {
            CheckCategory::Basic => checks::basic_quality(dataset, config),
            CheckCategory::BusinessRules => checks::business_rules(dataset, config),
            CheckCategory::CrossField => checks::cross_field(dataset, config, self.current_year),
            CheckCategory::Consolidation => checks::consolidation_coverage(dataset, config),
            CheckCategory::Enrichment => checks::enrichment_coverage(dataset, config),
        }
    }

    fn to_result(&self, category: CheckCategory, output: Result<checks::CheckOutput>) -> Result<CheckResult> {
        let cuts = &self.config.quality.cut_points;
        match output {
            Ok(output) => {
                let score = output.score.clamp(0.0, 1.0);
                let status = status_for(score, cuts);
                Ok(CheckResult {
                    category,
                    score,
                    status,
                    grade: grade_for(score, cuts),
                    outcome: if status == QualityStatus::Failed {
                        ValidationOutcome::Invalid
                    } else {
                        ValidationOutcome::Valid
                    },
                    issues: output.issues,
                    details: output.details,
                })
            }
            Err(e) if self.config.quality.block_on_error => Err(ConsolidatorError::Validation(format!(
                "{} check could not be evaluated: {}",
                category, e
            ))),
            Err(e) => {
                warn!("⚠️ {} check errored, scoring 0: {}", category.title(), e);
                Ok(CheckResult {
                    category,
                    score: 0.0,
                    status: QualityStatus::Failed,
                    grade: QualityGrade::Poor,
                    outcome: ValidationOutcome::Error,
                    issues: vec![QualityIssue::new(
                        QualityIssueType::CheckError,
                        Severity::Error,
                        e.to_string(),
                    )],
                    details: BTreeMap::new(),
                })
            }
        }
    }
}

impl QualityValidator for DefaultQualityValidator {
    #[instrument(skip(self, dataset), fields(rows = dataset.row_count(), columns = dataset.column_count()))]
    fn validate(&self, dataset: &Dataset) -> Result<QualityReport> {
        let mut results = Vec::with_capacity(CheckCategory::ALL.len());
        for category in CheckCategory::ALL {
            let result = self.to_result(category, self.run_check(category, dataset))?;
            metrics::quality::check_score(category.as_str(), result.score);
            for issue in &result.issues {
                metrics::quality::issue_detected(category.as_str(), &issue.severity.to_string());
            }
            results.push(result);
        }

        let weighted: Vec<(f64, f64)> = results
            .iter()
            .map(|r| (r.score, r.category.weight(&self.config)))
            .collect();
        let global_score = weighted_score(&weighted);
        let cuts = &self.config.quality.cut_points;
        let mut report = QualityReport {
            generated_at: Utc::now(),
            row_count: dataset.row_count(),
            column_count: dataset.column_count(),
            checks: results,
            global_score,
            global_status: status_for(global_score, cuts),
            global_grade: grade_for(global_score, cuts),
            narrative: String::new(),
        };
        report.narrative = narrative::summarize(&report);
        metrics::quality::global_score(global_score);

        info!(
            "✅ Quality validation complete: score {:.3} ({}, {}), {} issues",
            report.global_score,
            report.global_status,
            report.global_grade,
            report.issue_count()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cut_point_ladder() {
        let cuts = CutPoints::default();
        assert_eq!(status_for(0.95, &cuts), QualityStatus::Passed);
        assert_eq!(grade_for(0.95, &cuts), QualityGrade::Excellent);
        assert_eq!(status_for(0.85, &cuts), QualityStatus::Passed);
        assert_eq!(grade_for(0.85, &cuts), QualityGrade::Good);
        assert_eq!(status_for(0.7, &cuts), QualityStatus::Warning);
        assert_eq!(status_for(0.3, &cuts), QualityStatus::Failed);
        assert_eq!(grade_for(0.3, &cuts), QualityGrade::Poor);
    }

    #[test]
    fn test_weighted_score_clamps() {
        let score = weighted_score(&[(1.0, 0.25), (0.0, 0.25), (1.4, 0.5)]);
        assert!((score - 0.75).abs() < 1e-9);
        assert_eq!(weighted_score(&[(0.5, 0.0)]), 0.0);
    }

    #[test]
    fn test_empty_dataset_scores_zero_unless_blocking() {
        let config = ConsolidationConfig::with_groups(Vec::new());
        let report = DefaultQualityValidator::new(Arc::new(config.clone()))
            .validate(&Dataset::new())
            .unwrap();
        assert_eq!(report.global_score, 0.0);
        assert!(report
            .checks
            .iter()
            .all(|c| c.outcome == ValidationOutcome::Error));

        let mut blocking = config;
        blocking.quality.block_on_error = true;
        let err = DefaultQualityValidator::new(Arc::new(blocking))
            .validate(&Dataset::new())
            .unwrap_err();
        assert!(matches!(err, ConsolidatorError::Validation(_)));
    }

    #[test]
    fn test_issue_status_follows_severity() {
        let warning = QualityIssue::new(QualityIssueType::OutOfRange, Severity::Warning, "x");
        let error = QualityIssue::new(QualityIssueType::OutOfRange, Severity::Error, "x");
        assert_eq!(warning.status(), QualityStatus::Warning);
        assert_eq!(error.status(), QualityStatus::Failed);
    }
}
