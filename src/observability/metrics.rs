//! Metrics for the consolidation pipeline
//!
//! Recording functions are grouped by phase. Without an installed recorder
//! the `metrics` macros are no-ops, so library code and tests can call them
//! freely.

use std::fmt;
use std::net::SocketAddr;
use std::sync::OnceLock;

use tracing::{info, warn};

/// Environment variable holding the Prometheus listener address
pub const METRICS_ADDR_ENV: &str = "CONSOLIDATOR_METRICS_ADDR";

/// Enum representing all metric names used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Pipeline
    PipelineRunsCompleted,
    PipelineRunsFailed,
    PipelinePhaseDuration,
    PipelineColumnReduction,

    // Extract
    ExtractRowsLoaded,
    ExtractRequestsSuccess,
    ExtractRequestsError,
    ExtractRequestDuration,

    // Clean
    CleanPlaceholdersNulled,
    CleanValuesImputed,
    CleanValuesClipped,
    CleanRowsExcluded,
    CleanDuplicatesDropped,
    CleanRequiredFieldsFlagged,

    // Consolidate
    ConsolidateGroups,
    ConsolidateCompleteness,

    // Enrich
    EnrichMetricsComputed,
    EnrichMetricsFailed,

    // Quality
    QualityCheckScore,
    QualityGlobalScore,
    QualityIssuesDetected,

    // Export
    ExportFilesWritten,
    ExportFailures,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::PipelineRunsCompleted => "consolidator_pipeline_runs_completed_total",
            MetricName::PipelineRunsFailed => "consolidator_pipeline_runs_failed_total",
            MetricName::PipelinePhaseDuration => "consolidator_pipeline_phase_duration_seconds",
            MetricName::PipelineColumnReduction => "consolidator_pipeline_column_reduction_ratio",

            MetricName::ExtractRowsLoaded => "consolidator_extract_rows_loaded_total",
            MetricName::ExtractRequestsSuccess => "consolidator_extract_requests_success_total",
            MetricName::ExtractRequestsError => "consolidator_extract_requests_error_total",
            MetricName::ExtractRequestDuration => "consolidator_extract_request_duration_seconds",

            MetricName::CleanPlaceholdersNulled => "consolidator_clean_placeholders_nulled_total",
            MetricName::CleanValuesImputed => "consolidator_clean_values_imputed_total",
            MetricName::CleanValuesClipped => "consolidator_clean_values_clipped_total",
            MetricName::CleanRowsExcluded => "consolidator_clean_rows_excluded_total",
            MetricName::CleanDuplicatesDropped => "consolidator_clean_duplicates_dropped_total",
            MetricName::CleanRequiredFieldsFlagged => "consolidator_clean_required_fields_flagged_total",

            MetricName::ConsolidateGroups => "consolidator_consolidate_groups_total",
            MetricName::ConsolidateCompleteness => "consolidator_consolidate_completeness",

            MetricName::EnrichMetricsComputed => "consolidator_enrich_metrics_computed_total",
            MetricName::EnrichMetricsFailed => "consolidator_enrich_metrics_failed_total",

            MetricName::QualityCheckScore => "consolidator_quality_check_score",
            MetricName::QualityGlobalScore => "consolidator_quality_global_score",
            MetricName::QualityIssuesDetected => "consolidator_quality_issues_detected_total",

            MetricName::ExportFilesWritten => "consolidator_export_files_written_total",
            MetricName::ExportFailures => "consolidator_export_failures_total",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static PROMETHEUS_HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. When `CONSOLIDATOR_METRICS_ADDR` is set an
/// HTTP scrape endpoint is served on that address (requires a tokio runtime).
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    match std::env::var(METRICS_ADDR_ENV) {
        Ok(addr) => {
            let addr: SocketAddr = addr
                .parse()
                .map_err(|e| format!("Invalid {} '{}': {}", METRICS_ADDR_ENV, addr, e))?;
            builder
                .with_http_listener(addr)
                .install()
                .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))?;
            info!("📈 Metrics exporter listening on {}", addr);
        }
        Err(_) => {
            let handle = builder
                .install_recorder()
                .map_err(|e| format!("Failed to install Prometheus recorder: {}", e))?;
            if PROMETHEUS_HANDLE.set(handle).is_err() {
                warn!("Prometheus handle was already set");
            }
            info!("📈 Metrics recorder installed (no listener)");
        }
    }
    Ok(())
}

/// Render the current metrics in Prometheus text format, when a local
/// recorder is installed.
pub fn render() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

// ============================================================================
// Pipeline Metrics
// ============================================================================

pub mod pipeline {
    use super::MetricName;

    pub fn run_completed() {
        ::metrics::counter!(MetricName::PipelineRunsCompleted.as_str()).increment(1);
    }

    pub fn run_failed(phase: &str) {
        ::metrics::counter!(MetricName::PipelineRunsFailed.as_str(), "phase" => phase.to_string())
            .increment(1);
    }

    pub fn phase_duration(phase: &str, secs: f64) {
        ::metrics::histogram!(MetricName::PipelinePhaseDuration.as_str(), "phase" => phase.to_string())
            .record(secs);
    }

    pub fn column_reduction(ratio: f64) {
        ::metrics::gauge!(MetricName::PipelineColumnReduction.as_str()).set(ratio);
    }
}

// ============================================================================
// Extract Metrics
// ============================================================================

pub mod extract {
    use super::MetricName;

    pub fn rows_loaded(source: &str, rows: usize) {
        ::metrics::counter!(MetricName::ExtractRowsLoaded.as_str(), "source" => source.to_string())
            .increment(rows as u64);
    }

    pub fn request_success() {
        ::metrics::counter!(MetricName::ExtractRequestsSuccess.as_str()).increment(1);
    }

    pub fn request_error() {
        ::metrics::counter!(MetricName::ExtractRequestsError.as_str()).increment(1);
    }

    pub fn request_duration(secs: f64) {
        ::metrics::histogram!(MetricName::ExtractRequestDuration.as_str()).record(secs);
    }
}

// ============================================================================
// Clean Metrics
// ============================================================================

pub mod clean {
    use super::MetricName;

    pub fn placeholders_nulled(count: usize) {
        ::metrics::counter!(MetricName::CleanPlaceholdersNulled.as_str()).increment(count as u64);
    }

    pub fn values_imputed(column: &str, count: usize) {
        ::metrics::counter!(MetricName::CleanValuesImputed.as_str(), "column" => column.to_string())
            .increment(count as u64);
    }

    pub fn values_clipped(column: &str, count: usize) {
        ::metrics::counter!(MetricName::CleanValuesClipped.as_str(), "column" => column.to_string())
            .increment(count as u64);
    }

    pub fn rows_excluded(column: &str, count: usize) {
        ::metrics::counter!(MetricName::CleanRowsExcluded.as_str(), "column" => column.to_string())
            .increment(count as u64);
    }

    pub fn duplicates_dropped(count: usize) {
        ::metrics::counter!(MetricName::CleanDuplicatesDropped.as_str()).increment(count as u64);
    }

    pub fn required_field_flagged(field: &str, severity: &str) {
        ::metrics::counter!(MetricName::CleanRequiredFieldsFlagged.as_str(),
            "field" => field.to_string(),
            "severity" => severity.to_string()
        )
        .increment(1);
    }
}

// ============================================================================
// Consolidate Metrics
// ============================================================================

pub mod consolidate {
    use super::MetricName;

    /// Record one group outcome, labelled by status
    pub fn group_result(group: &str, status: &str) {
        ::metrics::counter!(MetricName::ConsolidateGroups.as_str(),
            "group" => group.to_string(),
            "status" => status.to_string()
        )
        .increment(1);
    }

    pub fn completeness(group: &str, completeness: f64) {
        ::metrics::gauge!(MetricName::ConsolidateCompleteness.as_str(), "group" => group.to_string())
            .set(completeness);
    }
}

// ============================================================================
// Enrich Metrics
// ============================================================================

pub mod enrich {
    use super::MetricName;

    pub fn metric_computed(kind: &str) {
        ::metrics::counter!(MetricName::EnrichMetricsComputed.as_str(), "kind" => kind.to_string())
            .increment(1);
    }

    pub fn metric_failed(kind: &str) {
        ::metrics::counter!(MetricName::EnrichMetricsFailed.as_str(), "kind" => kind.to_string())
            .increment(1);
    }
}

// ============================================================================
// Quality Metrics
// ============================================================================

pub mod quality {
    use super::MetricName;

    pub fn check_score(category: &str, score: f64) {
        ::metrics::gauge!(MetricName::QualityCheckScore.as_str(), "category" => category.to_string())
            .set(score);
    }

    pub fn global_score(score: f64) {
        ::metrics::gauge!(MetricName::QualityGlobalScore.as_str()).set(score);
    }

    pub fn issue_detected(category: &str, severity: &str) {
        ::metrics::counter!(MetricName::QualityIssuesDetected.as_str(),
            "category" => category.to_string(),
            "severity" => severity.to_string()
        )
        .increment(1);
    }
}

// ============================================================================
// Export Metrics
// ============================================================================

pub mod export {
    use super::MetricName;

    pub fn file_written(format: &str) {
        ::metrics::counter!(MetricName::ExportFilesWritten.as_str(), "format" => format.to_string())
            .increment(1);
    }

    pub fn failure() {
        ::metrics::counter!(MetricName::ExportFailures.as_str()).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_are_prefixed_and_unique() {
        let all = [
            MetricName::PipelineRunsCompleted,
            MetricName::PipelineRunsFailed,
            MetricName::PipelinePhaseDuration,
            MetricName::PipelineColumnReduction,
            MetricName::ExtractRowsLoaded,
            MetricName::ExtractRequestsSuccess,
            MetricName::ExtractRequestsError,
            MetricName::ExtractRequestDuration,
            MetricName::CleanPlaceholdersNulled,
            MetricName::CleanValuesImputed,
            MetricName::CleanValuesClipped,
            MetricName::CleanRowsExcluded,
            MetricName::CleanDuplicatesDropped,
            MetricName::CleanRequiredFieldsFlagged,
            MetricName::ConsolidateGroups,
            MetricName::ConsolidateCompleteness,
            MetricName::EnrichMetricsComputed,
            MetricName::EnrichMetricsFailed,
            MetricName::QualityCheckScore,
            MetricName::QualityGlobalScore,
            MetricName::QualityIssuesDetected,
            MetricName::ExportFilesWritten,
            MetricName::ExportFailures,
        ];
        let names: std::collections::HashSet<&str> = all.iter().map(|m| m.as_str()).collect();
        assert_eq!(names.len(), all.len());
        assert!(names.iter().all(|n| n.starts_with("consolidator_")));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        clean::values_clipped("price", 3);
        consolidate::group_result("Prix", "success");
        quality::global_score(0.93);
    }
}
