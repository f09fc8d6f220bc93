//! Sequential phase state machine driving one consolidation run.
//!
//! `Extract → Clean → Consolidate → Enrich → Validate → Optimize → Export → Report`.
//! Component-level failures are folded into the phase reports; any error
//! escaping a phase aborts the run. Configuration and extraction errors are
//! returned as they are, everything else is wrapped into a `PhaseFailure`.
//! Every invocation, successful or not, leaves one [`RunRecord`] in history.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::app::ports::{ExportOutcome, ExportPort, RunMetadata, SourcePort};
use crate::config::ConsolidationConfig;
use crate::domain::Dataset;
use crate::error::{ConsolidatorError, Result};
use crate::observability::metrics;
use crate::pipeline::ingestion::PartitionedSource;
use crate::pipeline::phase::{Phase, PhaseStats};
use crate::pipeline::processing::clean::{Cleaner, CleaningReport};
use crate::pipeline::processing::consolidate::{ConsolidationReport, ConsolidationStatus, Consolidator};
use crate::pipeline::processing::enrich::{DefaultEnricher, Enricher, EnrichmentReport};
use crate::pipeline::processing::optimize::{OptimizationReport, Optimizer};
use crate::pipeline::processing::quality_gate::{
    narrative, DefaultQualityValidator, QualityReport, QualityStatus, QualityValidator,
};

/// Coarse cancellation flag, checked between phases.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Completed,
    Aborted { phase: Phase, elapsed_ms: u64, cause: String },
    Cancelled { phase: Phase },
}

/// Run-level figures
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub config_version: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub rows_before: usize,
    pub rows_after: usize,
    pub columns_before: usize,
    pub columns_after: usize,
    /// Share of extracted columns gone by the end of the run, in percent
    pub column_reduction_pct: f64,
    pub quality_score: Option<f64>,
    pub quality_status: Option<QualityStatus>,
    pub phase_durations_ms: BTreeMap<Phase, u64>,
    pub total_duration_ms: u64,
}

/// One history entry per invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(flatten)]
    pub state: RunState,
    /// Statistics of the phases that completed
    pub phases: Vec<PhaseStats>,
    pub summary: Option<RunSummary>,
}

impl RunRecord {
    pub fn is_completed(&self) -> bool {
        self.state == RunState::Completed
    }
}

/// The structured document produced by the Report phase
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub summary: RunSummary,
    pub phases: Vec<PhaseStats>,
    pub cleaning: CleaningReport,
    pub consolidation: ConsolidationReport,
    pub enrichment: EnrichmentReport,
    pub quality: QualityReport,
    pub optimization: OptimizationReport,
    pub export: Option<ExportOutcome>,
}

impl RunReport {
    /// Human-readable rendering: run figures, phases, groups, then quality.
    pub fn render_markdown(&self) -> String {
        let s = &self.summary;
        let mut md = String::new();
        let _ = writeln!(md, "# Consolidation Run {}\n", s.run_id);
        let _ = writeln!(md, "- Catalog version: {}", s.config_version);
        let _ = writeln!(md, "- Started: {}", s.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
        let _ = writeln!(md, "- Rows: {} → {}", s.rows_before, s.rows_after);
        let _ = writeln!(
            md,
            "- Columns: {} → {} ({:.1}% reduction)",
            s.columns_before, s.columns_after, s.column_reduction_pct
        );
        if let Some(score) = s.quality_score {
            let _ = writeln!(md, "- Quality score: {:.3}", score);
        }
        let _ = writeln!(md, "- Duration: {} ms\n", s.total_duration_ms);

        let _ = writeln!(md, "## Phases\n");
        let _ = writeln!(md, "| Phase | Rows | Columns | ms | Notes |");
        let _ = writeln!(md, "|---|---:|---:|---:|---|");
        for p in &self.phases {
            let _ = writeln!(
                md,
                "| {} | {} → {} | {} → {} | {} | {} |",
                p.phase,
                p.rows_in,
                p.rows_out,
                p.columns_in,
                p.columns_out,
                p.duration_ms,
                p.notes.join("; ")
            );
        }

        let _ = writeln!(md, "\n## Consolidation groups\n");
        let _ = writeln!(md, "| Group | Canonical field | Status | Completeness | Sources |");
        let _ = writeln!(md, "|---|---|---|---:|---|");
        for r in &self.consolidation.results {
            let _ = writeln!(
                md,
                "| {} | `{}` | {} | {:.1}% | {} |",
                r.group,
                r.canonical_field,
                r.status,
                r.completeness * 100.0,
                r.used_columns.join(", ")
            );
        }

        if let Some(export) = &self.export {
            let _ = writeln!(md, "\n## Export\n");
            for path in &export.file_paths {
                let _ = writeln!(md, "- {}", path.display());
            }
            if let Some(error) = &export.error {
                let _ = writeln!(md, "- ⚠️ {}", error);
            }
        }

        md.push('\n');
        md.push_str(&narrative::render_markdown(&self.quality));
        md
    }
}

/// A completed run
#[derive(Debug)]
pub struct RunOutcome {
    pub dataset: Dataset,
    pub report: RunReport,
    pub report_files: Vec<PathBuf>,
}

/// Mutable state of the run in progress
struct RunContext {
    meta: RunMetadata,
    clock: Instant,
    dataset: Dataset,
    phases: Vec<PhaseStats>,
    rows_before: usize,
    columns_before: usize,
    cleaning: Option<CleaningReport>,
    consolidation: Option<ConsolidationReport>,
    enrichment: Option<EnrichmentReport>,
    quality: Option<QualityReport>,
    optimization: Option<OptimizationReport>,
    export: Option<ExportOutcome>,
    report: Option<RunReport>,
    report_files: Vec<PathBuf>,
}

impl RunContext {
    fn new(meta: RunMetadata) -> Self {
        Self {
            meta,
            clock: Instant::now(),
            dataset: Dataset::new(),
            phases: Vec::new(),
            rows_before: 0,
            columns_before: 0,
            cleaning: None,
            consolidation: None,
            enrichment: None,
            quality: None,
            optimization: None,
            export: None,
            report: None,
            report_files: Vec::new(),
        }
    }

    fn stats(&self, phase: Phase, rows_in: usize, columns_in: usize) -> PhaseStats {
        let mut stats = PhaseStats::new(phase);
        stats.rows_in = rows_in;
        stats.columns_in = columns_in;
        stats.rows_out = self.dataset.row_count();
        stats.columns_out = self.dataset.column_count();
        stats
    }

    fn summary(&self) -> RunSummary {
        let columns_after = self.dataset.column_count();
        let column_reduction_pct = if self.columns_before == 0 {
            0.0
        } else {
            (self.columns_before as f64 - columns_after as f64) / self.columns_before as f64 * 100.0
        };
        RunSummary {
            run_id: self.meta.run_id,
            config_version: self.meta.config_version.clone(),
            started_at: self.meta.started_at,
            finished_at: Utc::now(),
            rows_before: self.rows_before,
            rows_after: self.dataset.row_count(),
            columns_before: self.columns_before,
            columns_after,
            column_reduction_pct,
            quality_score: self.quality.as_ref().map(|q| q.global_score),
            quality_status: self.quality.as_ref().map(|q| q.global_status),
            phase_durations_ms: self.phases.iter().map(|p| (p.phase, p.duration_ms)).collect(),
            total_duration_ms: self.clock.elapsed().as_millis() as u64,
        }
    }
}

fn missing(what: &str) -> ConsolidatorError {
    ConsolidatorError::Validation(format!("{} is not available to the Report phase", what))
}

/// Source errors surface as extraction errors unless already fatal.
fn as_extraction(err: ConsolidatorError) -> ConsolidatorError {
    match err {
        ConsolidatorError::Configuration(_) | ConsolidatorError::Extraction(_) => err,
        other => ConsolidatorError::Extraction(other.to_string()),
    }
}

pub struct Orchestrator {
    config: Arc<ConsolidationConfig>,
    sources: Vec<Arc<dyn SourcePort>>,
    exporter: Option<Arc<dyn ExportPort>>,
    cleaner: Cleaner,
    consolidator: Consolidator,
    enricher: Box<dyn Enricher + Send + Sync>,
    validator: Box<dyn QualityValidator + Send + Sync>,
    optimizer: Optimizer,
    cancel: CancelHandle,
    history: Vec<RunRecord>,
}

impl Orchestrator {
    /// Build an orchestrator; refuses to start on a catalog failing its self-check.
    pub fn new(config: Arc<ConsolidationConfig>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            cleaner: Cleaner::new(Arc::clone(&config)),
            consolidator: Consolidator::new(Arc::clone(&config)),
            enricher: Box::new(DefaultEnricher::new(Arc::clone(&config))),
            validator: Box::new(DefaultQualityValidator::new(Arc::clone(&config))),
            optimizer: Optimizer::new(Arc::clone(&config)),
            config,
            sources: Vec::new(),
            exporter: None,
            cancel: CancelHandle::default(),
            history: Vec::new(),
        })
    }

    /// Add an input source. Several sources are extracted concurrently as partitions.
    pub fn with_source(mut self, source: Arc<dyn SourcePort>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_exporter(mut self, exporter: Arc<dyn ExportPort>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn with_enricher(mut self, enricher: Box<dyn Enricher + Send + Sync>) -> Self {
        self.enricher = enricher;
        self
    }

    pub fn with_validator(mut self, validator: Box<dyn QualityValidator + Send + Sync>) -> Self {
        self.validator = validator;
        self
    }

    pub fn config(&self) -> &ConsolidationConfig {
        &self.config
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn history(&self) -> &[RunRecord] {
        &self.history
    }

    pub fn last_run(&self) -> Option<&RunRecord> {
        self.history.last()
    }

    fn source(&self) -> Result<Arc<dyn SourcePort>> {
        match self.sources.len() {
            0 => Err(ConsolidatorError::Extraction(
                "no input source configured".to_string(),
            )),
            1 => Ok(Arc::clone(&self.sources[0])),
            _ => Ok(Arc::new(PartitionedSource::new(self.sources.clone()))),
        }
    }

    /// Execute every phase in order.
    pub async fn run(&mut self) -> Result<RunOutcome> {
        let meta = RunMetadata {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            config_version: self.config.version.clone(),
        };
        info!("🚀 Starting consolidation run {}", meta.run_id);
        let mut ctx = RunContext::new(meta);

        for phase in Phase::ALL {
            if self.cancel.is_cancelled() {
                warn!("🛑 Run {} cancelled before {}", ctx.meta.run_id, phase);
                self.abort(&ctx, RunState::Cancelled { phase });
                return Err(ConsolidatorError::Cancelled { phase });
            }

            let span = info_span!("phase", name = phase.as_str(), run_id = %ctx.meta.run_id);
            let started = Instant::now();
            let result = self.execute(phase, &mut ctx).instrument(span).await;
            let elapsed = started.elapsed();

            match result {
                Ok(mut stats) => {
                    stats.duration_ms = elapsed.as_millis() as u64;
                    metrics::pipeline::phase_duration(phase.as_str(), elapsed.as_secs_f64());
                    info!(
                        "✅ {} done in {} ms: {} rows × {} columns",
                        phase, stats.duration_ms, stats.rows_out, stats.columns_out
                    );
                    ctx.phases.push(stats);
                }
                Err(e) => {
                    let elapsed_ms = elapsed.as_millis() as u64;
                    let err = if e.is_fatal_taxonomy() {
                        e
                    } else {
                        ConsolidatorError::PhaseFailure {
                            phase,
                            elapsed_ms,
                            cause: e.to_string(),
                        }
                    };
                    error!("❌ Run {} aborted in {}: {}", ctx.meta.run_id, phase, err);
                    self.abort(
                        &ctx,
                        RunState::Aborted {
                            phase,
                            elapsed_ms,
                            cause: err.to_string(),
                        },
                    );
                    return Err(err);
                }
            }
        }

        let summary = ctx.summary();
        let mut report = ctx.report.take().ok_or_else(|| missing("run report"))?;
        report.summary = summary.clone();
        report.phases = ctx.phases.clone();

        metrics::pipeline::run_completed();
        metrics::pipeline::column_reduction(summary.column_reduction_pct / 100.0);
        info!(
            "🎉 Run {} complete: {} → {} columns ({:.1}% reduction), quality {:.3}",
            summary.run_id,
            summary.columns_before,
            summary.columns_after,
            summary.column_reduction_pct,
            summary.quality_score.unwrap_or(0.0)
        );

        self.history.push(RunRecord {
            run_id: summary.run_id,
            started_at: summary.started_at,
            finished_at: summary.finished_at,
            state: RunState::Completed,
            phases: ctx.phases.clone(),
            summary: Some(summary),
        });

        Ok(RunOutcome {
            dataset: ctx.dataset,
            report,
            report_files: ctx.report_files,
        })
    }

    fn abort(&mut self, ctx: &RunContext, state: RunState) {
        let phase = match &state {
            RunState::Aborted { phase, .. } | RunState::Cancelled { phase } => phase.as_str(),
            RunState::Completed => "none",
        };
        metrics::pipeline::run_failed(phase);
        self.history.push(RunRecord {
            run_id: ctx.meta.run_id,
            started_at: ctx.meta.started_at,
            finished_at: Utc::now(),
            state,
            phases: ctx.phases.clone(),
            summary: None,
        });
    }

    async fn execute(&self, phase: Phase, ctx: &mut RunContext) -> Result<PhaseStats> {
        let rows_in = ctx.dataset.row_count();
        let columns_in = ctx.dataset.column_count();

        match phase {
            Phase::Extract => {
                let source = self.source()?;
                info!("📡 Extracting from {}", source.name());
                let dataset = source.extract().await.map_err(as_extraction)?;
                metrics::extract::rows_loaded(source.name(), dataset.row_count());
                if dataset.row_count() == 0 {
                    return Err(ConsolidatorError::Extraction(format!(
                        "{} returned no rows",
                        source.name()
                    )));
                }
                ctx.rows_before = dataset.row_count();
                ctx.columns_before = dataset.column_count();
                ctx.dataset = dataset;
                Ok(ctx.stats(phase, 0, 0).with_note(format!("source: {}", source.name())))
            }
            Phase::Clean => {
                let report = self.cleaner.clean(&mut ctx.dataset)?;
                let stats = ctx.stats(phase, rows_in, columns_in).with_note(report.summary());
                ctx.cleaning = Some(report);
                Ok(stats)
            }
            Phase::Consolidate => {
                let report = self.consolidator.consolidate(&mut ctx.dataset);
                let mut stats = ctx.stats(phase, rows_in, columns_in).with_note(report.summary());
                for failed in report
                    .results
                    .iter()
                    .filter(|r| r.status == ConsolidationStatus::ValidationFailed)
                {
                    stats = stats.with_note(format!(
                        "{} not consolidated: {}",
                        failed.canonical_field,
                        failed.message.as_deref().unwrap_or("validation failed")
                    ));
                }
                ctx.consolidation = Some(report);
                Ok(stats)
            }
            Phase::Enrich => {
                let report = self.enricher.enrich(&mut ctx.dataset)?;
                let mut stats = ctx.stats(phase, rows_in, columns_in).with_note(format!(
                    "{} derived metrics computed, {} failed",
                    report.computed(),
                    report.failed().len()
                ));
                for failed in report.failed() {
                    stats = stats.with_note(format!(
                        "{} failed: {}",
                        failed.name,
                        failed.message.as_deref().unwrap_or("unknown error")
                    ));
                }
                ctx.enrichment = Some(report);
                Ok(stats)
            }
            Phase::Validate => {
                let report = self.validator.validate(&ctx.dataset)?;
                let stats = ctx.stats(phase, rows_in, columns_in).with_note(format!(
                    "global quality {:.3} ({})",
                    report.global_score, report.global_status
                ));
                ctx.quality = Some(report);
                Ok(stats)
            }
            Phase::Optimize => {
                let report = self.optimizer.optimize(&mut ctx.dataset);
                let stats = ctx.stats(phase, rows_in, columns_in).with_note(format!(
                    "{} sparse and {} constant columns dropped",
                    report.dropped_sparse.len(),
                    report.dropped_constant.len()
                ));
                ctx.optimization = Some(report);
                Ok(stats)
            }
            Phase::Export => {
                let Some(exporter) = &self.exporter else {
                    ctx.export = None;
                    return Ok(ctx.stats(phase, rows_in, columns_in).with_note("no exporter configured"));
                };
                let outcome = exporter.export(&ctx.dataset, &ctx.meta).await?;
                let note = if outcome.success {
                    let formats: Vec<&str> = outcome.formats_written.iter().map(|f| f.as_str()).collect();
                    format!("exported {}", formats.join(", "))
                } else {
                    let reason = outcome.error.clone().unwrap_or_else(|| "unknown error".to_string());
                    warn!("⚠️ Export reported failure, continuing: {}", reason);
                    metrics::export::failure();
                    format!("export failed: {}", reason)
                };
                ctx.export = Some(outcome);
                Ok(ctx.stats(phase, rows_in, columns_in).with_note(note))
            }
            Phase::Report => {
                let report = RunReport {
                    summary: ctx.summary(),
                    phases: ctx.phases.clone(),
                    cleaning: ctx.cleaning.clone().ok_or_else(|| missing("cleaning report"))?,
                    consolidation: ctx
                        .consolidation
                        .clone()
                        .ok_or_else(|| missing("consolidation report"))?,
                    enrichment: ctx.enrichment.clone().ok_or_else(|| missing("enrichment report"))?,
                    quality: ctx.quality.clone().ok_or_else(|| missing("quality report"))?,
                    optimization: ctx
                        .optimization
                        .clone()
                        .ok_or_else(|| missing("optimization report"))?,
                    export: ctx.export.clone(),
                };
                if let Some(exporter) = &self.exporter {
                    ctx.report_files = exporter.write_report(&report).await?;
                }
                let files = ctx.report_files.len();
                ctx.report = Some(report);
                Ok(ctx
                    .stats(phase, rows_in, columns_in)
                    .with_note(format!("{} report files written", files)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConsolidationGroup, DataType, MergeStrategy, SourceField};
    use crate::domain::{Column, Value};
    use async_trait::async_trait;
    use std::time::Duration;

    struct Fixed(Dataset);

    #[async_trait]
    impl SourcePort for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn extract(&self) -> Result<Dataset> {
            Ok(self.0.clone())
        }
    }

    /// Empty source answering after a delay
    struct SlowEmpty(Duration);

    #[async_trait]
    impl SourcePort for SlowEmpty {
        fn name(&self) -> &str {
            "slow-empty"
        }

        async fn extract(&self) -> Result<Dataset> {
            tokio::time::sleep(self.0).await;
            Ok(Dataset::new())
        }
    }

    struct FailingEnricher;

    impl Enricher for FailingEnricher {
        fn enrich(&self, _dataset: &mut Dataset) -> Result<EnrichmentReport> {
            Err(ConsolidatorError::Enrichment("boom".into()))
        }
    }

    fn config() -> Arc<ConsolidationConfig> {
        Arc::new(ConsolidationConfig::with_groups(vec![ConsolidationGroup::new(
            "Prix",
            "price_final",
            DataType::Numeric,
            MergeStrategy::FirstValid,
            vec![SourceField::new("price"), SourceField::new("prix")],
        )]))
    }

    fn listings() -> Dataset {
        let n = 30;
        Dataset::from_columns(vec![
            Column::new("ref", (0..n).map(|i| Value::Text(format!("L{}", i))).collect()),
            Column::new(
                "price",
                (0..n)
                    .map(|i| if i % 2 == 0 { Value::Int(400_000 + i * 1000) } else { Value::Null })
                    .collect(),
            ),
            Column::new(
                "prix",
                (0..n)
                    .map(|i| if i % 2 == 1 { Value::Int(500_000 + i * 1000) } else { Value::Null })
                    .collect(),
            ),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_full_run_records_every_phase() {
        let mut orchestrator = Orchestrator::new(config())
            .unwrap()
            .with_source(Arc::new(Fixed(listings())));
        let outcome = orchestrator.run().await.unwrap();

        assert!(outcome.dataset.has_column("price_final"));
        assert!(!outcome.dataset.has_column("price"));
        assert_eq!(outcome.report.phases.len(), Phase::ALL.len());
        assert_eq!(outcome.report.summary.columns_before, 3);
        assert_eq!(outcome.report.summary.columns_after, 2);
        assert!((outcome.report.summary.column_reduction_pct - 100.0 / 3.0).abs() < 1e-9);
        assert!(outcome.report.summary.quality_score.is_some());

        let record = orchestrator.last_run().unwrap();
        assert!(record.is_completed());
        assert_eq!(record.phases.len(), Phase::ALL.len());
    }

    #[tokio::test]
    async fn test_empty_extract_is_extraction_error() {
        let mut orchestrator = Orchestrator::new(config())
            .unwrap()
            .with_source(Arc::new(SlowEmpty(Duration::from_millis(20))));
        let err = orchestrator.run().await.unwrap_err();
        assert!(matches!(err, ConsolidatorError::Extraction(_)));

        let record = orchestrator.last_run().unwrap();
        assert!(record.phases.is_empty());
        match &record.state {
            RunState::Aborted { phase, elapsed_ms, cause } => {
                assert_eq!(*phase, Phase::Extract);
                assert!(*elapsed_ms >= 20, "elapsed {} ms", elapsed_ms);
                assert!(cause.contains("no rows"));
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_phase_error_is_wrapped_and_history_kept() {
        let mut orchestrator = Orchestrator::new(config())
            .unwrap()
            .with_source(Arc::new(Fixed(listings())))
            .with_enricher(Box::new(FailingEnricher));
        let err = orchestrator.run().await.unwrap_err();
        let failed_after = match err {
            ConsolidatorError::PhaseFailure { phase, elapsed_ms, cause } => {
                assert_eq!(phase, Phase::Enrich);
                assert!(cause.contains("boom"));
                elapsed_ms
            }
            other => panic!("unexpected error {:?}", other),
        };
        let record = orchestrator.last_run().unwrap();
        match &record.state {
            RunState::Aborted { phase, elapsed_ms, cause } => {
                assert_eq!(*phase, Phase::Enrich);
                assert_eq!(*elapsed_ms, failed_after);
                assert!(cause.contains("boom"));
            }
            other => panic!("unexpected state {:?}", other),
        }
        let completed: Vec<Phase> = record.phases.iter().map(|p| p.phase).collect();
        assert_eq!(completed, vec![Phase::Extract, Phase::Clean, Phase::Consolidate]);
    }

    #[tokio::test]
    async fn test_cancelled_run_stops_before_next_phase() {
        let mut orchestrator = Orchestrator::new(config())
            .unwrap()
            .with_source(Arc::new(Fixed(listings())));
        orchestrator.cancel_handle().cancel();
        let err = orchestrator.run().await.unwrap_err();
        assert!(matches!(err, ConsolidatorError::Cancelled { phase: Phase::Extract }));
        assert!(orchestrator.last_run().unwrap().phases.is_empty());

        orchestrator.cancel_handle().reset();
        assert!(orchestrator.run().await.is_ok());
        assert_eq!(orchestrator.history().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_catalog_refuses_to_start() {
        let config = ConsolidationConfig::with_groups(Vec::new());
        assert!(matches!(
            Orchestrator::new(Arc::new(config)),
            Err(ConsolidatorError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_source_is_extraction_error() {
        let mut orchestrator = Orchestrator::new(config()).unwrap();
        assert!(matches!(
            orchestrator.run().await,
            Err(ConsolidatorError::Extraction(_))
        ));
    }
}
