/// Demo: run every phase on synthetic multi-portal listings
/// Extract → Clean → Consolidate → Enrich → Validate → Optimize → Export → Report
use listing_consolidator::{
    app::ports::ExportFormat,
    infra::{FileExporter, SyntheticSource},
    observability,
    pipeline::{orchestrator::RunState, processing::quality_gate::narrative},
    ConsolidationConfig, Orchestrator,
};
use std::{env, path::PathBuf, sync::Arc};
use tracing::{error, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    observability::init_logging();
    dotenv::dotenv().ok();
    if let Err(e) = observability::metrics::init() {
        warn!("Metrics disabled: {}", e);
    }

    // Optional positional args: row count, output directory
    let args: Vec<String> = env::args().collect();
    let rows = match args.get(1) {
        Some(arg) => arg.parse::<usize>().map_err(|_| format!("invalid row count '{}'", arg))?,
        None => 500,
    };
    let output_dir = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("output/demo"));

    println!("🏠 Listing consolidation demo");
    println!("   Rows: {}", rows);
    println!("   Output: {}\n", output_dir.display());

    let config = Arc::new(ConsolidationConfig::load(None)?);
    let exporter = FileExporter::new(&output_dir, ExportFormat::ALL.to_vec()).with_geo(config.geo.clone());
    let mut orchestrator = Orchestrator::new(Arc::clone(&config))?
        .with_source(Arc::new(SyntheticSource::new(rows, 2024)))
        .with_exporter(Arc::new(exporter));

    let outcome = match orchestrator.run().await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Demo run failed: {}", e);
            if let Some(record) = orchestrator.last_run() {
                match &record.state {
                    RunState::Aborted { phase, elapsed_ms, cause } => println!(
                        "❌ Aborted in {} after {} ms ({} phases done): {}",
                        phase,
                        elapsed_ms,
                        record.phases.len(),
                        cause
                    ),
                    _ => println!("❌ Stopped after {} phases", record.phases.len()),
                }
            }
            return Err(e.into());
        }
    };

    let report = &outcome.report;
    println!("📋 Phases:");
    for stats in &report.phases {
        println!(
            "   {:<12} {:>6} rows  {:>4} → {:<4} cols  {:>6} ms",
            stats.phase.to_string(),
            stats.rows_out,
            stats.columns_in,
            stats.columns_out,
            stats.duration_ms
        );
    }

    println!("\n🔗 Consolidation:");
    for result in &report.consolidation.results {
        println!("   {:<22} {}", result.canonical_field, result.status);
    }

    println!("\n🧹 Cleaning: {}", report.cleaning.summary());
    println!(
        "✨ Enrichment: {} metrics computed, {} failed",
        report.enrichment.computed(),
        report.enrichment.failed().len()
    );
    println!("\n🔍 {}", narrative::summarize(&report.quality));

    let summary = &report.summary;
    println!(
        "\n📊 {} → {} columns (-{:.1}%), {} → {} rows in {} ms",
        summary.columns_before,
        summary.columns_after,
        summary.column_reduction_pct,
        summary.rows_before,
        summary.rows_after,
        summary.total_duration_ms
    );
    for path in &outcome.report_files {
        println!("   📝 {}", path.display());
    }
    if let Some(export) = &report.export {
        for path in &export.file_paths {
            println!("   💾 {}", path.display());
        }
    }

    if let Some(snapshot) = observability::metrics::render() {
        println!("\n📈 Pipeline metrics:");
        for line in snapshot
            .lines()
            .filter(|l| l.starts_with("consolidator_pipeline") || l.starts_with("consolidator_quality_global"))
        {
            println!("   {}", line);
        }
    }

    Ok(())
}
