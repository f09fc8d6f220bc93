use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use listing_consolidator::app::ports::{ExportFormat, SourcePort};
use listing_consolidator::infra::{
    file_exporter, synthetic_source, CsvSource, FileExporter, HttpJsonSource, JsonSource, SyntheticSource,
};
use listing_consolidator::observability;
use listing_consolidator::pipeline::ingestion::Limits;
use listing_consolidator::{ConsolidationConfig, Orchestrator};

#[derive(Parser)]
#[command(name = "listing-consolidator")]
#[command(about = "Consolidate, clean, enrich and score real-estate listing data")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceKind {
    Csv,
    Json,
    Synthetic,
    Http,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline on one input and export the result
    Run {
        #[arg(long, value_enum, default_value = "synthetic")]
        source: SourceKind,
        /// Input file for csv/json sources
        #[arg(long)]
        input: Option<PathBuf>,
        /// Endpoint for the http source; repeat for several pages
        #[arg(long = "url")]
        urls: Vec<String>,
        /// JSON pointer to the record array in each http response
        #[arg(long)]
        records_pointer: Option<String>,
        /// Rows produced by the synthetic source
        #[arg(long, default_value_t = 1000)]
        rows: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Catalog file; falls back to CONSOLIDATOR_CONFIG, then the built-in catalog
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
        /// Comma-separated export formats
        #[arg(long, default_value = "csv,json")]
        formats: String,
    },
    /// Load a catalog and run its self-check
    CheckConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the built-in catalog as TOML
    PrintConfig,
    /// Write a synthetic multi-portal CSV
    Generate {
        #[arg(long, default_value_t = 1000)]
        rows: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long)]
        output: PathBuf,
    },
}

fn parse_formats(list: &str) -> anyhow::Result<Vec<ExportFormat>> {
    let formats = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<ExportFormat>())
        .collect::<Result<Vec<_>, _>>()?;
    if formats.is_empty() {
        bail!("at least one export format is required");
    }
    Ok(formats)
}

fn build_source(
    kind: SourceKind,
    input: Option<PathBuf>,
    urls: Vec<String>,
    records_pointer: Option<String>,
    rows: usize,
    seed: u64,
) -> anyhow::Result<Arc<dyn SourcePort>> {
    let source: Arc<dyn SourcePort> = match kind {
        SourceKind::Csv => Arc::new(CsvSource::new(input.context("--input is required for the csv source")?)),
        SourceKind::Json => Arc::new(JsonSource::new(input.context("--input is required for the json source")?)),
        SourceKind::Synthetic => Arc::new(SyntheticSource::new(rows, seed)),
        SourceKind::Http => {
            if urls.is_empty() {
                bail!("at least one --url is required for the http source");
            }
            let mut source = HttpJsonSource::new(urls, Limits::default(), listing_consolidator::infra::http_source::DEFAULT_TIMEOUT)?;
            if let Some(pointer) = records_pointer {
                source = source.with_records_pointer(pointer);
            }
            Arc::new(source)
        }
    };
    Ok(source)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    observability::init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            source,
            input,
            urls,
            records_pointer,
            rows,
            seed,
            config,
            output_dir,
            formats,
        } => {
            if let Err(e) = observability::metrics::init() {
                warn!("Metrics disabled: {}", e);
            }
            let formats = parse_formats(&formats)?;
            let config = Arc::new(ConsolidationConfig::load(config.as_deref())?);
            let source = build_source(source, input, urls, records_pointer, rows, seed)?;
            let exporter = FileExporter::new(&output_dir, formats).with_geo(config.geo.clone());

            println!("🚀 Running consolidation pipeline (catalog v{})...", config.version);
            let mut orchestrator = Orchestrator::new(Arc::clone(&config))?
                .with_source(source)
                .with_exporter(Arc::new(exporter));

            match orchestrator.run().await {
                Ok(outcome) => {
                    let summary = &outcome.report.summary;
                    println!("\n📊 Run {}:", summary.run_id);
                    println!("   Rows: {} → {}", summary.rows_before, summary.rows_after);
                    println!(
                        "   Columns: {} → {} (-{:.1}%)",
                        summary.columns_before, summary.columns_after, summary.column_reduction_pct
                    );
                    if let (Some(score), Some(status)) = (summary.quality_score, summary.quality_status) {
                        println!("   Quality: {:.3} ({})", score, status);
                    }
                    println!("   Duration: {} ms", summary.total_duration_ms);
                    for path in &outcome.report_files {
                        println!("   Report: {}", path.display());
                    }
                    if let Some(export) = &outcome.report.export {
                        for path in &export.file_paths {
                            println!("   Export: {}", path.display());
                        }
                        if let Some(err) = &export.error {
                            println!("\n⚠️  Export problems: {}", err);
                        }
                    }
                    println!("✅ Pipeline completed");
                }
                Err(e) => {
                    error!("Pipeline failed: {}", e);
                    println!("❌ Pipeline failed: {}", e);
                    return Err(e.into());
                }
            }
        }
        Commands::CheckConfig { config } => {
            let config = ConsolidationConfig::load(config.as_deref())?;
            let check = config.validate()?;
            println!("✅ Catalog v{} is valid", config.version);
            println!("   Groups: {}", check.group_count);
            println!("   Derived metrics: {}", check.derived_metric_count);
            if !check.ambiguous_sources.is_empty() {
                println!("\n⚠️  Source fields claimed by several groups:");
                for source in &check.ambiguous_sources {
                    println!("   - {}", source);
                }
            }
        }
        Commands::PrintConfig => {
            let config = ConsolidationConfig::builtin()?;
            print!("{}", config.to_toml_string()?);
        }
        Commands::Generate { rows, seed, output } => {
            let dataset = synthetic_source::generate(rows, seed);
            let bytes = file_exporter::to_csv(&dataset)?;
            if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&output, bytes).with_context(|| format!("writing {}", output.display()))?;
            info!("Generated {} rows into {}", dataset.row_count(), output.display());
            println!(
                "🎲 Wrote {} listings × {} columns to {}",
                dataset.row_count(),
                dataset.column_count(),
                output.display()
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_formats() {
        assert_eq!(
            parse_formats("csv, geojson").unwrap(),
            vec![ExportFormat::Csv, ExportFormat::GeoJson]
        );
        assert!(parse_formats("csv,xlsx").is_err());
        assert!(parse_formats(" , ").is_err());
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "listing-consolidator",
            "run",
            "--source",
            "http",
            "--url",
            "http://a",
            "--url",
            "http://b",
        ])
        .unwrap();
        match cli.command {
            Commands::Run { urls, .. } => assert_eq!(urls.len(), 2),
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_file_sources_require_input() {
        assert!(build_source(SourceKind::Csv, None, vec![], None, 10, 1).is_err());
        assert!(build_source(SourceKind::Http, None, vec![], None, 10, 1).is_err());
    }
}
