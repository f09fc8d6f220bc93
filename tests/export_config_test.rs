mod common;

use anyhow::Result;
use listing_consolidator::app::ports::ExportFormat;
use listing_consolidator::infra::file_exporter::{REPORT_JSON, REPORT_MARKDOWN};
use listing_consolidator::infra::{CsvSource, FileExporter, SyntheticSource};
use listing_consolidator::{ConsolidationConfig, ConsolidatorError, Orchestrator};
use std::sync::Arc;
use tempfile::tempdir;

#[test]
fn test_builtin_catalog_passes_self_check() -> Result<()> {
    let config = ConsolidationConfig::builtin()?;
    let check = config.validate()?;
    assert_eq!(check.group_count, config.groups.len());
    assert!(check.group_count >= config.thresholds.min_groups);

    let dir = tempdir()?;
    let path = dir.path().join("printed.toml");
    std::fs::write(&path, config.to_toml_string()?)?;
    assert_eq!(ConsolidationConfig::load(Some(path.as_path()))?, config);
    Ok(())
}

#[test]
fn test_catalog_file_with_unknown_strategy_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("catalog.toml");
    std::fs::write(
        &path,
        r#"
version = "0.0.1"

[[groups]]
name = "Prix"
canonical_field = "price_final"
sources = ["price"]
type = "numeric"
strategy = "loudest"
"#,
    )?;
    let err = ConsolidationConfig::from_file(&path).unwrap_err();
    assert!(matches!(err, ConsolidatorError::Configuration(_)), "{:?}", err);
    assert!(err.to_string().contains("loudest"));
    assert!(matches!(
        ConsolidationConfig::load(Some(path.as_path())),
        Err(ConsolidatorError::Configuration(_))
    ));
    Ok(())
}

#[test]
fn test_strategy_incompatible_with_type_fails_self_check() -> Result<()> {
    let config = ConsolidationConfig::from_toml_str(
        r#"
version = "0.0.2"

[[groups]]
name = "Ville"
canonical_field = "city_final"
sources = ["city"]
type = "categorical"
strategy = "mean"
"#,
    )?;
    assert!(matches!(config.validate(), Err(ConsolidatorError::Configuration(_))));
    assert!(Orchestrator::new(Arc::new(config)).is_err());
    Ok(())
}

#[tokio::test]
async fn test_synthetic_run_writes_exports_and_reports() -> Result<()> {
    let dir = tempdir()?;
    let config = Arc::new(ConsolidationConfig::builtin()?);
    let exporter = FileExporter::new(dir.path(), ExportFormat::ALL.to_vec()).with_geo(config.geo.clone());
    let mut orchestrator = Orchestrator::new(Arc::clone(&config))?
        .with_source(Arc::new(SyntheticSource::new(150, 3)))
        .with_exporter(Arc::new(exporter));
    let outcome = orchestrator.run().await?;

    let export = outcome.report.export.as_ref().expect("exporter ran");
    assert!(export.success, "{:?}", export.error);
    for name in ["listings.csv", "listings.json", "listings.geojson", REPORT_JSON, REPORT_MARKDOWN] {
        assert!(dir.path().join(name).exists(), "{} missing", name);
    }
    assert_eq!(outcome.report_files.len(), 2);

    let report: serde_json::Value = serde_json::from_slice(&std::fs::read(dir.path().join(REPORT_JSON))?)?;
    let score = report["quality"]["global_score"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&score));
    let markdown = std::fs::read_to_string(dir.path().join(REPORT_MARKDOWN))?;
    assert!(markdown.contains("# Data Quality Report"));

    let geojson: serde_json::Value =
        serde_json::from_slice(&std::fs::read(dir.path().join("listings.geojson"))?)?;
    assert_eq!(geojson["type"], "FeatureCollection");
    assert!(!geojson["features"].as_array().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_exported_csv_feeds_a_new_run() -> Result<()> {
    let dir = tempdir()?;
    let config = Arc::new(common::small_catalog());
    let exporter = FileExporter::new(dir.path(), vec![ExportFormat::Csv, ExportFormat::Json]);
    let mut first = Orchestrator::new(Arc::clone(&config))?
        .with_source(common::source(common::clean_listings()))
        .with_exporter(Arc::new(exporter));
    let exported = first.run().await?.dataset;

    let mut from_csv = Orchestrator::new(config)?
        .with_source(Arc::new(CsvSource::new(dir.path().join("listings.csv"))));
    let outcome = from_csv.run().await?;
    assert_eq!(outcome.dataset.row_count(), exported.row_count());
    assert!(outcome.dataset.has_column("price_final"));

    Ok(())
}
