mod common;

use anyhow::Result;
use listing_consolidator::domain::Column;
use listing_consolidator::pipeline::orchestrator::RunState;
use listing_consolidator::pipeline::processing::quality_gate::QualityStatus;
use listing_consolidator::{ConsolidationConfig, ConsolidatorError, Dataset, Orchestrator, Phase, Value};
use std::sync::Arc;

use common::{clean_listings, small_catalog, source, BrokenSource};

fn builtin() -> Arc<ConsolidationConfig> {
    Arc::new(ConsolidationConfig::builtin().expect("built-in catalog parses"))
}

#[tokio::test]
async fn test_first_valid_price_through_full_run() -> Result<()> {
    let n = 5;
    let listings = Dataset::from_columns(vec![
        Column::new("listing_id", (0..n).map(|i| Value::Text(format!("EN-{}", i))).collect()),
        Column::new("price", vec![Value::Int(450_000); n]),
        Column::new("prix", vec![Value::Null; n]),
        Column::new("asking_price", vec![Value::Null; n]),
    ])?;

    let mut orchestrator = Orchestrator::new(builtin())?.with_source(source(listings));
    let outcome = orchestrator.run().await?;

    let prices = outcome.dataset.column("price_final").expect("price_final produced");
    assert_eq!(prices.len(), n);
    assert!(prices.iter().all(|v| v.as_f64() == Some(450_000.0)));
    for raw in ["price", "prix", "asking_price"] {
        assert!(!outcome.dataset.has_column(raw), "{} should be consumed", raw);
    }
    Ok(())
}

#[tokio::test]
async fn test_empty_extract_aborts_before_clean() -> Result<()> {
    let mut orchestrator = Orchestrator::new(builtin())?.with_source(source(Dataset::new()));
    let err = orchestrator.run().await.unwrap_err();
    assert!(matches!(err, ConsolidatorError::Extraction(_)));

    let record = orchestrator.last_run().expect("aborted run is recorded");
    assert!(!record.is_completed());
    assert!(record.phases.iter().all(|p| p.phase != Phase::Clean));
    assert!(matches!(record.state, RunState::Aborted { phase: Phase::Extract, .. }));
    Ok(())
}

#[tokio::test]
async fn test_source_failure_is_extraction_error_and_history_survives() -> Result<()> {
    let mut orchestrator = Orchestrator::new(Arc::new(small_catalog()))?
        .with_source(Arc::new(BrokenSource));
    let err = orchestrator.run().await.unwrap_err();
    match err {
        ConsolidatorError::Extraction(msg) => assert!(msg.contains("portal offline")),
        other => panic!("unexpected error {:?}", other),
    }

    let mut orchestrator = Orchestrator::new(Arc::new(small_catalog()))?
        .with_source(source(clean_listings()));
    orchestrator.run().await?;
    orchestrator.run().await?;
    assert_eq!(orchestrator.history().len(), 2);
    assert!(orchestrator.history().iter().all(|r| r.is_completed()));
    assert_ne!(orchestrator.history()[0].run_id, orchestrator.history()[1].run_id);
    Ok(())
}

#[tokio::test]
async fn test_clean_complete_dataset_scores_excellent() -> Result<()> {
    let mut orchestrator = Orchestrator::new(Arc::new(small_catalog()))?
        .with_source(source(clean_listings()));
    let outcome = orchestrator.run().await?;

    let quality = &outcome.report.quality;
    assert!(quality.global_score >= 0.9, "score {}", quality.global_score);
    assert!(quality.global_score <= 1.0);
    assert_eq!(quality.global_status, QualityStatus::Passed);
    assert!(outcome.dataset.has_column("price_per_m2"));
    assert_eq!(outcome.report.enrichment.computed(), 1);
    Ok(())
}

#[tokio::test]
async fn test_synthetic_run_reduces_columns_and_keeps_score_in_range() -> Result<()> {
    let mut orchestrator = Orchestrator::new(builtin())?
        .with_source(Arc::new(listing_consolidator::infra::SyntheticSource::new(300, 11)));
    let outcome = orchestrator.run().await?;
    let summary = &outcome.report.summary;

    assert!(summary.columns_after < summary.columns_before);
    assert!(summary.column_reduction_pct > 0.0);
    let score = summary.quality_score.expect("validation ran");
    assert!((0.0..=1.0).contains(&score));
    for check in &outcome.report.quality.checks {
        assert!((0.0..=1.0).contains(&check.score), "{} out of range", check.category);
    }
    assert_eq!(summary.phase_durations_ms.len(), Phase::ALL.len());
    for canonical in ["price_final", "surface_final", "latitude_final", "city_final"] {
        assert!(outcome.dataset.has_column(canonical), "missing {}", canonical);
    }
    Ok(())
}

#[tokio::test]
async fn test_rerun_on_own_output_keeps_canonical_values() -> Result<()> {
    let config = Arc::new(small_catalog());
    let mut first = Orchestrator::new(Arc::clone(&config))?.with_source(source(clean_listings()));
    let once = first.run().await?.dataset;

    let mut second = Orchestrator::new(config)?.with_source(source(once.clone()));
    let twice = second.run().await?.dataset;

    for canonical in ["price_final", "surface_final"] {
        assert_eq!(once.column(canonical), twice.column(canonical), "{} changed", canonical);
    }
    let names = twice.column_names();
    let mut unique = names.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), names.len());
    Ok(())
}

#[tokio::test]
async fn test_rerun_after_cross_portal_duplicate_keeps_rows() -> Result<()> {
    // Row 1 restates row 0 under the other portal's price column.
    let mut listings = clean_listings();
    listings.column_mut("ref").unwrap()[1] = Value::from("L000");
    listings.column_mut("price").unwrap()[1] = Value::Null;
    listings.column_mut("prix").unwrap()[1] = Value::Int(400_000);
    listings.column_mut("surface").unwrap()[1] = Value::Float(60.0);

    let config = Arc::new(small_catalog());
    let mut first = Orchestrator::new(Arc::clone(&config))?.with_source(source(listings.clone()));
    let outcome = first.run().await?;
    assert_eq!(outcome.report.consolidation.duplicates_dropped, 1);
    let once = outcome.dataset;
    assert_eq!(once.row_count(), listings.row_count() - 1);

    let mut second = Orchestrator::new(config)?.with_source(source(once.clone()));
    let twice = second.run().await?.dataset;
    assert_eq!(twice.row_count(), once.row_count());
    for canonical in ["price_final", "surface_final"] {
        assert_eq!(once.column(canonical), twice.column(canonical), "{} changed", canonical);
    }
    Ok(())
}

#[tokio::test]
async fn test_partitioned_sources_are_concatenated() -> Result<()> {
    let listings = clean_listings();
    let mut orchestrator = Orchestrator::new(Arc::new(small_catalog()))?
        .with_source(source(listings.clone()))
        .with_source(source(Dataset::from_columns(vec![
            Column::new("ref", vec!["X001".into()]),
            Column::new("price", vec![Value::Int(900_000)]),
            Column::new("surface", vec![Value::Float(100.0)]),
        ])?));
    let outcome = orchestrator.run().await?;
    assert_eq!(outcome.report.summary.rows_before, listings.row_count() + 1);
    Ok(())
}
