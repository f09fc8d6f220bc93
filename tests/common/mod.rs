#![allow(dead_code)]

use async_trait::async_trait;
use listing_consolidator::app::ports::SourcePort;
use listing_consolidator::config::{
    ConsolidationConfig, ConsolidationGroup, DataType, DerivedMetric, MergeStrategy, MetricKind, SourceField,
};
use listing_consolidator::domain::Column;
use listing_consolidator::{ConsolidatorError, Dataset, Result, Value};
use std::sync::Arc;

/// Source handing out a fixed dataset
pub struct InMemorySource(pub Dataset);

#[async_trait]
impl SourcePort for InMemorySource {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn extract(&self) -> Result<Dataset> {
        Ok(self.0.clone())
    }
}

/// Source whose extraction always fails
pub struct BrokenSource;

#[async_trait]
impl SourcePort for BrokenSource {
    fn name(&self) -> &str {
        "broken"
    }

    async fn extract(&self) -> Result<Dataset> {
        Err(ConsolidatorError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "portal offline",
        )))
    }
}

pub fn source(dataset: Dataset) -> Arc<dyn SourcePort> {
    Arc::new(InMemorySource(dataset))
}

/// Price and surface groups plus a price-per-m² metric
pub fn small_catalog() -> ConsolidationConfig {
    let mut config = ConsolidationConfig::with_groups(vec![
        ConsolidationGroup::new(
            "Prix",
            "price_final",
            DataType::Numeric,
            MergeStrategy::FirstValid,
            vec![SourceField::new("price"), SourceField::new("prix")],
        ),
        ConsolidationGroup::new(
            "Surface",
            "surface_final",
            DataType::Numeric,
            MergeStrategy::FirstValid,
            vec![
                SourceField::new("surface"),
                SourceField::with_factor("living_area", 0.092903),
            ],
        ),
    ]);
    config.enrichment.metrics = vec![DerivedMetric::new(
        "price_per_m2",
        MetricKind::Ratio {
            numerator: "price_final".into(),
            denominator: "surface_final".into(),
        },
    )
    .with_range(Some(500.0), Some(40_000.0))];
    config
}

/// Twelve complete, in-range listings split over two portal dialects
pub fn clean_listings() -> Dataset {
    let n: i64 = 12;
    let half = |i: i64| i < n / 2;
    Dataset::from_columns(vec![
        Column::new("ref", (0..n).map(|i| Value::Text(format!("L{:03}", i))).collect()),
        Column::new(
            "price",
            (0..n)
                .map(|i| if half(i) { Value::Int(400_000 + i * 20_000) } else { Value::Null })
                .collect(),
        ),
        Column::new(
            "prix",
            (0..n)
                .map(|i| if half(i) { Value::Null } else { Value::Int(400_000 + i * 20_000) })
                .collect(),
        ),
        Column::new("surface", (0..n).map(|i| Value::Float(60.0 + i as f64 * 2.0)).collect()),
    ])
    .expect("columns have equal length")
}
