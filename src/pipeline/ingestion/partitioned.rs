use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, instrument};

use crate::app::ports::SourcePort;
use crate::domain::Dataset;
use crate::error::{ConsolidatorError, Result};

/// Extracts several independent partitions concurrently and concatenates
/// them, in declaration order, into one dataset.
pub struct PartitionedSource {
    name: String,
    partitions: Vec<Arc<dyn SourcePort>>,
}

impl PartitionedSource {
    pub fn new(partitions: Vec<Arc<dyn SourcePort>>) -> Self {
        let name = partitions
            .iter()
            .map(|p| p.name().to_string())
            .collect::<Vec<_>>()
            .join("+");
        Self { name, partitions }
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }
}

#[async_trait]
impl SourcePort for PartitionedSource {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(partitions = self.partitions.len()))]
    async fn extract(&self) -> Result<Dataset> {
        let mut set = JoinSet::new();
        for (idx, partition) in self.partitions.iter().enumerate() {
            let partition = Arc::clone(partition);
            set.spawn(async move { (idx, partition.extract().await) });
        }

        let mut parts: Vec<Option<Dataset>> = vec![None; self.partitions.len()];
        while let Some(joined) = set.join_next().await {
            let (idx, result) = joined.map_err(|e| {
                ConsolidatorError::Extraction(format!("partition task failed: {}", e))
            })?;
            parts[idx] = Some(result?);
        }

        let mut dataset = Dataset::new();
        for part in parts.into_iter().flatten() {
            dataset.append(part);
        }
        info!(
            "📦 Extracted {} rows from {} partitions",
            dataset.row_count(),
            self.partitions.len()
        );
        Ok(dataset)
    }
}
