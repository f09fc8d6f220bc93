use thiserror::Error;

use crate::pipeline::phase::Phase;

#[derive(Error, Debug)]
pub enum ConsolidatorError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Phase {phase} failed after {elapsed_ms} ms: {cause}")]
    PhaseFailure {
        phase: Phase,
        elapsed_ms: u64,
        cause: String,
    },

    #[error("Run cancelled before phase {phase}")]
    Cancelled { phase: Phase },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialization failed: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Enrichment error: {0}")]
    Enrichment(String),
}

impl ConsolidatorError {
    /// Errors that end a run without being wrapped into a phase failure.
    pub fn is_fatal_taxonomy(&self) -> bool {
        matches!(
            self,
            ConsolidatorError::Configuration(_)
                | ConsolidatorError::Extraction(_)
                | ConsolidatorError::PhaseFailure { .. }
                | ConsolidatorError::Cancelled { .. }
        )
    }

    /// The phase named by this error, if it carries one.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            ConsolidatorError::PhaseFailure { phase, .. } => Some(*phase),
            ConsolidatorError::Cancelled { phase } => Some(*phase),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConsolidatorError>;
