pub mod config;
pub mod domain;
pub mod error;
pub mod observability;
pub mod pipeline;

// Layered boundaries for application ports and infrastructure adapters
pub mod app;
pub mod infra;

pub use config::ConsolidationConfig;
pub use domain::{Dataset, Value};
pub use error::{ConsolidatorError, Result};
pub use pipeline::{Orchestrator, Phase};
