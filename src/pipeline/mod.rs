// Data processing pipeline: extraction plumbing, processing phases and the orchestrator

pub mod ingestion;
pub mod orchestrator;
pub mod phase;
pub mod processing;

pub use orchestrator::{CancelHandle, Orchestrator, RunOutcome, RunRecord, RunReport, RunSummary};
pub use phase::{Phase, PhaseStats};
