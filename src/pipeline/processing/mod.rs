// Pipeline processing: cleaning, consolidation, enrichment, validation and optimization

pub mod clean;
pub mod consolidate;
pub mod enrich;
pub mod optimize;
pub mod quality_gate;
pub mod stats;
