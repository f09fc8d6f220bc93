use serde::{Deserialize, Serialize};
use std::fmt;

/// One stage of the fixed sequential pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Extract,
    Clean,
    Consolidate,
    Enrich,
    Validate,
    Optimize,
    Export,
    Report,
}

impl Phase {
    pub const ALL: [Phase; 8] = [
        Phase::Extract,
        Phase::Clean,
        Phase::Consolidate,
        Phase::Enrich,
        Phase::Validate,
        Phase::Optimize,
        Phase::Export,
        Phase::Report,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Extract => "extract",
            Phase::Clean => "clean",
            Phase::Consolidate => "consolidate",
            Phase::Enrich => "enrich",
            Phase::Validate => "validate",
            Phase::Optimize => "optimize",
            Phase::Export => "export",
            Phase::Report => "report",
        }
    }

    /// The phase that follows this one; `None` after Report.
    pub fn next(&self) -> Option<Phase> {
        let idx = Phase::ALL.iter().position(|p| p == self)?;
        Phase::ALL.get(idx + 1).copied()
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statistics recorded for one completed phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseStats {
    pub phase: Phase,
    pub rows_in: usize,
    pub rows_out: usize,
    pub columns_in: usize,
    pub columns_out: usize,
    pub duration_ms: u64,
    /// Short human-readable remarks (e.g. "3 groups failed validation")
    pub notes: Vec<String>,
}

impl PhaseStats {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            rows_in: 0,
            rows_out: 0,
            columns_in: 0,
            columns_out: 0,
            duration_ms: 0,
            notes: Vec::new(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}
