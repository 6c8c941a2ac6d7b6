use crate::{Case, Value};
use std::path::PathBuf;

/// Outcome classification for one case's run through the calculator chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    /// The backend exited 0 and all outputs extracted non-null.
    Done,
    /// As `Done`, but sourced from a cache hit.
    Cached,
    /// The calculator chain exhausted without success.
    Failed,
    /// Structural problem (cancelled, could not even attempt).
    Error,
}

impl std::fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CaseStatus::Done => "done",
            CaseStatus::Cached => "cached",
            CaseStatus::Failed => "failed",
            CaseStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// One row of a [`ResultTable`]: the original variable assignments, the
/// path to the result directory, status, extracted outputs, and
/// provenance/error/timing fields.
#[derive(Debug, Clone)]
pub struct CaseResult {
    pub case: Case,
    pub path: PathBuf,
    pub status: CaseStatus,
    pub outputs: Vec<(String, Value)>,
    pub calculator: Option<String>,
    pub command: Option<String>,
    pub error: Option<String>,
    pub duration_s: f64,
}

impl CaseResult {
    pub fn get_output(&self, name: &str) -> Option<&Value> {
        self.outputs.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// An ordered sequence of [`CaseResult`]s, one per case in enumeration
/// order, plus the flattening the Result Assembler performs (see
/// `fz-assemble`) before producing final columns.
#[derive(Debug, Clone, Default)]
pub struct ResultTable {
    pub rows: Vec<CaseResult>,
}

impl ResultTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
