//! Shared data model for the `fz` parametric simulation orchestrator.

pub mod cancel;
pub mod error;
pub mod model;
pub mod result;
pub mod uri;
pub mod value;

pub use cancel::Cancellation;
pub use error::FzError;
pub use model::{Delim, Interpreter, Model};
pub use result::{CaseResult, CaseStatus, ResultTable};
pub use uri::CalculatorUri;
pub use value::Value;

/// A single point in the parameter space: an ordered map of variable name to
/// scalar value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Case {
    pub assignments: Vec<(String, Value)>,
}

impl Case {
    pub fn new(assignments: Vec<(String, Value)>) -> Self {
        Self { assignments }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.assignments
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// `var1=value1,var2=value2,...` in declared order. Empty when there are
    /// no assignments (single-case run with no varying variables).
    pub fn suffix(&self) -> String {
        self.assignments
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// A directory produced by applying a [`Case`]'s assignments to the
/// template tree, plus the `.fz_hash` manifest computed over it.
#[derive(Debug, Clone)]
pub struct CompiledCase {
    pub case: Case,
    pub dir: std::path::PathBuf,
    pub hash_manifest: String,
}
