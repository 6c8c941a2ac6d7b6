//! The opaque algorithm interface the iterative driver (fzd) drives,
//! expressed as an object-safe Rust trait rather than a duck-typed plugin
//! contract.

use std::collections::HashMap;

/// One point in the input space, keyed by variable name.
pub type Design = HashMap<String, f64>;

/// What an algorithm reports back at the end of a run, or after an
/// iteration if it implements [`Algorithm::analysis_tmp`]. Mirrors the
/// Python interface's free-form `{'text':..., 'data':...}` dict with a
/// fixed, typed shape.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Analysis {
    pub text: Option<String>,
    pub data: Option<serde_json::Value>,
}

impl Analysis {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), data: None }
    }
}

/// An iterative design-of-experiments strategy. `initial_design` and
/// `next_design` propose batches of input points; `next_design` returning
/// an empty batch ends the run. Implementations may
/// hold internal state (RNG, surrogate model, iteration counter) via
/// `&mut self`.
pub trait Algorithm: Send {
    fn initial_design(&mut self, input_ranges: &HashMap<String, (f64, f64)>) -> Vec<Design>;

    fn next_design(&mut self, prior_inputs: &[Design], prior_outputs: &[Option<f64>]) -> Vec<Design>;

    fn analysis(&mut self, all_inputs: &[Design], all_outputs: &[Option<f64>]) -> Analysis;

    /// Intermediate progress report, called after every iteration when
    /// present. Default: no intermediate reporting.
    fn analysis_tmp(&mut self, _all_inputs: &[Design], _all_outputs: &[Option<f64>]) -> Option<Analysis> {
        None
    }
}
