//! Iterative Driver (C7, `fzd`): a thin outer loop that repeatedly asks an
//! [`Algorithm`] for a batch of input points, runs the batch through the
//! engine, reduces each case's outputs to a scalar via a restricted
//! arithmetic `output_expression`, and feeds that back to the algorithm —
//! until the algorithm returns an empty batch.

pub mod algorithm;
pub mod random_uniform;

pub use algorithm::{Algorithm, Analysis, Design};
pub use random_uniform::RandomUniformAlgorithm;

use fz_calculators::CalculatorConfig;
use fz_core::{Case, Cancellation, FzError, Model, Value};
use fz_scheduler::{Callbacks, Engine, EngineConfig};
use std::collections::HashMap;
use std::path::Path;

/// Everything fzd produces: the full `(X, Y)` table of every evaluated
/// point and the algorithm's final [`Analysis`].
pub struct IterativeOutcome {
    pub inputs: Vec<Design>,
    pub outputs: Vec<Option<f64>>,
    pub analysis: Analysis,
}

/// Run the iterative driver to completion.
///
/// `input_ranges` are the variables the algorithm is allowed to vary;
/// `fixed_vars` are additional constants merged into every compiled case.
pub async fn run_iterative(
    template: &Path,
    input_ranges: HashMap<String, (f64, f64)>,
    fixed_vars: HashMap<String, f64>,
    model: Model,
    output_expression: &str,
    mut algorithm: Box<dyn Algorithm + Send>,
    calculator_config: CalculatorConfig,
    engine_config: EngineConfig,
    results_dir: &Path,
    cancellation: Cancellation,
) -> Result<IterativeOutcome, FzError> {
    std::fs::create_dir_all(results_dir)?;

    let expr = fz_template::eval::parse(output_expression)
        .map_err(|e| FzError::Input { message: format!("invalid output expression: {e}") })?;

    let engine = Engine::new(model.clone(), calculator_config, engine_config, cancellation.clone());

    let mut all_inputs: Vec<Design> = Vec::new();
    let mut all_outputs: Vec<Option<f64>> = Vec::new();
    let mut iteration = 0u32;

    loop {
        if cancellation.is_cancelled() {
            break;
        }

        let batch = if iteration == 0 {
            algorithm.initial_design(&input_ranges)
        } else {
            algorithm.next_design(&all_inputs, &all_outputs)
        };

        if batch.is_empty() {
            break;
        }

        let cases: Vec<Case> = batch
            .iter()
            .map(|design| {
                let mut assignments: Vec<(String, Value)> = design
                    .iter()
                    .map(|(name, value)| (name.clone(), Value::Float(*value)))
                    .collect();
                assignments.extend(fixed_vars.iter().map(|(name, value)| (name.clone(), Value::Float(*value))));
                Case::new(assignments)
            })
            .collect();

        let iteration_dir = results_dir.join(format!("iter_{iteration:04}"));
        let compiled = fz_template::compile_cases(template, &cases, &model, &iteration_dir, "")?;

        let results = engine.run(compiled, Callbacks::default()).await;

        for (design, result) in batch.into_iter().zip(results.iter()) {
            let scalar = result_scalar(&expr, result);
            all_inputs.push(design);
            all_outputs.push(scalar);
        }

        if let Some(tmp) = algorithm.analysis_tmp(&all_inputs, &all_outputs) {
            tracing::info!(iteration, evaluated = all_inputs.len(), "fzd iteration complete");
            persist_analysis(results_dir, &format!("analysis_tmp_{iteration:04}.json"), &tmp)?;
        }

        iteration += 1;
    }

    let analysis = algorithm.analysis(&all_inputs, &all_outputs);
    persist_analysis(results_dir, "analysis_final.json", &analysis)?;

    Ok(IterativeOutcome { inputs: all_inputs, outputs: all_outputs, analysis })
}

/// Reduce one case's extracted outputs to a scalar via `output_expression`.
/// Failed cases and expressions that fail to evaluate (e.g. a referenced
/// output is missing because the case errored) both yield `None` rather
/// than aborting the run — one bad case must not sink the whole design.
fn result_scalar(expr: &fz_template::eval::Expr, result: &fz_core::CaseResult) -> Option<f64> {
    if !matches!(result.status, fz_core::CaseStatus::Done | fz_core::CaseStatus::Cached) {
        return None;
    }
    let vars: HashMap<String, f64> = result
        .outputs
        .iter()
        .filter_map(|(name, value)| value.as_f64().map(|v| (name.clone(), v)))
        .collect();
    fz_template::eval::eval(expr, &vars).ok()
}

fn persist_analysis(results_dir: &Path, filename: &str, analysis: &Analysis) -> Result<(), FzError> {
    let envelope = serde_json::json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "text": analysis.text,
        "data": analysis.data,
    });
    let json = serde_json::to_string_pretty(&envelope)
        .map_err(|e| FzError::Structural { message: format!("failed to serialize analysis: {e}") })?;
    std::fs::write(results_dir.join(filename), json)?;
    Ok(())
}
