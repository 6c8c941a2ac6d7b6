//! A hand-written `Algorithm` exercises the driver loop against a plugin
//! other than the built-in `RandomUniformAlgorithm`, confirming the
//! engine only ever sees the opaque trait object.

use fz_calculators::CalculatorConfig;
use fz_core::{Cancellation, Model};
use fz_driver::{Algorithm, Analysis, Design};
use fz_process::ShellPathResolver;
use fz_scheduler::EngineConfig;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

/// Walks `x` from 0.0 upward in fixed steps, one point per iteration,
/// stopping after a fixed number of steps.
struct FixedStepAlgorithm {
    step: f64,
    remaining: u32,
    next_x: f64,
}

impl FixedStepAlgorithm {
    fn new(step: f64, steps: u32) -> Self {
        Self { step, remaining: steps, next_x: 0.0 }
    }

    fn point(&mut self) -> Vec<Design> {
        let design = HashMap::from([("x".to_string(), self.next_x)]);
        self.next_x += self.step;
        self.remaining -= 1;
        vec![design]
    }
}

impl Algorithm for FixedStepAlgorithm {
    fn initial_design(&mut self, _input_ranges: &HashMap<String, (f64, f64)>) -> Vec<Design> {
        self.point()
    }

    fn next_design(&mut self, _prior_inputs: &[Design], _prior_outputs: &[Option<f64>]) -> Vec<Design> {
        if self.remaining == 0 {
            return Vec::new();
        }
        self.point()
    }

    fn analysis(&mut self, all_inputs: &[Design], all_outputs: &[Option<f64>]) -> Analysis {
        Analysis::text(format!("walked {} steps, {} outputs", all_inputs.len(), all_outputs.len()))
    }
}

#[tokio::test]
async fn fixed_step_algorithm_drives_to_its_own_completion() {
    let template = tempdir().unwrap();
    std::fs::write(template.path().join("model.txt"), "x=$(x)\n").unwrap();
    let results_dir = tempdir().unwrap();

    let mut model = Model::default();
    model.output = vec![("y".to_string(), "grep -o '[0-9.]*' model.txt".to_string())];

    let calculator_config = CalculatorConfig {
        shell_path: Arc::new(ShellPathResolver::new(None)),
        submitter_cwd: std::env::temp_dir(),
        ssh_auto_accept_hostkeys: false,
        ssh_keepalive_secs: 60,
        funz_bind_port: 0,
        funz_discovery_timeout: Duration::from_millis(10),
    };
    let engine_config = EngineConfig {
        calculator_uris: vec!["sh://true".parse().unwrap()],
        retry_budget: 1,
        max_workers: Some(2),
    };

    let algorithm: Box<dyn Algorithm + Send> = Box::new(FixedStepAlgorithm::new(0.5, 3));

    let outcome = fz_driver::run_iterative(
        template.path(),
        HashMap::new(),
        HashMap::new(),
        model,
        "y",
        algorithm,
        calculator_config,
        engine_config,
        results_dir.path(),
        Cancellation::new(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.inputs.len(), 4);
    assert!(outcome.analysis.text.unwrap().contains("walked 4 steps"));
}
