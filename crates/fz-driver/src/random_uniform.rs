//! A minimal but genuinely usable [`Algorithm`]: draws batches uniformly
//! at random from the input ranges until an iteration budget is spent —
//! the simplest conforming plugin.

use crate::algorithm::{Algorithm, Analysis, Design};
use rand::Rng;
use std::collections::HashMap;

pub struct RandomUniformAlgorithm {
    batch_size: usize,
    max_iterations: usize,
    iteration: usize,
    ranges: HashMap<String, (f64, f64)>,
}

impl RandomUniformAlgorithm {
    pub fn new(batch_size: usize, max_iterations: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            max_iterations,
            iteration: 0,
            ranges: HashMap::new(),
        }
    }

    fn sample_batch(&self) -> Vec<Design> {
        let mut rng = rand::thread_rng();
        (0..self.batch_size)
            .map(|_| {
                self.ranges
                    .iter()
                    .map(|(name, (min, max))| (name.clone(), rng.gen_range(*min..=*max)))
                    .collect()
            })
            .collect()
    }
}

impl Algorithm for RandomUniformAlgorithm {
    fn initial_design(&mut self, input_ranges: &HashMap<String, (f64, f64)>) -> Vec<Design> {
        self.ranges = input_ranges.clone();
        self.iteration = 1;
        self.sample_batch()
    }

    fn next_design(&mut self, _prior_inputs: &[Design], _prior_outputs: &[Option<f64>]) -> Vec<Design> {
        if self.iteration >= self.max_iterations {
            return Vec::new();
        }
        self.iteration += 1;
        self.sample_batch()
    }

    fn analysis(&mut self, all_inputs: &[Design], all_outputs: &[Option<f64>]) -> Analysis {
        let values: Vec<f64> = all_outputs.iter().filter_map(|v| *v).collect();
        if values.is_empty() {
            return Analysis::text(format!(
                "{} evaluations, no successful outputs",
                all_inputs.len()
            ));
        }
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let best_index = all_outputs
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.map(|v| (i, v)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i);

        Analysis {
            text: Some(format!(
                "{} evaluations, {} successful, min={min:.6} max={max:.6} mean={mean:.6}",
                all_inputs.len(),
                values.len()
            )),
            data: Some(serde_json::json!({
                "count": values.len(),
                "min": min,
                "max": max,
                "mean": mean,
                "best_index": best_index,
            })),
        }
    }

    fn analysis_tmp(&mut self, all_inputs: &[Design], all_outputs: &[Option<f64>]) -> Option<Analysis> {
        let successes = all_outputs.iter().filter(|v| v.is_some()).count();
        Some(Analysis::text(format!(
            "iteration {}: {}/{} evaluated so far",
            self.iteration,
            successes,
            all_inputs.len()
        )))
    }
}
