//! Case dispatcher — the engine's two-level concurrency core.
//!
//! A FIFO queue of pending cases is drained by a bounded worker pool built
//! on `tokio::task::JoinSet`; each worker walks its case through the ordered
//! calculator chain with retry and backoff, and results land in
//! pre-allocated slots so the final table preserves enumeration order
//! regardless of completion order.

use crate::Callbacks;
use fz_calculators::{BackendStatus, Calculator, CalculatorConfig};
use fz_core::{CalculatorUri, Case, CaseResult, CaseStatus, Cancellation, CompiledCase, Model};
use fz_process::ShellPathResolver;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinSet;

/// Per-case retry budget, worker pool sizing, and the ordered calculator
/// chain.
pub struct EngineConfig {
    pub calculator_uris: Vec<CalculatorUri>,
    /// `R` — attempts per case before giving up. Default 5.
    pub retry_budget: u32,
    /// `configured_max_workers`; `None` falls back to available
    /// parallelism. The effective worker count is `max(M, this)`.
    pub max_workers: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            calculator_uris: Vec::new(),
            retry_budget: 5,
            max_workers: None,
        }
    }
}

struct EngineInner {
    calculators: Vec<(CalculatorUri, Calculator)>,
    busy: Vec<AtomicBool>,
    model: Model,
    shell_path: Arc<ShellPathResolver>,
    retry_budget: u32,
    max_workers: Option<usize>,
    cancellation: Cancellation,
}

/// The case dispatcher. Cheap to clone; every clone shares the same
/// calculator pool, busy-tracking, and cancellation flag.
#[derive(Clone)]
pub struct Engine(Arc<EngineInner>);

impl Engine {
    pub fn new(
        model: Model,
        calculator_config: CalculatorConfig,
        config: EngineConfig,
        cancellation: Cancellation,
    ) -> Self {
        let calculators: Vec<(CalculatorUri, Calculator)> = config
            .calculator_uris
            .iter()
            .map(|uri| (uri.clone(), Calculator::for_uri(uri, &calculator_config)))
            .collect();
        let busy = calculators.iter().map(|_| AtomicBool::new(false)).collect();

        Engine(Arc::new(EngineInner {
            calculators,
            busy,
            model,
            shell_path: calculator_config.shell_path.clone(),
            retry_budget: config.retry_budget.max(1),
            max_workers: config.max_workers,
            cancellation,
        }))
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.0.cancellation
    }

    fn worker_count(&self) -> usize {
        let m = self.0.calculators.len().max(1);
        let auto = self.0.max_workers.unwrap_or_else(|| {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        });
        m.max(auto)
    }

    /// Run every compiled case to completion and return one [`CaseResult`]
    /// per case, in enumeration order.
    pub async fn run(&self, cases: Vec<CompiledCase>, callbacks: Callbacks) -> Vec<CaseResult> {
        let total = cases.len();
        callbacks.fire_on_start(total);

        if total == 0 {
            callbacks.fire_on_complete(&[]);
            return Vec::new();
        }

        let fallback: Vec<(Case, std::path::PathBuf)> =
            cases.iter().map(|c| (c.case.clone(), c.dir.clone())).collect();

        let queue: VecDeque<(usize, CompiledCase)> = cases.into_iter().enumerate().collect();
        let queue = Arc::new(AsyncMutex::new(queue));
        let completed = Arc::new(AtomicUsize::new(0));

        let worker_count = self.worker_count();
        let mut join_set = JoinSet::new();

        for worker_id in 0..worker_count {
            let engine = self.clone();
            let queue = queue.clone();
            let callbacks = callbacks.clone();
            let completed = completed.clone();

            join_set.spawn(async move {
                let mut out = Vec::new();
                loop {
                    let next = { queue.lock().await.pop_front() };
                    let Some((idx, compiled)) = next else { break };

                    if engine.0.cancellation.is_cancelled() {
                        out.push((idx, engine.cancelled_result(&compiled, Instant::now())));
                        continue;
                    }

                    callbacks.fire_on_case_start(idx, &compiled.case);
                    let result = engine.run_one_case(worker_id, &compiled).await;
                    callbacks.fire_on_case_complete(idx, &result);

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    callbacks.fire_on_progress(done, total);

                    out.push((idx, result));
                }
                out
            });
        }

        let mut slots: Vec<Option<CaseResult>> = (0..total).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(worker_results) => {
                    for (idx, result) in worker_results {
                        slots[idx] = Some(result);
                    }
                }
                Err(e) => tracing::error!("scheduler worker task panicked: {e}"),
            }
        }

        let results: Vec<CaseResult> = slots
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| {
                slot.unwrap_or_else(|| {
                    let (case, path) = fallback[idx].clone();
                    CaseResult {
                        case,
                        path,
                        status: CaseStatus::Error,
                        outputs: Vec::new(),
                        calculator: None,
                        command: None,
                        error: Some("scheduler worker task panicked before completing this case".to_string()),
                        duration_s: 0.0,
                    }
                })
            })
            .collect();

        callbacks.fire_on_complete(&results);
        results
    }

    /// Walk `1..=retry_budget` attempts over the calculator chain for one
    /// case.
    async fn run_one_case(&self, worker_id: usize, compiled: &CompiledCase) -> CaseResult {
        let start = Instant::now();
        let retry_budget = self.0.retry_budget;
        let mut accumulated_errors: Vec<String> = Vec::new();
        let mut last_calculator: Option<String> = None;
        let mut last_command: Option<String> = None;

        for attempt in 1..=retry_budget {
            if self.0.cancellation.is_cancelled() {
                return self.cancelled_result(compiled, start);
            }

            for idx in self.chain_for_attempt(worker_id) {
                if self.0.cancellation.is_cancelled() {
                    return self.cancelled_result(compiled, start);
                }

                let (uri, calculator) = &self.0.calculators[idx];
                self.0.busy[idx].store(true, Ordering::Relaxed);
                let outcome = calculator
                    .execute(uri, &compiled.dir, &compiled.hash_manifest, &self.0.model, &self.0.cancellation)
                    .await;
                self.0.busy[idx].store(false, Ordering::Relaxed);

                last_calculator = Some(uri.to_string());
                last_command = Some(outcome.command_ran.clone());

                match outcome.status {
                    BackendStatus::Done | BackendStatus::Cached => {
                        match fz_extract::extract_outputs(&compiled.dir, &self.0.model, &self.0.shell_path).await {
                            Ok(outputs) if !fz_extract::any_null(&outputs) => {
                                return CaseResult {
                                    case: compiled.case.clone(),
                                    path: compiled.dir.clone(),
                                    status: if outcome.status == BackendStatus::Cached {
                                        CaseStatus::Cached
                                    } else {
                                        CaseStatus::Done
                                    },
                                    outputs: outputs.into_iter().map(|o| (o.name, o.value)).collect(),
                                    calculator: last_calculator,
                                    command: last_command,
                                    error: None,
                                    duration_s: start.elapsed().as_secs_f64(),
                                };
                            }
                            Ok(_) => accumulated_errors.push(format!("{uri}: extraction yielded a null output")),
                            Err(e) => accumulated_errors.push(format!("{uri}: extraction failed: {e}")),
                        }
                    }
                    BackendStatus::Error => {
                        if let Some(err) = &outcome.err {
                            accumulated_errors.push(format!("{uri}: {err}"));
                        }
                    }
                }
            }

            if attempt < retry_budget {
                tokio::time::sleep(jittered_backoff(attempt)).await;
            }
        }

        CaseResult {
            case: compiled.case.clone(),
            path: compiled.dir.clone(),
            status: CaseStatus::Failed,
            outputs: Vec::new(),
            calculator: last_calculator,
            command: last_command,
            error: Some(if accumulated_errors.is_empty() {
                "no calculators configured for this run".to_string()
            } else {
                accumulated_errors.join("; ")
            }),
            duration_s: start.elapsed().as_secs_f64(),
        }
    }

    fn cancelled_result(&self, compiled: &CompiledCase, start: Instant) -> CaseResult {
        CaseResult {
            case: compiled.case.clone(),
            path: compiled.dir.clone(),
            status: CaseStatus::Error,
            outputs: Vec::new(),
            calculator: None,
            command: None,
            error: Some("cancelled".to_string()),
            duration_s: start.elapsed().as_secs_f64(),
        }
    }

    /// Cache entries first (in original order), then the remaining
    /// calculators round-robin starting at a worker-local offset, with
    /// currently-busy ones pushed to the back. This is soft fairness, not
    /// a hard lock: two cases may legitimately target the same backend
    /// concurrently if no other is free.
    fn chain_for_attempt(&self, worker_id: usize) -> Vec<usize> {
        let calculators = &self.0.calculators;
        let mut cache_indices = Vec::new();
        let mut other_indices = Vec::new();
        for (i, (uri, _)) in calculators.iter().enumerate() {
            if uri.is_cache() {
                cache_indices.push(i);
            } else {
                other_indices.push(i);
            }
        }

        let n = other_indices.len();
        let mut rotated = Vec::with_capacity(n);
        if n > 0 {
            let offset = worker_id % n;
            for i in 0..n {
                rotated.push(other_indices[(offset + i) % n]);
            }
        }

        let (free, busy): (Vec<usize>, Vec<usize>) =
            rotated.into_iter().partition(|&i| !self.0.busy[i].load(Ordering::Relaxed));

        cache_indices.into_iter().chain(free).chain(busy).collect()
    }
}

/// Bounded jittered backoff: base grows linearly with attempt number,
/// capped at 2s, plus up to 25% jitter.
fn jittered_backoff(attempt: u32) -> Duration {
    let base_ms = (100u64 * attempt as u64).min(2000);
    let jitter_ceiling = (base_ms / 4).max(1);
    let jitter = rand::thread_rng().gen_range(0..=jitter_ceiling);
    Duration::from_millis(base_ms + jitter)
}
