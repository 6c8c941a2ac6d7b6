//! Lifecycle callbacks. The recognized set is fixed by this
//! struct's fields — unlike a string-keyed registry, an unknown callback
//! name simply doesn't compile, satisfying "rejected at engine
//! construction" for free.

use fz_core::{Case, CaseResult};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// All fields are optional; a run with no callbacks set is silent but
/// otherwise behaves identically.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_start: Option<Arc<dyn Fn(usize) + Send + Sync>>,
    pub on_case_start: Option<Arc<dyn Fn(usize, &Case) + Send + Sync>>,
    pub on_case_complete: Option<Arc<dyn Fn(usize, &CaseResult) + Send + Sync>>,
    pub on_progress: Option<Arc<dyn Fn(usize, usize) + Send + Sync>>,
    pub on_complete: Option<Arc<dyn Fn(&[CaseResult]) + Send + Sync>>,
}

impl Callbacks {
    pub(crate) fn fire_on_start(&self, total: usize) {
        guard(|| {
            if let Some(cb) = &self.on_start {
                cb(total);
            }
        });
    }

    pub(crate) fn fire_on_case_start(&self, index: usize, case: &Case) {
        guard(|| {
            if let Some(cb) = &self.on_case_start {
                cb(index, case);
            }
        });
    }

    pub(crate) fn fire_on_case_complete(&self, index: usize, result: &CaseResult) {
        guard(|| {
            if let Some(cb) = &self.on_case_complete {
                cb(index, result);
            }
        });
    }

    pub(crate) fn fire_on_progress(&self, completed: usize, total: usize) {
        guard(|| {
            if let Some(cb) = &self.on_progress {
                cb(completed, total);
            }
        });
    }

    pub(crate) fn fire_on_complete(&self, results: &[CaseResult]) {
        guard(|| {
            if let Some(cb) = &self.on_complete {
                cb(results);
            }
        });
    }
}

/// Run a callback inside `catch_unwind`; a panicking callback is logged
/// and otherwise ignored — it never takes the run down with it (spec
/// §4.5 "MUST be treated as untrusted").
fn guard(f: impl FnOnce()) {
    if std::panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::error!("scheduler callback panicked; run continues");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn panicking_callback_does_not_propagate() {
        let callbacks = Callbacks {
            on_start: Some(Arc::new(|_| panic!("boom"))),
            ..Default::default()
        };
        callbacks.fire_on_start(3);
    }

    #[test]
    fn progress_callback_receives_counts() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        let callbacks = Callbacks {
            on_progress: Some(Arc::new(move |completed, _total| {
                seen_clone.store(completed, Ordering::SeqCst);
            })),
            ..Default::default()
        };
        callbacks.fire_on_progress(2, 5);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
