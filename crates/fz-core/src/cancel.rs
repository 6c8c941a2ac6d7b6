//! The engine's single global cancellation flag: polled between
//! suspension points by workers and calculator backends alike.
//! A thin `Arc<AtomicBool>` wrapper, not a full `CancellationToken` crate
//! dependency — the contract here is exactly "check a flag", nothing more.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uncancelled() {
        assert!(!Cancellation::new().is_cancelled());
    }

    #[test]
    fn cancel_is_visible_across_clones() {
        let c1 = Cancellation::new();
        let c2 = c1.clone();
        c1.cancel();
        assert!(c2.is_cancelled());
    }
}
