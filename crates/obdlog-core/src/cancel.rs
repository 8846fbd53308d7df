//! Cooperative cancellation flag

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation request, observed at loop-iteration boundaries.
///
/// Setting the flag never interrupts an operation in flight; the scheduler
/// finishes the current tick and the scanner finishes the current probe.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear a previous request so a new run can start
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let flag = CancelFlag::new();
        let handler_copy = flag.clone();
        assert!(!flag.is_cancelled());

        handler_copy.cancel();
        assert!(flag.is_cancelled());

        flag.reset();
        assert!(!handler_copy.is_cancelled());
    }
}
