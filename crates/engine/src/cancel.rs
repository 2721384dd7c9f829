//! Cooperative stop signal.
//!
//! The flag is only consulted between nodes: a device call already in flight
//! runs to completion before the engine notices the request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared stop flag. Clones observe and set the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationController {
    stop: Arc<AtomicBool>,
}

impl CancellationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the current run to stop at the next node boundary.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Clear the flag. The engine does this when a run claims its slot and
    /// again when the run releases it.
    pub fn reset(&self) {
        self.stop.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let controller = CancellationController::new();
        let handle = controller.clone();
        assert!(!controller.is_stopped());

        handle.stop();
        assert!(controller.is_stopped());

        controller.reset();
        assert!(!handle.is_stopped());
    }
}
