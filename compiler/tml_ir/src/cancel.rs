//! Cooperative cancellation.
//!
//! The build driver signals cancellation from outside; phases poll the
//! token at their defined checkpoints (after each function in checking,
//! between monomorphization drains, between CGUs in codegen). A cancelled
//! phase discards partial output and must not update any cached state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag.
///
/// Cloning is cheap; all clones observe the same flag.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

/// Returned from a phase that observed cancellation at a checkpoint.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "compilation cancelled")
    }
}

impl std::error::Error for Cancelled {}

impl CancelToken {
    /// A token that never cancels (the default for tests and one-shot runs).
    pub fn new() -> Self {
        CancelToken::default()
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// True once [`cancel`](CancelToken::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Checkpoint helper: `Err(Cancelled)` once cancelled.
    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(token.checkpoint().is_ok());
        clone.cancel();
        assert!(token.is_cancelled());
        assert_eq!(token.checkpoint(), Err(Cancelled));
    }
}
