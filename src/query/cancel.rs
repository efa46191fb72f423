//! Cooperative cancellation for long-running reads
//!
//! The caller holds one clone of the token and the traversal holds another.
//! The traversal checks it between expansions and returns what it has.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A cooperative cancellation token.
///
/// Cancelling while a page of edges is being read has no effect until the
/// next check.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// When a read must stop early: an optional token and an optional deadline
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    pub token: Option<CancellationToken>,
    pub deadline: Option<Instant>,
}

impl StopSignal {
    pub fn should_stop(&self) -> bool {
        self.token.as_ref().is_some_and(|t| t.is_cancelled())
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}
