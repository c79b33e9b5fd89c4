//! Cooperative cancellation for long-running kernel sweeps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::{DfwerError, Result};

/// Something a kernel can poll between iterations to learn whether the
/// caller wants it to stop.
pub trait Cancellable {
    /// Check if cancellation has been requested.
    fn is_cancelled(&self) -> bool;

    /// Return [`DfwerError::Cancelled`] if cancellation has been requested.
    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(DfwerError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Cancellation token wrapping a shared `AtomicBool`.
///
/// Clones share the same flag, so one clone can be handed to a kernel while
/// another stays with the caller (or another thread) to request the stop.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new token (not cancelled).
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancellable for CancellationToken {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}
