//! Kernel configuration.

use std::fmt;
use std::sync::Arc;

use dfwer_core::{Cancellable, Result};

use crate::combine::Combination;

/// Default scratch budget of the chunked step-down search, in `f64` values
/// (`2^26` values, 512 MiB).
pub const DEFAULT_CHUNK_BUDGET: usize = 1 << 26;

/// Configuration shared by all kernel operations.
#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct KernelConfig {
    /// How per-distribution CDF values are combined.
    pub combination: Combination,
    /// Maximum number of entries in the `CDFs × grid points` scratch matrix
    /// of the step-down critical search.
    pub chunk_budget: usize,
    /// Polled between CDFs and between chunks.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub cancellation: Option<Arc<dyn Cancellable + Send + Sync>>,
}

impl fmt::Debug for KernelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelConfig")
            .field("combination", &self.combination)
            .field("chunk_budget", &self.chunk_budget)
            .field("cancellable", &self.cancellation.is_some())
            .finish()
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            combination: Combination::Bonferroni,
            chunk_budget: DEFAULT_CHUNK_BUDGET,
            cancellation: None,
        }
    }
}

impl KernelConfig {
    /// Discrete Bonferroni configuration.
    pub fn bonferroni() -> Self {
        Self::default()
    }

    /// Independence (Šidák-type) configuration.
    pub fn independence() -> Self {
        Self {
            combination: Combination::Independence,
            ..Self::default()
        }
    }

    /// Configuration from the `independence` flag.
    pub fn from_independence(independence: bool) -> Self {
        Self {
            combination: Combination::from_independence(independence),
            ..Self::default()
        }
    }

    /// Replace the scratch budget. Values below 1 are treated as 1.
    pub fn with_chunk_budget(mut self, budget: usize) -> Self {
        self.chunk_budget = budget.max(1);
        self
    }

    /// Attach a cancellation source, usually a
    /// [`dfwer_core::CancellationToken`] whose clone stays with the caller.
    pub fn with_cancellation<C>(mut self, token: C) -> Self
    where
        C: Cancellable + Send + Sync + 'static,
    {
        self.cancellation = Some(Arc::new(token));
        self
    }

    /// Number of grid points per chunk for a family of `n_cdfs` CDFs.
    pub fn chunk_len(&self, n_cdfs: usize) -> usize {
        (self.chunk_budget / n_cdfs.max(1)).max(1)
    }

    /// Fail with [`dfwer_core::DfwerError::Cancelled`] if cancellation was
    /// requested.
    pub(crate) fn checkpoint(&self) -> Result<()> {
        match &self.cancellation {
            Some(token) => token.check(),
            None => Ok(()),
        }
    }
}
