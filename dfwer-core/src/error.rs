//! Structured error types for the dfwer kernels.

use thiserror::Error;

/// Unified error type for all kernel operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DfwerError {
    /// An observed p-value does not occur in the supplied support grid.
    #[error("malformed support: observed p-value {value} at rank {rank} is not in the support grid")]
    MalformedSupport {
        /// The observed value that could not be matched.
        value: f64,
        /// Its 0-based rank among the sorted observed p-values.
        rank: usize,
    },

    /// Multiplicities or rank mapping inconsistent with the family or test count.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Target level outside the open interval (0, 1).
    #[error("alpha must lie strictly between 0 and 1, got {0}")]
    InvalidAlpha(f64),

    /// Invalid input (malformed CDF, bad rank lists)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The caller requested cancellation while the computation was running.
    #[error("computation cancelled")]
    Cancelled,
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, DfwerError>;

/// Reject `alpha` unless it lies strictly between 0 and 1.
pub fn check_alpha(alpha: f64) -> Result<()> {
    if alpha > 0.0 && alpha < 1.0 {
        Ok(())
    } else {
        Err(DfwerError::InvalidAlpha(alpha))
    }
}
