//! Shared primitives for the discrete FWER kernels.
//!
//! `dfwer-core` provides the foundation the kernel crate builds on:
//!
//! - **Error types** — [`DfwerError`] and [`Result`] for structured error handling
//! - **Cancellation** — [`Cancellable`] and [`CancellationToken`] for cooperative interrupts
//! - **Log-space probabilities** — [`LogProb`] for stable products of complements
//! - **Traits** — [`Summarizable`] for one-line result summaries

pub mod cancel;
pub mod error;
pub mod prob;
pub mod traits;

pub use cancel::{Cancellable, CancellationToken};
pub use error::{DfwerError, Result};
pub use prob::LogProb;
pub use traits::*;
