//! Kernels for discrete family-wise error rate control.
//!
//! Given the discrete null CDFs of a family of tests, these kernels compute
//! transformed (adjusted) p-values and the critical constants of the
//! discrete Bonferroni and independence procedures, in single-step and
//! step-down form:
//!
//! - **Step functions** — [`stepfun`] evaluates discrete CDFs by monotone scan or binary search
//! - **Ordering** — [`order`] ranks per-distribution contributions
//! - **Combination rules** — [`Combination`] (Bonferroni sum, independence product)
//! - **Families** — [`CdfFamily`], [`RankMap`], [`PreparedFamily`]
//! - **Single-step** — [`single_step::transform`], [`single_step::critical`]
//! - **Step-down** — [`step_down::transform`], [`step_down::critical`]
//!
//! ```
//! use dfwer_kernel::{single_step, step_down, KernelConfig, PreparedFamily};
//!
//! let per_test = vec![
//!     vec![0.005, 0.04, 0.3, 1.0],
//!     vec![0.01, 0.02, 0.1, 1.0],
//! ];
//! let prep = PreparedFamily::from_tests(&per_test, &[0.04, 0.01]).unwrap();
//! let cfg = KernelConfig::default();
//!
//! let ss = single_step::critical(
//!     &prep.family, &prep.support, &prep.sorted_pvalues, 0.05, Some(prep.counts.as_slice()), &cfg,
//! ).unwrap();
//! let sd = step_down::critical(
//!     &prep.family, &prep.support, &prep.sorted_pvalues, 0.05, Some(&prep.ranks), &cfg,
//! ).unwrap();
//! assert_eq!(ss.critical_value, 0.02);
//! assert_eq!(sd.critical_values, vec![0.02, 0.04]);
//! ```

pub mod combine;
pub mod config;
pub mod family;
pub mod order;
pub mod single_step;
pub mod step_down;
pub mod stepfun;

pub use combine::Combination;
pub use config::KernelConfig;
pub use family::{CdfFamily, PreparedFamily, RankMap};
pub use single_step::SingleStepCritical;
pub use step_down::StepDownCritical;

pub use dfwer_core::{DfwerError, Result};
