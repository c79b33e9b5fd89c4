//! Single-step discrete FWER kernels.
//!
//! Every test is compared against one shared critical value. The transformed
//! value of a point `q` combines the CDF values `F_i(q)` of all unique null
//! distributions, weighted by their multiplicities `m_i`:
//!
//! - Bonferroni: `Σ m_i·F_i(q)`
//! - Independence: `1 - Π (1 - F_i(q))^{m_i}`
//!
//! Both are non-decreasing in `q`, which is what lets [`critical`] find the
//! critical value with a binary search.

use dfwer_core::error::check_alpha;
use dfwer_core::{DfwerError, Result, Summarizable};
use tracing::debug;

use crate::config::KernelConfig;
use crate::family::{check_count_total, resolve_counts, CdfFamily};
use crate::stepfun::{floor_index, sweep, Cursor};

/// Result of the single-step critical value search.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SingleStepCritical {
    /// Largest support value whose transformed value is `<= alpha`, or 0 if
    /// there is none.
    pub critical_value: f64,
    /// Transformed value of every sorted observed p-value.
    pub transformed: Vec<f64>,
}

impl Summarizable for SingleStepCritical {
    fn summary(&self) -> String {
        format!(
            "single-step: critical value={}, {} transformed p-values",
            self.critical_value,
            self.transformed.len(),
        )
    }
}

/// Transform the non-decreasing `points` with the single-step rule.
///
/// `counts` gives the multiplicity of each CDF; `None` means 1 each.
///
/// # Errors
///
/// - [`DfwerError::DimensionMismatch`] if `counts` does not have one entry
///   per CDF.
/// - [`DfwerError::Cancelled`] if the configured token fires.
///
/// # Example
///
/// ```
/// use dfwer_kernel::{single_step, CdfFamily, KernelConfig};
///
/// let family = CdfFamily::new(vec![vec![0.1, 0.3, 0.6, 1.0]]).unwrap();
/// let out = single_step::transform(&family, &[0.1, 0.3], Some(&[3.0][..]), &KernelConfig::default()).unwrap();
/// assert!((out[0] - 0.3).abs() < 1e-12);
/// assert!((out[1] - 0.9).abs() < 1e-12);
/// ```
pub fn transform(
    family: &CdfFamily,
    points: &[f64],
    counts: Option<&[f64]>,
    config: &KernelConfig,
) -> Result<Vec<f64>> {
    let counts = resolve_counts(family, counts)?;
    debug!(
        n_cdfs = family.len(),
        n_points = points.len(),
        rule = ?config.combination,
        "single-step transform"
    );
    transform_points(family, points, &counts, config)
}

/// Search the single-step critical value and transform the observed values.
///
/// `grid` is the ascending support of the family and `observed` the ascending
/// observed p-values, each of which must occur in `grid`. Multiplicities must
/// account for every observed p-value; with `counts = None` there must be one
/// CDF per test.
///
/// # Errors
///
/// - [`DfwerError::InvalidAlpha`] unless `0 < alpha < 1`.
/// - [`DfwerError::DimensionMismatch`] for inconsistent multiplicities.
/// - [`DfwerError::MalformedSupport`] if an observed value is not in `grid`.
/// - [`DfwerError::Cancelled`] if the configured token fires.
pub fn critical(
    family: &CdfFamily,
    grid: &[f64],
    observed: &[f64],
    alpha: f64,
    counts: Option<&[f64]>,
    config: &KernelConfig,
) -> Result<SingleStepCritical> {
    check_alpha(alpha)?;
    let counts = resolve_counts(family, counts)?;
    check_count_total(&counts, observed.len())?;
    debug!(
        n_cdfs = family.len(),
        n_grid = grid.len(),
        n_tests = observed.len(),
        alpha,
        rule = ?config.combination,
        "single-step critical search"
    );

    // The whole grid is transformed so that observed values above alpha
    // still get a transformed value.
    let transformed_grid = transform_points(family, grid, &counts, config)?;

    // A critical value never exceeds alpha.
    let critical_value = floor_index(grid, alpha)
        .and_then(|cut| floor_index(&transformed_grid[..=cut], alpha))
        .map_or(0.0, |i| grid[i]);

    let transformed = align_observed(grid, &transformed_grid, observed)?;

    let result = SingleStepCritical {
        critical_value,
        transformed,
    };
    debug!(summary = %result.summary(), "single-step critical search done");
    Ok(result)
}

/// One sweep per CDF over `points`, accumulating with the configured rule.
fn transform_points(
    family: &CdfFamily,
    points: &[f64],
    counts: &[f64],
    config: &KernelConfig,
) -> Result<Vec<f64>> {
    let rule = config.combination;
    let mut acc = vec![rule.empty(); points.len()];
    let mut evals = vec![0.0; points.len()];

    for (cdf, &m) in family.iter().zip(counts) {
        config.checkpoint()?;
        if m == 0.0 {
            continue;
        }
        sweep(cdf, points, &mut evals, Cursor::start());
        for (a, &f) in acc.iter_mut().zip(&evals) {
            *a += rule.term(m, f);
        }
    }

    Ok(acc.into_iter().map(|a| rule.finish(a)).collect())
}

/// Read off the grid-indexed `values` at each observed p-value.
///
/// Both `grid` and `observed` are ascending, so a single forward pointer
/// suffices.
fn align_observed(grid: &[f64], values: &[f64], observed: &[f64]) -> Result<Vec<f64>> {
    let mut out = Vec::with_capacity(observed.len());
    let mut pos = 0;
    for (rank, &p) in observed.iter().enumerate() {
        while pos < grid.len() && grid[pos] < p {
            pos += 1;
        }
        if pos == grid.len() || grid[pos] != p {
            return Err(DfwerError::MalformedSupport { value: p, rank });
        }
        out.push(values[pos]);
    }
    Ok(out)
}

// ── Tests ──────────────────────────────────────────────────────────────────
