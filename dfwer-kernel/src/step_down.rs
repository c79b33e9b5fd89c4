//! Step-down discrete FWER kernels.
//!
//! Tests are processed from the smallest to the largest p-value. Once the
//! tests at ranks `0..r` have been rejected, only the CDF "slots" of the
//! remaining tests can still produce a false rejection, so the test at rank
//! `r` weights CDF `i` by the number of its tests at rank `>= r`.
//!
//! [`critical`] sweeps the whole support grid once, in chunks whose scratch
//! matrix (`CDFs × chunk`) stays within [`KernelConfig::chunk_budget`]. At
//! every grid point it bounds the worst-case combination over the tests that
//! are still open: the largest CDF values are charged first, each up to its
//! multiplicity, until the remaining rank budget is spent.

use dfwer_core::error::check_alpha;
use dfwer_core::{DfwerError, Result, Summarizable};
use tracing::{debug, trace};

use crate::combine::Combination;
use crate::config::KernelConfig;
use crate::family::{resolve_ranks, CdfFamily, RankMap};
use crate::order::order_into;
use crate::stepfun::{eval, sweep, Cursor};

/// Result of the step-down critical value search.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StepDownCritical {
    /// One critical value per rank, non-decreasing, each `<= alpha`.
    pub critical_values: Vec<f64>,
    /// Transformed value of every sorted observed p-value.
    pub transformed: Vec<f64>,
}

impl Summarizable for StepDownCritical {
    fn summary(&self) -> String {
        let largest = self.critical_values.last().copied().unwrap_or(0.0);
        format!(
            "step-down: {} critical values (largest={}), {} transformed p-values",
            self.critical_values.len(),
            largest,
            self.transformed.len(),
        )
    }
}

/// Transform the sorted observed p-values with the step-down rule.
///
/// `ranks` assigns the sorted tests to CDFs; `None` means CDF `i` belongs to
/// rank `i`.
///
/// # Errors
///
/// - [`DfwerError::DimensionMismatch`] if the rank map does not match the
///   family or the number of observed values.
/// - [`DfwerError::Cancelled`] if the configured token fires.
pub fn transform(
    family: &CdfFamily,
    observed: &[f64],
    ranks: Option<&RankMap>,
    config: &KernelConfig,
) -> Result<Vec<f64>> {
    let ranks = resolve_ranks(family, ranks, observed.len())?;
    let rule = config.combination;
    debug!(
        n_cdfs = family.len(),
        n_tests = observed.len(),
        rule = ?rule,
        "step-down transform"
    );

    let mut acc = vec![rule.empty(); observed.len()];
    for (i, cdf) in family.iter().enumerate() {
        config.checkpoint()?;
        let list = ranks.ranks(i);
        let last = ranks.last_rank(i);

        let mut cursor = Cursor::start();
        // Number of this CDF's ranks strictly below the current position.
        let mut passed = 0;
        for (j, &p) in observed[..=last].iter().enumerate() {
            let (f, next) = eval(cdf, p, cursor);
            cursor = next;
            let w = (list.len() - passed) as f64;
            acc[j] += rule.term(w, f);
            if list[passed] == j {
                passed += 1;
            }
        }
    }

    Ok(acc.into_iter().map(|a| rule.finish(a)).collect())
}

/// Search the step-down critical values and transform the observed values.
///
/// `grid` is the ascending support of the family and `observed` the ascending
/// observed p-values, each of which must occur in `grid`.
///
/// # Errors
///
/// - [`DfwerError::InvalidAlpha`] unless `0 < alpha < 1`.
/// - [`DfwerError::DimensionMismatch`] if the rank map does not match the
///   family or the number of observed values.
/// - [`DfwerError::MalformedSupport`] if an observed value is not in `grid`.
/// - [`DfwerError::Cancelled`] if the configured token fires.
///
/// # Example
///
/// ```
/// use dfwer_kernel::{step_down, CdfFamily, KernelConfig};
///
/// let family = CdfFamily::new(vec![
///     vec![0.01, 0.02, 0.1, 1.0],
///     vec![0.005, 0.04, 0.3, 1.0],
/// ]).unwrap();
/// let grid = family.support();
/// let res = step_down::critical(&family, &grid, &[0.01, 0.04], 0.05, None, &KernelConfig::default()).unwrap();
/// assert_eq!(res.critical_values, vec![0.02, 0.04]);
/// ```
pub fn critical(
    family: &CdfFamily,
    grid: &[f64],
    observed: &[f64],
    alpha: f64,
    ranks: Option<&RankMap>,
    config: &KernelConfig,
) -> Result<StepDownCritical> {
    check_alpha(alpha)?;
    let ranks = resolve_ranks(family, ranks, observed.len())?;
    let chunk_len = config.chunk_len(family.len());
    debug!(
        n_cdfs = family.len(),
        n_grid = grid.len(),
        n_tests = observed.len(),
        alpha,
        chunk_len,
        n_chunks = grid.len().div_ceil(chunk_len),
        rule = ?config.combination,
        "step-down critical search"
    );

    let mut search = CriticalSearch::new(family, &ranks, grid, observed, alpha, config.combination);
    for start in (0..grid.len()).step_by(chunk_len) {
        if search.is_done() {
            break;
        }
        config.checkpoint()?;
        let end = (start + chunk_len).min(grid.len());
        trace!(
            start,
            end,
            crit_rank = search.crit_rank,
            transf_rank = search.transf_rank,
            "step-down chunk"
        );
        search.fill_chunk(start, end, config)?;
        search.scan_chunk(start, end)?;
    }

    let result = search.finish()?;
    debug!(summary = %result.summary(), "step-down critical search done");
    Ok(result)
}

/// State of the chunked sweep over the support grid.
///
/// Two counters advance independently: `crit_rank` is the first rank whose
/// critical value is still unknown, `transf_rank` the first observed value
/// not yet transformed. Per-CDF cursors carry the step-function scans across
/// chunk boundaries.
struct CriticalSearch<'a> {
    family: &'a CdfFamily,
    ranks: &'a RankMap,
    grid: &'a [f64],
    observed: &'a [f64],
    alpha: f64,
    rule: Combination,

    cursors: Vec<Cursor>,
    /// `CDFs × chunk` evaluations, one row per CDF.
    scratch: Vec<f64>,
    /// Evaluations of all CDFs at the current grid point.
    column: Vec<f64>,
    /// CDF indices by descending `column` value.
    order: Vec<usize>,

    crit_rank: usize,
    transf_rank: usize,
    critical_values: Vec<f64>,
    transformed: Vec<f64>,
}

impl<'a> CriticalSearch<'a> {
    fn new(
        family: &'a CdfFamily,
        ranks: &'a RankMap,
        grid: &'a [f64],
        observed: &'a [f64],
        alpha: f64,
        rule: Combination,
    ) -> Self {
        let n_cdfs = family.len();
        let n_tests = observed.len();
        Self {
            family,
            ranks,
            grid,
            observed,
            alpha,
            rule,
            cursors: vec![Cursor::start(); n_cdfs],
            scratch: Vec::new(),
            column: vec![0.0; n_cdfs],
            order: Vec::with_capacity(n_cdfs),
            crit_rank: 0,
            transf_rank: 0,
            critical_values: vec![0.0; n_tests],
            transformed: vec![0.0; n_tests],
        }
    }

    fn n_tests(&self) -> usize {
        self.observed.len()
    }

    fn is_done(&self) -> bool {
        self.crit_rank == self.n_tests() && self.transf_rank == self.n_tests()
    }

    /// Evaluate every CDF on `grid[start..end]`, continuing each scan.
    fn fill_chunk(&mut self, start: usize, end: usize, config: &KernelConfig) -> Result<()> {
        let width = end - start;
        let grid = self.grid;
        let points = &grid[start..end];
        self.scratch.clear();
        self.scratch.resize(self.family.len() * width, 0.0);
        for (i, (cdf, row)) in self
            .family
            .iter()
            .zip(self.scratch.chunks_exact_mut(width))
            .enumerate()
        {
            config.checkpoint()?;
            self.cursors[i] = sweep(cdf, points, row, self.cursors[i]);
        }
        Ok(())
    }

    /// Walk the grid points of the current chunk.
    fn scan_chunk(&mut self, start: usize, end: usize) -> Result<()> {
        let width = end - start;
        for j in 0..width {
            if self.is_done() {
                break;
            }
            let g = start + j;
            for (i, slot) in self.column.iter_mut().enumerate() {
                *slot = self.scratch[i * width + j];
            }
            // Once every critical value is known only transforms remain.
            if self.crit_rank < self.n_tests() {
                order_into(&self.column, true, &mut self.order);
            }

            // Stay on this grid point while it fails for the current rank;
            // later ranks have a smaller budget and may still accept it.
            let value = self.grid[g];
            while self.crit_rank < self.n_tests() && !self.admits(value) {
                self.critical_values[self.crit_rank] = if g > 0 { self.grid[g - 1] } else { 0.0 };
                self.crit_rank += 1;
            }

            self.transform_matches(value)?;
        }
        Ok(())
    }

    /// Whether rejecting at `value` keeps the worst-case combination for
    /// `crit_rank` within alpha.
    ///
    /// The test itself contributes `value`; the `n - crit_rank - 1` tests
    /// behind it are charged to the CDFs with the largest values first.
    fn admits(&self, value: f64) -> bool {
        let rule = self.rule;
        let mut budget = self.n_tests() - self.crit_rank - 1;
        let mut acc = rule.empty() + rule.term(1.0, value);
        if rule.finish(acc) > self.alpha {
            return false;
        }
        for &i in &self.order {
            if budget == 0 {
                break;
            }
            let w = self.ranks.count(i).min(budget);
            acc += rule.term(w as f64, self.column[i]);
            budget -= w;
            if rule.finish(acc) > self.alpha {
                return false;
            }
        }
        true
    }

    /// Transform every observed value equal to the grid point `value`.
    fn transform_matches(&mut self, value: f64) -> Result<()> {
        let n = self.n_tests();
        if self.transf_rank < n && self.observed[self.transf_rank] < value {
            return Err(DfwerError::MalformedSupport {
                value: self.observed[self.transf_rank],
                rank: self.transf_rank,
            });
        }
        while self.transf_rank < n && self.observed[self.transf_rank] == value {
            let rank = self.transf_rank;
            let rule = self.rule;
            let acc = self
                .column
                .iter()
                .enumerate()
                .fold(rule.empty(), |acc, (i, &f)| {
                    acc + rule.term(self.ranks.remaining(i, rank) as f64, f)
                });
            self.transformed[rank] = rule.finish(acc);
            self.transf_rank += 1;
        }
        Ok(())
    }

    fn finish(mut self) -> Result<StepDownCritical> {
        let n = self.n_tests();
        if self.transf_rank < n {
            return Err(DfwerError::MalformedSupport {
                value: self.observed[self.transf_rank],
                rank: self.transf_rank,
            });
        }
        // Grid exhausted: every point satisfied the remaining ranks.
        if self.crit_rank < n {
            let last = self.grid.last().copied().unwrap_or(0.0);
            self.critical_values[self.crit_rank..].fill(last);
        }
        Ok(StepDownCritical {
            critical_values: self.critical_values,
            transformed: self.transformed,
        })
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::single_step;
    use dfwer_core::{Cancellable, CancellationToken};

    const TOL: f64 = 1e-12;

    fn two_cdfs() -> CdfFamily {
        CdfFamily::new(vec![
            vec![0.01, 0.02, 0.1, 1.0],
            vec![0.005, 0.04, 0.3, 1.0],
        ])
        .unwrap()
    }

    /// A: ranks 0 and 2, B: rank 1.
    fn shared_family() -> (CdfFamily, RankMap, Vec<f64>) {
        let fam = CdfFamily::new(vec![vec![0.01, 0.5, 1.0], vec![0.02, 1.0]]).unwrap();
        let ranks = RankMap::new(vec![vec![0, 2], vec![1]], 3).unwrap();
        (fam, ranks, vec![0.01, 0.02, 0.5])
    }

    /// Reports cancellation from the `limit`-th poll on.
    #[derive(Default)]
    struct CancelAfter {
        polls: AtomicUsize,
        limit: usize,
    }

    impl Cancellable for CancelAfter {
        fn is_cancelled(&self) -> bool {
            self.polls.fetch_add(1, Ordering::SeqCst) + 1 >= self.limit
        }
    }

    fn assert_close(got: &[f64], want: &[f64]) {
        assert_eq!(got.len(), want.len());
        for (i, (g, w)) in got.iter().zip(want).enumerate() {
            assert!((g - w).abs() < TOL, "index {i}: got {g}, want {w}");
        }
    }

    #[test]
    fn transform_identity_ranks() {
        let fam = two_cdfs();
        let out = transform(&fam, &[0.01, 0.04], None, &KernelConfig::bonferroni()).unwrap();
        // Rank 1 no longer counts the first CDF.
        assert_close(&out, &[0.015, 0.04]);
    }

    #[test]
    fn transform_shared_ranks() {
        let (fam, ranks, observed) = shared_family();
        let out = transform(&fam, &observed, Some(&ranks), &KernelConfig::bonferroni()).unwrap();
        assert_close(&out, &[0.02, 0.03, 0.5]);
    }

    #[test]
    fn transform_never_exceeds_single_step() {
        let (fam, ranks, observed) = shared_family();
        for cfg in [KernelConfig::bonferroni(), KernelConfig::independence()] {
            let sd = transform(&fam, &observed, Some(&ranks), &cfg).unwrap();
            let ss = single_step::transform(&fam, &observed, Some(ranks.counts().as_slice()), &cfg).unwrap();
            for (a, b) in sd.iter().zip(&ss) {
                assert!(*a <= *b + TOL, "step-down {a} > single-step {b}");
            }
        }
    }

    #[test]
    fn critical_identity_ranks() {
        let fam = two_cdfs();
        let grid = fam.support();
        let res = critical(&fam, &grid, &[0.01, 0.04], 0.05, None, &KernelConfig::bonferroni())
            .unwrap();
        assert_eq!(res.critical_values, vec![0.02, 0.04]);
        assert_close(&res.transformed, &[0.015, 0.04]);
    }

    #[test]
    fn critical_shared_ranks() {
        let (fam, ranks, observed) = shared_family();
        let grid = fam.support();
        let res = critical(&fam, &grid, &observed, 0.045, Some(&ranks), &KernelConfig::bonferroni())
            .unwrap();
        // At 0.02 the worst case for rank 0 is 0.02 + 0.02 + 0.01 > 0.045,
        // while rank 1 only carries one more test: 0.02 + 0.02.
        assert_eq!(res.critical_values, vec![0.01, 0.02, 0.02]);
        assert_close(&res.transformed, &[0.02, 0.03, 0.5]);
    }

    #[test]
    fn shared_cdf_admits_no_rejection() {
        let fam = CdfFamily::new(vec![vec![0.1, 0.3, 0.6, 1.0]]).unwrap();
        let ranks = RankMap::contiguous(&[3]).unwrap();
        let grid = fam.support();
        let res = critical(&fam, &grid, &[0.1, 0.3, 0.6], 0.05, Some(&ranks), &KernelConfig::bonferroni())
            .unwrap();
        assert_eq!(res.critical_values, vec![0.0, 0.0, 0.0]);
        assert_close(&res.transformed, &[0.3, 0.6, 0.6]);
    }

    #[test]
    fn single_test_matches_single_step() {
        let fam = CdfFamily::new(vec![vec![0.01, 0.02, 0.1, 1.0]]).unwrap();
        let grid = fam.support();
        for cfg in [KernelConfig::bonferroni(), KernelConfig::independence()] {
            for &p in &grid {
                let sd = critical(&fam, &grid, &[p], 0.05, None, &cfg).unwrap();
                let ss = single_step::critical(&fam, &grid, &[p], 0.05, None, &cfg).unwrap();
                assert_eq!(sd.critical_values, vec![ss.critical_value]);
                assert_close(&sd.transformed, &ss.transformed);
            }
        }
    }

    #[test]
    fn critical_values_are_monotone_and_bounded() {
        let (fam, ranks, observed) = shared_family();
        let grid = fam.support();
        for alpha in [0.01, 0.03, 0.045, 0.2, 0.6] {
            for cfg in [KernelConfig::bonferroni(), KernelConfig::independence()] {
                let res = critical(&fam, &grid, &observed, alpha, Some(&ranks), &cfg).unwrap();
                assert!(res.critical_values.windows(2).all(|w| w[0] <= w[1]));
                assert!(res.critical_values.iter().all(|&c| c <= alpha));
            }
        }
    }

    #[test]
    fn crit_and_fast_transforms_agree() {
        let (fam, ranks, observed) = shared_family();
        let grid = fam.support();
        for cfg in [KernelConfig::bonferroni(), KernelConfig::independence()] {
            let fast = transform(&fam, &observed, Some(&ranks), &cfg).unwrap();
            let crit = critical(&fam, &grid, &observed, 0.05, Some(&ranks), &cfg).unwrap();
            assert_close(&crit.transformed, &fast);
        }
    }

    #[test]
    fn chunk_size_does_not_change_results() {
        let (fam, ranks, observed) = shared_family();
        let grid = fam.support();
        let reference =
            critical(&fam, &grid, &observed, 0.045, Some(&ranks), &KernelConfig::default()).unwrap();
        for budget in [1, 2, 3, 5, 7] {
            let cfg = KernelConfig::default().with_chunk_budget(budget);
            let res = critical(&fam, &grid, &observed, 0.045, Some(&ranks), &cfg).unwrap();
            assert_eq!(res, reference, "budget {budget}");
        }
    }

    #[test]
    fn grid_entirely_admissible() {
        let fam = CdfFamily::new(vec![vec![0.001, 0.002]]).unwrap();
        let grid = fam.support();
        let res = critical(&fam, &grid, &[0.002], 0.05, None, &KernelConfig::default()).unwrap();
        assert_eq!(res.critical_values, vec![0.002]);
        assert_close(&res.transformed, &[0.002]);
    }

    #[test]
    fn independence_is_less_conservative() {
        let (fam, ranks, observed) = shared_family();
        let grid = fam.support();
        let bonf = critical(&fam, &grid, &observed, 0.045, Some(&ranks), &KernelConfig::bonferroni())
            .unwrap();
        let ind = critical(&fam, &grid, &observed, 0.045, Some(&ranks), &KernelConfig::independence())
            .unwrap();
        for (b, i) in bonf.critical_values.iter().zip(&ind.critical_values) {
            assert!(i >= b);
        }
    }

    #[test]
    fn independence_worst_case_bound() {
        let (fam, ranks, observed) = shared_family();
        let grid = fam.support();

        // Rank 0 at 0.02: 0.02 + 0.02 + 0.01 = 0.05 > 0.0496.
        let bonf = critical(&fam, &grid, &observed, 0.0496, Some(&ranks), &KernelConfig::bonferroni())
            .unwrap();
        assert_eq!(bonf.critical_values, vec![0.01, 0.02, 0.02]);

        // Rank 0 at 0.02: 1 - 0.98 * 0.98 * 0.99 = 0.049204 <= 0.0496.
        let ind = critical(&fam, &grid, &observed, 0.0496, Some(&ranks), &KernelConfig::independence())
            .unwrap();
        assert_eq!(ind.critical_values, vec![0.02, 0.02, 0.02]);
        // 1 - 0.99^2, 1 - 0.99 * 0.98, 0.5
        assert_close(&ind.transformed, &[0.0199, 0.0298, 0.5]);
    }

    #[test]
    fn empty_family() {
        let fam = CdfFamily::default();
        assert!(transform(&fam, &[], None, &KernelConfig::default()).unwrap().is_empty());
        let res = critical(&fam, &[], &[], 0.05, None, &KernelConfig::default()).unwrap();
        assert!(res.critical_values.is_empty());
        assert!(res.transformed.is_empty());
    }

    #[test]
    fn observed_missing_from_grid() {
        let fam = two_cdfs();
        let grid = fam.support();
        let err = critical(&fam, &grid, &[0.01, 0.035], 0.05, None, &KernelConfig::default())
            .unwrap_err();
        assert_eq!(err, DfwerError::MalformedSupport { value: 0.035, rank: 1 });

        let err = critical(&fam, &grid, &[0.01, 1.5], 0.05, None, &KernelConfig::default())
            .unwrap_err();
        assert_eq!(err, DfwerError::MalformedSupport { value: 1.5, rank: 1 });
    }

    #[test]
    fn rank_map_must_match() {
        let fam = two_cdfs();
        let grid = fam.support();
        let err = critical(&fam, &grid, &[0.01], 0.05, None, &KernelConfig::default()).unwrap_err();
        assert!(matches!(err, DfwerError::DimensionMismatch(_)));

        let ranks = RankMap::contiguous(&[1, 1, 1]).unwrap();
        let err = transform(&fam, &[0.01, 0.02, 0.04], Some(&ranks), &KernelConfig::default())
            .unwrap_err();
        assert!(matches!(err, DfwerError::DimensionMismatch(_)));
    }

    #[test]
    fn cancellation_aborts() {
        let token = CancellationToken::new();
        token.cancel();
        let cfg = KernelConfig::default().with_cancellation(token);
        let fam = two_cdfs();
        let grid = fam.support();
        assert_eq!(
            critical(&fam, &grid, &[0.01, 0.04], 0.05, None, &cfg),
            Err(DfwerError::Cancelled)
        );
        assert_eq!(
            transform(&fam, &[0.01, 0.04], None, &cfg),
            Err(DfwerError::Cancelled)
        );
    }

    #[test]
    fn cancellation_between_chunks() {
        let (fam, ranks, observed) = shared_family();
        let grid = fam.support();
        let whole = critical(&fam, &grid, &observed, 0.045, Some(&ranks), &KernelConfig::default());
        assert!(whole.is_ok());

        // One grid point per chunk; each chunk polls once, then once per CDF.
        // The 5th poll falls inside the second chunk.
        let cfg = KernelConfig::default()
            .with_chunk_budget(1)
            .with_cancellation(CancelAfter { limit: 5, ..Default::default() });
        let res = critical(&fam, &grid, &observed, 0.045, Some(&ranks), &cfg);
        assert_eq!(res, Err(DfwerError::Cancelled));
    }

    #[test]
    fn cancellation_after_first_cdf_in_transform() {
        let (fam, ranks, observed) = shared_family();
        let cfg = KernelConfig::default().with_cancellation(CancelAfter { limit: 2, ..Default::default() });
        assert_eq!(
            transform(&fam, &observed, Some(&ranks), &cfg),
            Err(DfwerError::Cancelled)
        );
    }

    #[test]
    fn summary_reports_largest() {
        let res = StepDownCritical {
            critical_values: vec![0.01, 0.02],
            transformed: vec![0.1, 0.2],
        };
        assert_eq!(
            res.summary(),
            "step-down: 2 critical values (largest=0.02), 2 transformed p-values"
        );
    }
}
