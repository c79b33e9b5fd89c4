//! The CDF family and the bookkeeping that ties tests to distributions.
//!
//! - [`CdfFamily`] — an arena of discrete CDFs, one per *unique* null
//!   distribution, referenced by stable index.
//! - [`RankMap`] — for every CDF, the ascending 0-based ranks (positions in
//!   the sorted observed p-values) of the tests that use it.
//! - [`PreparedFamily`] — builds all of the above from one CDF per test.

use std::borrow::Cow;
use std::collections::HashMap;

use dfwer_core::{DfwerError, Result};

use crate::order::order;

/// Tolerance when comparing a floating-point count total to the test count.
const COUNT_TOL: f64 = 1e-9;

/// An owned collection of discrete CDFs.
///
/// Each CDF is the ascending vector of attainable p-values of one null
/// distribution, all in `(0, 1]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CdfFamily {
    cdfs: Vec<Vec<f64>>,
}

impl CdfFamily {
    /// Build a family, checking that every CDF is ascending within `(0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`DfwerError::InvalidInput`] naming the first offending CDF.
    pub fn new(cdfs: Vec<Vec<f64>>) -> Result<Self> {
        for (i, cdf) in cdfs.iter().enumerate() {
            if let Some(j) = cdf.iter().position(|&v| !(v > 0.0 && v <= 1.0)) {
                return Err(DfwerError::InvalidInput(format!(
                    "CDF {i}: value {} at position {j} is outside (0, 1]",
                    cdf[j]
                )));
            }
            if let Some(j) = cdf.windows(2).position(|w| w[0] > w[1]) {
                return Err(DfwerError::InvalidInput(format!(
                    "CDF {i}: values are not ascending at position {}",
                    j + 1
                )));
            }
        }
        Ok(Self { cdfs })
    }

    /// Number of CDFs.
    pub fn len(&self) -> usize {
        self.cdfs.len()
    }

    /// Whether the family holds no CDF.
    pub fn is_empty(&self) -> bool {
        self.cdfs.is_empty()
    }

    /// The `i`-th CDF.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.len()`.
    pub fn get(&self, i: usize) -> &[f64] {
        &self.cdfs[i]
    }

    /// Iterate over the CDFs in index order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &[f64]> {
        self.cdfs.iter().map(Vec::as_slice)
    }

    /// The support grid: the sorted, deduplicated union of every CDF's values.
    pub fn support(&self) -> Vec<f64> {
        let mut grid: Vec<f64> = self.cdfs.iter().flatten().copied().collect();
        grid.sort_by(f64::total_cmp);
        grid.dedup();
        grid
    }
}

/// Assignment of sorted test ranks to CDFs, for step-down kernels.
///
/// Every rank in `0..n_tests` appears in exactly one list and each list is
/// strictly ascending and non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankMap {
    ranks: Vec<Vec<usize>>,
    n_tests: usize,
}

impl RankMap {
    /// Validate and wrap per-CDF rank lists.
    ///
    /// # Errors
    ///
    /// - [`DfwerError::DimensionMismatch`] if the list lengths do not sum to
    ///   `n_tests`.
    /// - [`DfwerError::InvalidInput`] for an empty list, a list that is not
    ///   strictly ascending, a rank out of range or a rank used twice.
    pub fn new(ranks: Vec<Vec<usize>>, n_tests: usize) -> Result<Self> {
        let total: usize = ranks.iter().map(Vec::len).sum();
        if total != n_tests {
            return Err(DfwerError::DimensionMismatch(format!(
                "rank lists cover {total} tests, expected {n_tests}"
            )));
        }

        let mut seen = vec![false; n_tests];
        for (i, list) in ranks.iter().enumerate() {
            if list.is_empty() {
                return Err(DfwerError::InvalidInput(format!(
                    "rank list {i} is empty"
                )));
            }
            if list.windows(2).any(|w| w[0] >= w[1]) {
                return Err(DfwerError::InvalidInput(format!(
                    "rank list {i} is not strictly ascending"
                )));
            }
            for &r in list {
                if r >= n_tests {
                    return Err(DfwerError::InvalidInput(format!(
                        "rank list {i}: rank {r} out of range for {n_tests} tests"
                    )));
                }
                if std::mem::replace(&mut seen[r], true) {
                    return Err(DfwerError::InvalidInput(format!(
                        "rank {r} is assigned to more than one CDF"
                    )));
                }
            }
        }

        Ok(Self { ranks, n_tests })
    }

    /// One CDF per test: CDF `i` belongs to rank `i`.
    pub fn identity(n: usize) -> Self {
        Self {
            ranks: (0..n).map(|i| vec![i]).collect(),
            n_tests: n,
        }
    }

    /// Contiguous, order-preserving assignment: the first `counts[0]` ranks
    /// belong to CDF 0, the next `counts[1]` to CDF 1, and so on.
    ///
    /// # Errors
    ///
    /// Returns [`DfwerError::InvalidInput`] if any count is zero.
    pub fn contiguous(counts: &[usize]) -> Result<Self> {
        let mut start = 0;
        let mut ranks = Vec::with_capacity(counts.len());
        for &c in counts {
            ranks.push((start..start + c).collect());
            start += c;
        }
        Self::new(ranks, start)
    }

    /// Number of CDFs covered.
    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    /// Whether the map covers no CDF.
    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    /// Total number of tests.
    pub fn n_tests(&self) -> usize {
        self.n_tests
    }

    /// Ranks of CDF `i`, ascending.
    pub fn ranks(&self, i: usize) -> &[usize] {
        &self.ranks[i]
    }

    /// Number of tests using CDF `i`.
    pub fn count(&self, i: usize) -> usize {
        self.ranks[i].len()
    }

    /// Multiplicities of all CDFs, as used by the single-step kernels.
    pub fn counts(&self) -> Vec<f64> {
        self.ranks.iter().map(|l| l.len() as f64).collect()
    }

    /// Largest rank assigned to CDF `i`.
    pub fn last_rank(&self, i: usize) -> usize {
        // Lists are non-empty by construction.
        self.ranks[i][self.ranks[i].len() - 1]
    }

    /// Number of tests of CDF `i` whose rank is `>= rank`: the slots that CDF
    /// still holds once every smaller rank has been rejected.
    pub fn remaining(&self, i: usize, rank: usize) -> usize {
        let list = &self.ranks[i];
        list.len() - list.partition_point(|&r| r < rank)
    }
}

/// Resolve optional single-step multiplicities to one weight per CDF.
pub(crate) fn resolve_counts<'a>(
    family: &CdfFamily,
    counts: Option<&'a [f64]>,
) -> Result<Cow<'a, [f64]>> {
    match counts {
        None => Ok(Cow::Owned(vec![1.0; family.len()])),
        Some(c) => {
            if c.len() != family.len() {
                return Err(DfwerError::DimensionMismatch(format!(
                    "{} multiplicities for {} CDFs",
                    c.len(),
                    family.len()
                )));
            }
            if let Some(i) = c.iter().position(|&m| !(m.is_finite() && m >= 0.0)) {
                return Err(DfwerError::InvalidInput(format!(
                    "multiplicity {i} is not a non-negative number: {}",
                    c[i]
                )));
            }
            Ok(Cow::Borrowed(c))
        }
    }
}

/// Check that multiplicities account for exactly `n_tests` tests.
pub(crate) fn check_count_total(counts: &[f64], n_tests: usize) -> Result<()> {
    let total: f64 = counts.iter().sum();
    if (total - n_tests as f64).abs() > COUNT_TOL {
        return Err(DfwerError::DimensionMismatch(format!(
            "multiplicities sum to {total}, expected {n_tests} tests"
        )));
    }
    Ok(())
}

/// Resolve an optional rank map against the family and the test count.
pub(crate) fn resolve_ranks<'a>(
    family: &CdfFamily,
    ranks: Option<&'a RankMap>,
    n_tests: usize,
) -> Result<Cow<'a, RankMap>> {
    match ranks {
        None => {
            if family.len() != n_tests {
                return Err(DfwerError::DimensionMismatch(format!(
                    "without a rank map each of the {n_tests} tests needs its own CDF, got {}",
                    family.len()
                )));
            }
            Ok(Cow::Owned(RankMap::identity(n_tests)))
        }
        Some(map) => {
            if map.len() != family.len() {
                return Err(DfwerError::DimensionMismatch(format!(
                    "rank map has {} lists for {} CDFs",
                    map.len(),
                    family.len()
                )));
            }
            if map.n_tests() != n_tests {
                return Err(DfwerError::DimensionMismatch(format!(
                    "rank map covers {} tests, got {n_tests} observed p-values",
                    map.n_tests()
                )));
            }
            Ok(Cow::Borrowed(map))
        }
    }
}

/// Everything the kernels need, derived from one CDF per test.
#[derive(Debug, Clone)]
pub struct PreparedFamily {
    /// Unique CDFs, in order of first appearance along the sorted p-values.
    pub family: CdfFamily,
    /// Number of tests per unique CDF.
    pub counts: Vec<f64>,
    /// Ranks of the tests per unique CDF.
    pub ranks: RankMap,
    /// Observed p-values, ascending.
    pub sorted_pvalues: Vec<f64>,
    /// Support grid of the family.
    pub support: Vec<f64>,
    /// `permutation[r]` is the input index of the test at rank `r`.
    pub permutation: Vec<usize>,
}

impl PreparedFamily {
    /// Sort the raw p-values, collapse identical CDFs and build the rank map
    /// and support grid.
    ///
    /// # Errors
    ///
    /// - [`DfwerError::DimensionMismatch`] if `per_test` and `raw_pvalues`
    ///   differ in length.
    /// - [`DfwerError::InvalidInput`] for a malformed CDF or a p-value
    ///   outside `[0, 1]`.
    pub fn from_tests(per_test: &[Vec<f64>], raw_pvalues: &[f64]) -> Result<Self> {
        if per_test.len() != raw_pvalues.len() {
            return Err(DfwerError::DimensionMismatch(format!(
                "{} CDFs for {} p-values",
                per_test.len(),
                raw_pvalues.len()
            )));
        }
        if let Some(i) = raw_pvalues.iter().position(|p| !(0.0..=1.0).contains(p)) {
            return Err(DfwerError::InvalidInput(format!(
                "p-value {i} is outside [0, 1]: {}",
                raw_pvalues[i]
            )));
        }

        let permutation = order(raw_pvalues, false);
        let sorted_pvalues: Vec<f64> = permutation.iter().map(|&i| raw_pvalues[i]).collect();

        let mut index: HashMap<Vec<u64>, usize> = HashMap::new();
        let mut unique: Vec<Vec<f64>> = Vec::new();
        let mut ranks: Vec<Vec<usize>> = Vec::new();
        for (rank, &test) in permutation.iter().enumerate() {
            let cdf = &per_test[test];
            let key: Vec<u64> = cdf.iter().map(|v| v.to_bits()).collect();
            let id = *index.entry(key).or_insert_with(|| {
                unique.push(cdf.clone());
                ranks.push(Vec::new());
                unique.len() - 1
            });
            ranks[id].push(rank);
        }

        let family = CdfFamily::new(unique)?;
        let ranks = RankMap::new(ranks, raw_pvalues.len())?;
        let counts = ranks.counts();
        let support = family.support();

        Ok(Self {
            family,
            counts,
            ranks,
            sorted_pvalues,
            support,
            permutation,
        })
    }

    /// Number of tests.
    pub fn n_tests(&self) -> usize {
        self.sorted_pvalues.len()
    }

    /// Map values indexed by sorted rank back to the input order.
    ///
    /// # Panics
    ///
    /// Panics if `by_rank.len()` differs from the number of tests.
    pub fn restore_order(&self, by_rank: &[f64]) -> Vec<f64> {
        assert_eq!(by_rank.len(), self.permutation.len(), "one value per test");
        let mut out = vec![0.0; by_rank.len()];
        for (rank, &test) in self.permutation.iter().enumerate() {
            out[test] = by_rank[rank];
        }
        out
    }
}
