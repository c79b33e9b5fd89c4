//! Evaluation of discrete CDFs stored as step functions.
//!
//! A discrete CDF is the ascending vector of attainable p-values of one null
//! distribution. As a right-continuous step function it takes, at `x`, the
//! largest tabulated value `<= x`, or 0 below the first entry.
//!
//! Two access paths are provided:
//!
//! - [`eval`] threads a [`Cursor`] through a sweep of non-decreasing queries,
//!   giving amortized O(1) per query.
//! - [`eval_at`] / [`floor_index`] binary-search for random access.

/// Scan position inside one CDF.
///
/// The cursor counts how many entries are `<=` the last query. It only ever
/// moves forward, so it must not be reused once queries start decreasing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cursor(usize);

impl Cursor {
    /// Cursor positioned before the first entry.
    pub const fn start() -> Self {
        Self(0)
    }

    /// Number of entries passed so far.
    pub fn position(self) -> usize {
        self.0
    }
}

/// Evaluate `cdf` at `query`, continuing the scan from `cursor`.
///
/// Returns the CDF value and the advanced cursor. Entries above 1 are never
/// passed.
///
/// # Example
///
/// ```
/// use dfwer_kernel::stepfun::{eval, Cursor};
///
/// let cdf = [0.1, 0.3, 0.6, 1.0];
/// let (v, cur) = eval(&cdf, 0.05, Cursor::start());
/// assert_eq!(v, 0.0);
/// let (v, cur) = eval(&cdf, 0.45, cur);
/// assert_eq!(v, 0.3);
/// let (v, _) = eval(&cdf, 1.0, cur);
/// assert_eq!(v, 1.0);
/// ```
#[inline]
pub fn eval(cdf: &[f64], query: f64, cursor: Cursor) -> (f64, Cursor) {
    let mut pos = cursor.0;
    while pos < cdf.len() && cdf[pos] <= 1.0 && cdf[pos] <= query {
        pos += 1;
    }
    let value = if pos > 0 { cdf[pos - 1] } else { 0.0 };
    (value, Cursor(pos))
}

/// Index of the greatest element of `sorted` that is `<= value`, or `None`
/// if every element is larger (or `sorted` is empty).
pub fn floor_index(sorted: &[f64], value: f64) -> Option<usize> {
    sorted.partition_point(|&x| x <= value).checked_sub(1)
}

/// Random-access evaluation of `cdf` at `query` in O(log n).
pub fn eval_at(cdf: &[f64], query: f64) -> f64 {
    match floor_index(cdf, query.min(1.0)) {
        Some(i) => cdf[i],
        None => 0.0,
    }
}

/// Evaluate `cdf` at every point of the non-decreasing `queries` in one
/// sweep, writing into `out`.
///
/// Returns the final cursor so a caller sweeping a longer sequence in pieces
/// can continue where this call stopped.
pub fn sweep(cdf: &[f64], queries: &[f64], out: &mut [f64], mut cursor: Cursor) -> Cursor {
    debug_assert_eq!(queries.len(), out.len());
    for (slot, &q) in out.iter_mut().zip(queries) {
        let (value, next) = eval(cdf, q, cursor);
        *slot = value;
        cursor = next;
    }
    cursor
}

#[cfg(test)]
mod tests {
    use super::*;

    const CDF: [f64; 4] = [0.1, 0.3, 0.6, 1.0];

    #[test]
    fn eval_below_first_entry() {
        let (v, cur) = eval(&CDF, 0.05, Cursor::start());
        assert_eq!(v, 0.0);
        assert_eq!(cur.position(), 0);
    }

    #[test]
    fn eval_exact_hits() {
        let mut cur = Cursor::start();
        for &q in &CDF {
            let (v, next) = eval(&CDF, q, cur);
            assert_eq!(v, q);
            cur = next;
        }
        assert_eq!(cur.position(), 4);
    }

    #[test]
    fn eval_between_entries() {
        let (v, cur) = eval(&CDF, 0.59, Cursor::start());
        assert_eq!(v, 0.3);
        assert_eq!(cur.position(), 2);
    }

    #[test]
    fn eval_empty_cdf() {
        let (v, cur) = eval(&[], 0.5, Cursor::start());
        assert_eq!(v, 0.0);
        assert_eq!(cur, Cursor::start());
    }

    #[test]
    fn eval_never_passes_values_above_one() {
        let cdf = [0.2, 1.5];
        let (v, cur) = eval(&cdf, 2.0, Cursor::start());
        assert_eq!(v, 0.2);
        assert_eq!(cur.position(), 1);
    }

    #[test]
    fn floor_index_cases() {
        assert_eq!(floor_index(&CDF, 0.05), None);
        assert_eq!(floor_index(&CDF, 0.1), Some(0));
        assert_eq!(floor_index(&CDF, 0.5), Some(1));
        assert_eq!(floor_index(&CDF, 7.0), Some(3));
        assert_eq!(floor_index(&[], 0.5), None);
    }

    #[test]
    fn eval_at_matches_sweep() {
        let queries = [0.0, 0.1, 0.2, 0.3, 0.45, 0.6, 0.99, 1.0];
        let mut out = vec![0.0; queries.len()];
        sweep(&CDF, &queries, &mut out, Cursor::start());
        for (&q, &v) in queries.iter().zip(&out) {
            assert_eq!(eval_at(&CDF, q), v, "query {q}");
        }
    }

    #[test]
    fn sweep_resumes_from_cursor() {
        let first = [0.1, 0.2];
        let second = [0.3, 0.7];
        let mut out = [0.0; 2];
        let cur = sweep(&CDF, &first, &mut out, Cursor::start());
        assert_eq!(out, [0.1, 0.1]);
        sweep(&CDF, &second, &mut out, cur);
        assert_eq!(out, [0.3, 0.6]);
    }
}
