//! Rules for combining per-distribution CDF values across a test family.
//!
//! Both rules are accumulated term by term into an `f64` so the kernels can
//! keep one running accumulator per query point:
//!
//! - **Bonferroni**: the accumulator is the plain weighted sum `Σ w·F`.
//! - **Independence**: the accumulator is `ln Π (1 - F)^w = Σ w·ln(1 - F)`,
//!   turned back into `1 - Π (1 - F)^w` by [`Combination::finish`].

use dfwer_core::LogProb;

/// Combination rule applied to the per-CDF evaluations at one point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Combination {
    /// Discrete Bonferroni: weighted sum of CDF values.
    #[default]
    Bonferroni,
    /// Discrete Šidák-type rule for independent p-values:
    /// `1 - Π (1 - F_i)^{w_i}`.
    Independence,
}

impl Combination {
    /// Map the `independence` flag used by callers to a rule.
    pub fn from_independence(independence: bool) -> Self {
        if independence {
            Self::Independence
        } else {
            Self::Bonferroni
        }
    }

    /// Accumulator value with no contributions.
    #[inline]
    pub fn empty(self) -> f64 {
        match self {
            Self::Bonferroni => 0.0,
            Self::Independence => LogProb::certain().0,
        }
    }

    /// Accumulator term contributed by a CDF value `f` with weight `w`.
    ///
    /// Zero weights and zero values contribute exactly nothing under both
    /// rules.
    #[inline]
    pub fn term(self, w: f64, f: f64) -> f64 {
        if w == 0.0 || f == 0.0 {
            return 0.0;
        }
        match self {
            Self::Bonferroni => w * f,
            Self::Independence => LogProb::complement(f).powf(w).0,
        }
    }

    /// Convert an accumulator into a value on the probability scale.
    #[inline]
    pub fn finish(self, acc: f64) -> f64 {
        match self {
            Self::Bonferroni => acc,
            Self::Independence => LogProb(acc).to_complement_prob(),
        }
    }

    /// Combine `(weight, value)` pairs in one go.
    pub fn combine<I>(self, terms: I) -> f64
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let acc = terms
            .into_iter()
            .fold(self.empty(), |acc, (w, f)| acc + self.term(w, f));
        self.finish(acc)
    }
}
