//! Log-space probabilities for numerically stable products.
//!
//! The independence combination rule multiplies many complements
//! `(1 - F)` that sit close to 1. [`LogProb`] keeps that product as a sum of
//! logarithms and converts back through `expm1`, so neither underflow nor
//! cancellation in `1 - product` loses the small tail mass.

/// A probability stored as its natural logarithm: `ln(p)`.
///
/// All values are ≤ 0, with 0.0 representing certainty (p = 1) and negative
/// infinity representing impossibility (p = 0).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LogProb(pub f64);

impl LogProb {
    /// The log of the complement `ln(1 - p)`, computed with `ln_1p` so that
    /// tiny `p` keep full precision.
    ///
    /// `p` is expected in `[0, 1]`; `p = 1` yields [`LogProb::impossible`].
    pub fn complement(p: f64) -> Self {
        debug_assert!((0.0..=1.0).contains(&p), "complement of {p}");
        if p <= 0.0 {
            Self::certain()
        } else {
            Self((-p).ln_1p())
        }
    }

    /// `1 - exp(self)`, computed with `expm1`.
    pub fn to_complement_prob(self) -> f64 {
        if self.0 == 0.0 {
            return 0.0;
        }
        -self.0.exp_m1()
    }

    /// Raise to a non-negative power in log-space: `p^w`.
    ///
    /// `w = 0` yields certainty even for an impossible event, matching
    /// `0^0 = 1`.
    pub fn powf(self, w: f64) -> Self {
        if w == 0.0 {
            Self::certain()
        } else {
            Self(self.0 * w)
        }
    }

    /// Certain event: `ln(1) = 0`.
    pub const fn certain() -> Self {
        Self(0.0)
    }

    /// Impossible event: `ln(0) = -∞`.
    pub const fn impossible() -> Self {
        Self(f64::NEG_INFINITY)
    }
}
