//! Fixed-point credit amounts.
//!
//! Every amount in the ledger carries four fractional digits and is rounded
//! half-up (ties away from zero). `Credits` only exposes arithmetic that keeps
//! that scale: addition and subtraction are exact, and the two multiplying
//! operations (`percent`, `prorate`) quantize their result immediately, so a
//! percentage computed from another percentage always starts from the
//! quantized intermediate.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Number of fractional digits kept for every amount.
pub const SCALE: u32 = 4;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// A credit amount quantized to four decimal places.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "Decimal", into = "Decimal")]
pub struct Credits(Decimal);

impl Credits {
    /// Zero credits.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Quantize a decimal to four places, rounding half-up.
    #[must_use]
    pub fn new(value: Decimal) -> Self {
        let mut quantized = value.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero);
        quantized.rescale(SCALE);
        Self(quantized)
    }

    /// Whole credits.
    #[must_use]
    pub fn whole(value: i64) -> Self {
        Self::new(Decimal::from(value))
    }

    /// The underlying decimal (always at scale 4 unless zero).
    #[must_use]
    pub const fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// `true` when the amount is exactly zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// `true` when the amount is strictly greater than zero.
    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// `true` when the amount is strictly less than zero.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Absolute value.
    #[must_use]
    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }

    /// `percentage`% of this amount, quantized.
    #[must_use]
    pub fn percent(self, percentage: Decimal) -> Self {
        Self::new(self.0 * percentage / HUNDRED)
    }

    /// This amount scaled by `part / whole`, quantized.
    ///
    /// Returns zero when `whole` is zero.
    #[must_use]
    pub fn prorate(self, part: Self, whole: Self) -> Self {
        if whole.is_zero() {
            return Self::ZERO;
        }
        Self::new(self.0 * part.0 / whole.0)
    }

    /// The amount if positive, otherwise zero.
    #[must_use]
    pub fn positive_part(self) -> Self {
        if self.is_positive() {
            self
        } else {
            Self::ZERO
        }
    }
}

impl From<Decimal> for Credits {
    fn from(value: Decimal) -> Self {
        Self::new(value)
    }
}

impl From<Credits> for Decimal {
    fn from(value: Credits) -> Self {
        value.0
    }
}

impl FromStr for Credits {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim()).map(Self::new)
    }
}

impl fmt::Debug for Credits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credits({:.4})", self.0)
    }
}

impl fmt::Display for Credits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

impl Add for Credits {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Credits {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Neg for Credits {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl AddAssign for Credits {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Credits {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Sum for Credits {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Credits> for Credits {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}
