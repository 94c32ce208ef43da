//! Integer minor-unit amounts as stored, and their decimal display form.

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Amount in cents (minor currency units).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cents(pub i64);

/// Largest magnitude whose conversion to `f64` is exact.
const MAX_EXACT_CENTS: i64 = 1 << 53;

impl Cents {
    pub const ZERO: Cents = Cents(0);

    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn get(self) -> i64 {
        self.0
    }

    /// Decimal units (`1234` cents becomes `12.34`).
    ///
    /// Within ±2^53 the integer converts exactly and the single division is
    /// correctly rounded, so the result is the double closest to the decimal
    /// value and serializes back as the two-place literal. Larger magnitudes
    /// have no exact form and are rejected.
    pub fn to_units(self) -> Result<f64, DomainError> {
        if !(-MAX_EXACT_CENTS..=MAX_EXACT_CENTS).contains(&self.0) {
            return Err(DomainError::invariant(format!(
                "amount of {} cents exceeds the exact decimal range",
                self.0
            )));
        }
        Ok(self.0 as f64 / 100.0)
    }
}

impl From<i64> for Cents {
    fn from(value: i64) -> Self {
        Self(value)
    }
}
