//! Credits with precise decimal arithmetic
//!
//! Credits are the billing currency of the cloud. They are backed by
//! rust_decimal so that millions of small increments never drift the way
//! floating point sums do. Quantisation to the configured precision uses
//! banker's rounding (round half to even).

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};
use thiserror::Error;

/// Largest scale rust_decimal can represent
const MAX_DECIMAL_PLACES: u32 = 28;

/// Errors that can occur during credit arithmetic
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CreditsError {
    #[error("Credit rate must be positive, got {0}")]
    NonPositiveRate(Decimal),

    #[error("Precision of {0} decimal places exceeds the supported maximum of 28")]
    InvalidPrecision(u32),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Overflow during credit calculation")]
    Overflow,
}

/// Number of decimal places credits are rounded to after every billing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct CreditPrecision(u32);

impl CreditPrecision {
    /// Creates a precision, rejecting scales rust_decimal cannot hold
    pub fn new(decimal_places: u32) -> Result<Self, CreditsError> {
        if decimal_places > MAX_DECIMAL_PLACES {
            return Err(CreditsError::InvalidPrecision(decimal_places));
        }
        Ok(Self(decimal_places))
    }

    /// Returns the number of decimal places
    pub fn decimal_places(&self) -> u32 {
        self.0
    }
}

impl Default for CreditPrecision {
    fn default() -> Self {
        Self(2)
    }
}

impl TryFrom<u32> for CreditPrecision {
    type Error = CreditsError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CreditPrecision> for u32 {
    fn from(precision: CreditPrecision) -> u32 {
        precision.0
    }
}

/// An amount of credits
///
/// Credits keep whatever scale they were created with; call
/// [`Credits::quantize`] to round to a [`CreditPrecision`]. Arithmetic
/// through the operator traits panics on overflow exactly like `Decimal`,
/// so code on the billing path uses the `checked_*` variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credits(Decimal);

impl Credits {
    /// Creates a credit amount
    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Zero credits
    pub fn zero() -> Self {
        Self(dec!(0))
    }

    /// Returns the underlying decimal amount
    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Returns true if the amount is zero
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Rounds to the given precision using banker's rounding
    pub fn quantize(&self, precision: CreditPrecision) -> Self {
        Self(self.0.round_dp_with_strategy(
            precision.decimal_places(),
            RoundingStrategy::MidpointNearestEven,
        ))
    }

    /// Checked addition
    pub fn checked_add(&self, other: Credits) -> Result<Credits, CreditsError> {
        self.0
            .checked_add(other.0)
            .map(Credits)
            .ok_or(CreditsError::Overflow)
    }

    /// Checked subtraction
    pub fn checked_sub(&self, other: Credits) -> Result<Credits, CreditsError> {
        self.0
            .checked_sub(other.0)
            .map(Credits)
            .ok_or(CreditsError::Overflow)
    }

    /// Multiplies by a scalar, e.g. a fraction of granted credits
    pub fn checked_mul(&self, factor: Decimal) -> Result<Credits, CreditsError> {
        self.0
            .checked_mul(factor)
            .map(Credits)
            .ok_or(CreditsError::Overflow)
    }
}

impl fmt::Display for Credits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl From<Decimal> for Credits {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl Add for Credits {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl AddAssign for Credits {
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

/// Credits charged per unit of a metric's raw value
///
/// Always strictly positive, which is what guarantees that a billing can
/// never produce a negative delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct CreditRate(Decimal);

impl CreditRate {
    /// Creates a rate, rejecting zero and negative values
    pub fn new(credits_per_unit: Decimal) -> Result<Self, CreditsError> {
        if credits_per_unit <= Decimal::ZERO {
            return Err(CreditsError::NonPositiveRate(credits_per_unit));
        }
        Ok(Self(credits_per_unit))
    }

    /// Returns the rate as a decimal
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Charges `quantity` units at this rate, unrounded
    pub fn apply(&self, quantity: Decimal) -> Result<Credits, CreditsError> {
        quantity
            .checked_mul(self.0)
            .map(Credits)
            .ok_or(CreditsError::Overflow)
    }
}

impl TryFrom<Decimal> for CreditRate {
    type Error = CreditsError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CreditRate> for Decimal {
    fn from(rate: CreditRate) -> Decimal {
        rate.0
    }
}

impl fmt::Display for CreditRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/unit", self.0.normalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_uses_bankers_rounding() {
        let precision = CreditPrecision::default();
        assert_eq!(Credits::new(dec!(2.345)).quantize(precision).amount(), dec!(2.34));
        assert_eq!(Credits::new(dec!(2.355)).quantize(precision).amount(), dec!(2.36));
    }

    #[test]
    fn test_rate_rejects_zero_and_negative() {
        assert!(matches!(CreditRate::new(dec!(0)), Err(CreditsError::NonPositiveRate(_))));
        assert!(matches!(CreditRate::new(dec!(-1)), Err(CreditsError::NonPositiveRate(_))));
        assert!(CreditRate::new(dec!(0.001)).is_ok());
    }

    #[test]
    fn test_rate_application() {
        let rate = CreditRate::new(dec!(0.001)).unwrap();
        assert_eq!(rate.apply(dec!(3600)).unwrap().amount(), dec!(3.6));
    }

    #[test]
    fn test_precision_bounds() {
        assert!(CreditPrecision::new(28).is_ok());
        assert_eq!(CreditPrecision::new(29), Err(CreditsError::InvalidPrecision(29)));
    }

    #[test]
    fn test_checked_add_overflow() {
        let max = Credits::new(Decimal::MAX);
        assert_eq!(max.checked_add(Credits::new(dec!(1))), Err(CreditsError::Overflow));
    }
}
