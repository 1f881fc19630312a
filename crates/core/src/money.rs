//! Currency-agnostic money amounts.
//!
//! Amounts are exact decimals. Rounding and "close enough to zero" checks go
//! through [`CurrencyPrecision`] so every call site agrees on the same
//! precision instead of hardcoding `0.01`.

use core::iter::Sum;
use core::ops::{Add, Sub};
use core::str::FromStr;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::value_object::ValueObject;

/// A monetary amount (currency is carried by the owning record).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl ValueObject for Money {}

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Amount from minor units at two decimal places (e.g. cents).
    pub fn from_minor(minor: i64) -> Self {
        Self(Decimal::new(minor, 2))
    }

    /// Parse a textual amount (`"1000"`, `"50.25"`, `"1e3"`).
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        Decimal::from_str(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .ok()
            .map(Self)
    }

    /// Convert a float; `None` for NaN/infinite values.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        Decimal::from_f64(value).map(|d| Self(d.normalize()))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// `max(0, self)`.
    pub fn clamp_non_negative(self) -> Self {
        if self.is_negative() { Self::ZERO } else { self }
    }

    pub fn checked_mul(self, factor: Decimal) -> Option<Self> {
        self.0.checked_mul(factor).map(Self)
    }

    /// `None` when the sum leaves the representable range.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    pub fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// Sum of `amounts`, or `None` on overflow.
    pub fn checked_sum(amounts: impl IntoIterator<Item = Money>) -> Option<Self> {
        amounts
            .into_iter()
            .try_fold(Self::ZERO, |acc, m| acc.checked_add(m))
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

// Operators saturate at the `Decimal` range instead of panicking; callers
// that must notice overflow use the `checked_*` methods.
impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        self.saturating_add(rhs)
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        self.saturating_sub(rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + *m)
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

/// Precision rules for a currency: rounding scale and settlement tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyPrecision {
    pub decimal_places: u32,
    /// An outstanding balance at or below this amount counts as settled.
    pub tolerance: Money,
}

impl CurrencyPrecision {
    /// Precision with the tolerance equal to one minor unit.
    pub fn with_decimal_places(decimal_places: u32) -> Self {
        Self {
            decimal_places,
            tolerance: Money(Decimal::new(1, decimal_places)),
        }
    }

    /// Round half away from zero to the currency scale.
    pub fn round(&self, amount: Money) -> Money {
        Money(
            amount
                .0
                .round_dp_with_strategy(self.decimal_places, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    pub fn is_settled(&self, outstanding: Money) -> bool {
        outstanding <= self.tolerance
    }
}

impl Default for CurrencyPrecision {
    fn default() -> Self {
        Self::with_decimal_places(2)
    }
}
