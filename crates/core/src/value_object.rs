//! Value objects: equality by value, not identity.
//!
//! Value objects have **no identity**; they are defined entirely by their
//! attribute values and are immutable. `Money` and `TaxRate` are the two the
//! order ledger is built from.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Marker trait for value objects.
///
/// Requires `Clone + PartialEq + Debug`: value objects are cheap to copy and
/// compared by their attribute values.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// Monetary amount in the smallest currency unit (e.g. cents).
///
/// Signed on purpose: balances go negative on overpayment and deltas are
/// written to the audit stream as-is.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl ValueObject for Money {}

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(units: i64) -> Self {
        Self(units)
    }

    pub const fn minor_units(self) -> i64 {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Line total for `quantity` units at this unit price.
    pub fn times(self, quantity: i64) -> DomainResult<Money> {
        self.0
            .checked_mul(quantity)
            .map(Money)
            .ok_or_else(|| DomainError::validation("line total overflows"))
    }

    pub fn checked_add(self, rhs: Money) -> DomainResult<Money> {
        self.0
            .checked_add(rhs.0)
            .map(Money)
            .ok_or_else(|| DomainError::validation("amount overflows"))
    }

    pub fn checked_sub(self, rhs: Money) -> DomainResult<Money> {
        self.0
            .checked_sub(rhs.0)
            .map(Money)
            .ok_or_else(|| DomainError::validation("amount overflows"))
    }

    /// Sum of `amounts`; fails instead of wrapping.
    pub fn try_sum(amounts: impl IntoIterator<Item = Money>) -> DomainResult<Money> {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |acc, m| acc.checked_add(m))
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Tax rate in basis points (1900 = 19%).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxRate(u32);

impl ValueObject for TaxRate {}

impl TaxRate {
    pub const ZERO: TaxRate = TaxRate(0);

    /// Rates above 100% are rejected.
    pub fn from_basis_points(bp: u32) -> DomainResult<Self> {
        if bp > 10_000 {
            return Err(DomainError::validation("tax rate cannot exceed 100%"));
        }
        Ok(Self(bp))
    }

    pub fn basis_points(self) -> u32 {
        self.0
    }

    /// Tax owed on `base`, rounded half away from zero to the minor unit.
    pub fn apply(self, base: Money) -> Money {
        let raw = base.minor_units() as i128 * self.0 as i128;
        let half = if raw >= 0 { 5_000 } else { -5_000 };
        Money::from_minor(((raw + half) / 10_000) as i64)
    }
}

impl core::fmt::Display for TaxRate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}
