//! Fixed-point money helpers.
//!
//! Amounts are persisted as integer cents so balance checks and updates run as exact integer
//! arithmetic inside the database. The API surface uses `Decimal` with two fractional digits.

use crate::errors::{Error, Result};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Minimum amount for deposits and withdrawals.
pub const MINIMUM_TRANSFER: Decimal = Decimal::ONE;

/// Converts cents to a two-decimal amount.
#[must_use]
pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Converts an amount to cents, rejecting more than two fractional digits.
pub fn to_cents(amount: Decimal) -> Result<i64> {
    let normalized = amount.normalize();
    if normalized.scale() > 2 {
        return Err(Error::InvalidAmount { amount });
    }
    (normalized * Decimal::ONE_HUNDRED)
        .to_i64()
        .ok_or(Error::InvalidAmount { amount })
}

/// Converts a strictly positive amount to cents.
pub fn to_positive_cents(amount: Decimal) -> Result<i64> {
    let cents = to_cents(amount)?;
    if cents <= 0 {
        return Err(Error::InvalidAmount { amount });
    }
    Ok(cents)
}

/// Parses user input such as `10`, `10.5` or `10,50`.
pub fn parse_amount(input: &str) -> Result<Decimal> {
    let cleaned = input.trim().replace(',', ".");
    let amount = cleaned
        .trim_start_matches('$')
        .parse::<Decimal>()
        .map_err(|_| Error::InvalidAmount {
            amount: Decimal::ZERO,
        })?;
    to_positive_cents(amount)?;
    Ok(amount)
}
