//! Fixed-point monetary types.
//!
//! All currency arithmetic runs on `rust_decimal::Decimal` and is rounded to
//! 2 fractional digits, half-up. Rates are percentages kept at 4 fractional
//! digits. Nothing in the engine touches binary floating point.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Sub, SubAssign};
use std::str::FromStr;

const MONEY_SCALE: u32 = 2;
const RATE_SCALE: u32 = 4;

fn round_money(d: Decimal) -> Decimal {
    d.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// A currency amount with 2-digit scale and half-up rounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(d: Decimal) -> Self {
        Money(round_money(d))
    }

    /// Whole currency units ("major" units: dollars, shillings).
    pub fn from_major(amount: i64) -> Self {
        Money(Decimal::from(amount))
    }

    /// Minor units (cents).
    pub fn from_minor(amount: i64) -> Self {
        Money(Decimal::new(amount, MONEY_SCALE))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    pub fn min(self, other: Self) -> Self {
        Money(self.0.min(other.0))
    }

    pub fn max(self, other: Self) -> Self {
        Money(self.0.max(other.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // always emit both fraction digits: "5000.00"
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Money::new(Decimal::from_str(s)?))
    }
}

impl From<Decimal> for Money {
    fn from(d: Decimal) -> Self {
        Money::new(d)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, other: Money) -> Money {
        Money::new(self.0 + other.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, other: Money) {
        self.0 = round_money(self.0 + other.0);
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, other: Money) -> Money {
        Money::new(self.0 - other.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, other: Money) {
        self.0 = round_money(self.0 - other.0);
    }
}

impl Mul<Decimal> for Money {
    type Output = Money;

    fn mul(self, factor: Decimal) -> Money {
        Money::new(self.0 * factor)
    }
}

impl Div<Decimal> for Money {
    type Output = Money;

    fn div(self, divisor: Decimal) -> Money {
        Money::new(self.0 / divisor)
    }
}

impl ToSql for Money {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for Money {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: rust_decimal::Error| FromSqlError::Other(Box::new(e)))
    }
}

/// An interest rate expressed as a percentage (12.5 means 12.5 %),
/// kept at 4-digit scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Rate(Decimal);

impl Rate {
    pub const ZERO: Rate = Rate(Decimal::ZERO);

    pub fn from_percent(d: Decimal) -> Self {
        Rate(d.round_dp_with_strategy(
            RATE_SCALE,
            RoundingStrategy::MidpointAwayFromZero,
        ))
    }

    pub fn as_percent(&self) -> Decimal {
        self.0
    }

    /// 12.5 % -> 0.125
    pub fn as_fraction(&self) -> Decimal {
        self.0 / Decimal::from(100)
    }

    /// Annual percentage rate to monthly fractional rate: 12 % -> 0.01.
    pub fn monthly_fraction(&self) -> Decimal {
        self.as_fraction() / Decimal::from(12)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl FromStr for Rate {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Rate::from_percent(Decimal::from_str(s)?))
    }
}

impl ToSql for Rate {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.to_string()))
    }
}

impl FromSql for Rate {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: rust_decimal::Error| FromSqlError::Other(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn money_rounds_half_up_at_two_places() {
        assert_eq!(Money::new(dec!(1.005)).to_string(), "1.01");
        assert_eq!(Money::new(dec!(1.004)).to_string(), "1.00");
        assert_eq!(Money::new(dec!(-1.005)).to_string(), "-1.01");
    }

    #[test]
    fn money_arithmetic_stays_on_scale() {
        let third = Money::from_major(100) / dec!(3);
        assert_eq!(third.to_string(), "33.33");
        assert_eq!((third * dec!(3)).to_string(), "99.99");
    }

    #[test]
    fn money_text_round_trip() {
        let m: Money = "2500.50".parse().unwrap();
        assert_eq!(m, Money::from_minor(250_050));
        assert_eq!(m.to_string(), "2500.50");
    }

    #[test]
    fn rate_fractions() {
        let r = Rate::from_percent(dec!(12));
        assert_eq!(r.as_fraction(), dec!(0.12));
        assert_eq!(r.monthly_fraction(), dec!(0.01));
    }
}
