use std::{
    fmt::Display,
    iter::Sum,
    ops::Add,
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const MINOR_UNITS_PER_MAJOR: i64 = 100;

//--------------------------------------        Money          ---------------------------------------------------------
/// A currency amount with two decimal places, stored as a whole number of minor units (cents / fen).
///
/// Orders are matched against observed transfers by exact equality of their `Money` values, so amounts are never
/// represented as floats anywhere in the system.
///
/// The string form is always rendered with exactly two decimals (`"10.00"`), which is also what is used for
/// (de)serialization and signing.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(try_from = "String", into = "String")]
pub struct Money(i64);

op!(Money: Add::add, Sub::sub);
op!(Money: assign AddAssign::add_assign, SubAssign::sub_assign);
op!(Money: neg);

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Value cannot be represented as a 2-decimal amount: {0}")]
pub struct MoneyConversionError(String);

impl Money {
    pub fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    pub fn from_major(major: i64) -> Self {
        Self(major * MINOR_UNITS_PER_MAJOR)
    }

    /// The amount in minor units
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Returns this amount plus `minor` minor units, or `None` on overflow.
    pub fn checked_offset(&self, minor: i64) -> Option<Self> {
        self.0.checked_add(minor).map(Self)
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let major = abs / MINOR_UNITS_PER_MAJOR as u64;
        let minor = abs % MINOR_UNITS_PER_MAJOR as u64;
        write!(f, "{sign}{major}.{minor:02}")
    }
}

impl FromStr for Money {
    type Err = MoneyConversionError;

    /// Parses `"10"`, `"10.5"` and `"10.50"` style strings. More than two decimal places, signs, exponents and
    /// empty strings are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || MoneyConversionError(s.to_string());
        let (major, minor) = match s.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (s, ""),
        };
        if major.is_empty() || !major.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err());
        }
        if minor.len() > 2 || !minor.bytes().all(|b| b.is_ascii_digit()) || (s.ends_with('.')) {
            return Err(err());
        }
        let major = major.parse::<i64>().map_err(|_| err())?;
        let minor = match minor.len() {
            0 => 0,
            1 => minor.parse::<i64>().map_err(|_| err())? * 10,
            _ => minor.parse::<i64>().map_err(|_| err())?,
        };
        major.checked_mul(MINOR_UNITS_PER_MAJOR).and_then(|m| m.checked_add(minor)).map(Self).ok_or_else(err)
    }
}

impl TryFrom<String> for Money {
    type Error = MoneyConversionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Money> for String {
    fn from(value: Money) -> Self {
        value.to_string()
    }
}
