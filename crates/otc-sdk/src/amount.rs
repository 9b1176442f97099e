//! Exact fixed-point amounts and prices.
//!
//! Every value that ends up in a signed payload or a transaction output goes
//! through [`Amount`] or [`Price`]. Both wrap a [`Decimal`] that is always
//! rescaled to [`SCALE`] fractional digits, the ledger's native precision, so
//! their string form is stable: `1` is rendered `1.00000000`.
//!
//! Rounding to the native precision is round-half-up
//! ([`RoundingStrategy::MidpointAwayFromZero`]; all values are non-negative).

use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Number of fractional digits carried by every amount and price.
pub const SCALE: u32 = 8;

const SATS_PER_UNIT: u64 = 100_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount cannot be negative")]
    Negative,

    #[error("more than {SCALE} fractional digits in {0}")]
    Precision(String),

    #[error("arithmetic overflow")]
    Overflow,

    #[error("division by zero")]
    DivisionByZero,

    #[error("cannot parse amount {0:?}")]
    Parse(String),
}

/// Round to [`SCALE`] digits and pin the scale there.
///
/// `rescale` silently keeps a smaller scale when the mantissa has no room
/// for 8 fractional digits; such values are reported as overflow.
fn round8(value: Decimal) -> Result<Decimal, AmountError> {
    let mut rounded = value.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(SCALE);
    if rounded.scale() != SCALE {
        return Err(AmountError::Overflow);
    }
    Ok(rounded)
}

fn parse_exact(s: &str) -> Result<Decimal, AmountError> {
    Decimal::from_str_exact(s.trim()).map_err(|_| AmountError::Parse(s.to_string()))
}

/// A non-negative quantity of some asset, exact to 8 fractional digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(Decimal);

impl Amount {
    pub const ZERO: Self = Self(Decimal::from_parts(0, 0, 0, false, SCALE));
    /// The smallest representable non-zero amount (one satoshi-equivalent).
    pub const MIN_UNIT: Self = Self(Decimal::from_parts(1, 0, 0, false, SCALE));

    /// Wrap a decimal that is already exact at 8 fractional digits.
    ///
    /// Fails with [`AmountError::Precision`] when rounding would be needed.
    pub fn from_decimal(value: Decimal) -> Result<Self, AmountError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(AmountError::Negative);
        }
        let rounded = round8(value)?;
        if rounded != value {
            return Err(AmountError::Precision(value.to_string()));
        }
        Ok(Self(rounded))
    }

    /// Round an arbitrary non-negative decimal to 8 fractional digits.
    pub fn round_from(value: Decimal) -> Result<Self, AmountError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(AmountError::Negative);
        }
        Ok(Self(round8(value)?))
    }

    /// Parse a human-entered literal, rounding to 8 fractional digits.
    pub fn parse_rounded(s: &str) -> Result<Self, AmountError> {
        Self::round_from(parse_exact(s)?)
    }

    /// Convert a binary float entered at an input boundary.
    ///
    /// The float is rendered to its shortest decimal string first, so the
    /// value that gets rounded is the literal the user typed, not the
    /// nearest binary fraction.
    pub fn from_f64(value: f64) -> Result<Self, AmountError> {
        if !value.is_finite() {
            return Err(AmountError::Parse(value.to_string()));
        }
        Self::parse_rounded(&format!("{value}"))
    }

    pub fn from_sat(sats: u64) -> Self {
        let mut d = Decimal::from(sats);
        d.set_scale(SCALE).ok();
        Self(d)
    }

    pub fn to_sat(self) -> Result<u64, AmountError> {
        self.0
            .checked_mul(Decimal::from(SATS_PER_UNIT))
            .and_then(|d| d.to_u64())
            .ok_or(AmountError::Overflow)
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(self, rhs: Self) -> Result<Self, AmountError> {
        let sum = self.0.checked_add(rhs.0).ok_or(AmountError::Overflow)?;
        Ok(Self(round8(sum)?))
    }

    /// Subtract, failing with [`AmountError::Negative`] instead of going below zero.
    pub fn checked_sub(self, rhs: Self) -> Result<Self, AmountError> {
        let diff = self.0.checked_sub(rhs.0).ok_or(AmountError::Overflow)?;
        if diff.is_sign_negative() && !diff.is_zero() {
            return Err(AmountError::Negative);
        }
        Ok(Self(round8(diff)?))
    }

    /// Multiply by an exact rate and round the product to 8 fractional digits.
    pub fn mul_rounded(self, rate: Decimal) -> Result<Self, AmountError> {
        let product = self.0.checked_mul(rate).ok_or(AmountError::Overflow)?;
        Self::round_from(product)
    }
}

impl Default for Amount {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    /// Exact parse: more than 8 fractional digits is an error.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_decimal(parse_exact(s)?)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A rate (units of one asset per unit of another), exact to 8 fractional digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price(Decimal);

impl Price {
    /// Round an arbitrary non-negative rate to 8 fractional digits.
    pub fn round_from(value: Decimal) -> Result<Self, AmountError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(AmountError::Negative);
        }
        Ok(Self(round8(value)?))
    }

    /// `round8(numerator / denominator)`.
    pub fn ratio(numerator: Amount, denominator: Amount) -> Result<Self, AmountError> {
        if denominator.is_zero() {
            return Err(AmountError::DivisionByZero);
        }
        let quotient = numerator
            .0
            .checked_div(denominator.0)
            .ok_or(AmountError::Overflow)?;
        Self::round_from(quotient)
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Price {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = parse_exact(s)?;
        let price = Self::round_from(value)?;
        if price.0 != value {
            return Err(AmountError::Precision(s.to_string()));
        }
        Ok(price)
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
