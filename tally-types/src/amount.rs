//! Fixed-point monetary amounts.
//!
//! Services report balances and totals as decimal strings ("1234.50").
//! Summing them as `f64` drifts (`0.1 + 0.2 != 0.3`), so aggregation that
//! feeds balances goes through [`Amount`]: an `i128` count of
//! `10^-AMOUNT_SCALE` units.

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub};
use std::str::FromStr;

/// Number of fractional digits an [`Amount`] carries.
pub const AMOUNT_SCALE: u32 = 8;

const UNIT: i128 = 10i128.pow(AMOUNT_SCALE);

/// An exact decimal amount with [`AMOUNT_SCALE`] fractional digits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Amount(i128);

impl Amount {
    /// The zero amount.
    pub const ZERO: Self = Self(0);

    /// Creates an amount from raw scaled units.
    #[must_use]
    pub const fn from_units(units: i128) -> Self {
        Self(units)
    }

    /// Creates an amount from a whole number.
    #[must_use]
    pub const fn from_whole(whole: i64) -> Self {
        Self(whole as i128 * UNIT)
    }

    /// Returns the raw scaled units.
    #[must_use]
    pub const fn units(&self) -> i128 {
        self.0
    }

    /// Returns true if the amount is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition.
    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Lossy conversion for display purposes.
    #[must_use]
    pub fn to_f64(&self) -> f64 {
        self.0 as f64 / UNIT as f64
    }

    /// Parses an amount from a JSON string or number.
    ///
    /// Numbers go through their shortest textual form, so `0.1` parses as
    /// exactly one tenth and `1e-7` as one ten-millionth.
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) => s.parse(),
            Value::Number(n) => n.to_string().parse(),
            Value::Null => Ok(Self::ZERO),
            other => Err(Error::InvalidAmount(format!("not a decimal: {other}"))),
        }
    }
}

impl FromStr for Amount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidAmount(s.to_string());
        let trimmed = s.trim();
        let (negative, unsigned) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };

        let (mantissa, exponent) = match unsigned.split_once(['e', 'E']) {
            Some((m, e)) => (m, e.parse::<i32>().map_err(|_| invalid())?),
            None => (unsigned, 0),
        };
        let (whole, frac) = mantissa.split_once('.').unwrap_or((mantissa, ""));

        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        if exponent.unsigned_abs() > MAX_EXPONENT {
            return Err(invalid());
        }

        let (whole, frac) = shift_point(whole, frac, exponent);
        let frac = frac.trim_end_matches('0');
        if frac.len() > AMOUNT_SCALE as usize {
            return Err(Error::InvalidAmount(format!(
                "{s}: more than {AMOUNT_SCALE} fractional digits"
            )));
        }

        let whole_units = if whole.is_empty() {
            0
        } else {
            whole
                .parse::<i128>()
                .map_err(|_| Error::AmountOverflow)?
                .checked_mul(UNIT)
                .ok_or(Error::AmountOverflow)?
        };

        let frac_units = if frac.is_empty() {
            0
        } else {
            let padding = AMOUNT_SCALE - frac.len() as u32;
            frac.parse::<i128>().map_err(|_| Error::AmountOverflow)? * 10i128.pow(padding)
        };

        let units = whole_units
            .checked_add(frac_units)
            .ok_or(Error::AmountOverflow)?;
        Ok(Self(if negative { -units } else { units }))
    }
}

/// Largest exponent magnitude accepted in `1.5e3` notation.
const MAX_EXPONENT: u32 = 64;

/// Moves the decimal point of `whole.frac` right by `exponent` places
/// (left when negative).
fn shift_point(whole: &str, frac: &str, exponent: i32) -> (String, String) {
    let digits = format!("{whole}{frac}");
    let point = whole.len() as i64 + i64::from(exponent);
    if point <= 0 {
        let zeros = "0".repeat(point.unsigned_abs() as usize);
        (String::new(), format!("{zeros}{digits}"))
    } else if point as usize >= digits.len() {
        let zeros = "0".repeat(point as usize - digits.len());
        (format!("{digits}{zeros}"), String::new())
    } else {
        let (w, f) = digits.split_at(point as usize);
        (w.to_string(), f.to_string())
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let unit = UNIT as u128;
        let whole = abs / unit;
        let frac = format!("{:0width$}", abs % unit, width = AMOUNT_SCALE as usize);

        // Keep at least two fractional digits, drop the rest of the zeros.
        let trimmed = frac.trim_end_matches('0');
        let shown = if trimmed.len() < 2 { &frac[..2] } else { trimmed };
        write!(f, "{sign}{whole}.{shown}")
    }
}

impl Add for Amount {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Amount {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self(self.0 - other.0)
    }
}

impl Neg for Amount {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(serde::de::Error::custom)
    }
}
