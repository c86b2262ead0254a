//! Fixed-point decimal values.
//!
//! Drivers hand out DECIMAL/NUMERIC columns as text (`"-12.3400"`). The text
//! is parsed into an unscaled `i128` plus a scale, so no value ever passes
//! through floating point.

use std::str::FromStr;

use crate::error::{Error, Result};

use super::{FromValue, Value, mismatch};

/// Maximum number of significant digits a [`Decimal`] holds.
pub const MAX_PRECISION: u32 = 38;

/// An exact decimal number `unscaled * 10^-scale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Decimal {
    unscaled: i128,
    scale: u8,
}

impl Decimal {
    /// Create from an unscaled integer and a scale.
    pub fn new(unscaled: i128, scale: u8) -> Result<Self> {
        if u32::from(scale) > MAX_PRECISION {
            return Err(Error::Conversion(format!(
                "decimal scale {} exceeds {}",
                scale, MAX_PRECISION
            )));
        }
        if unscaled.unsigned_abs() >= 10u128.pow(MAX_PRECISION) {
            return Err(Error::Conversion(format!(
                "decimal {} exceeds {} digits",
                unscaled, MAX_PRECISION
            )));
        }
        Ok(Self { unscaled, scale })
    }

    pub fn unscaled(&self) -> i128 {
        self.unscaled
    }

    /// Number of digits after the decimal point.
    pub fn scale(&self) -> u8 {
        self.scale
    }

    pub fn is_negative(&self) -> bool {
        self.unscaled < 0
    }

    /// The value as an integer, `None` if it has a non-zero fractional part.
    pub fn to_i128(&self) -> Option<i128> {
        let divisor = 10i128.pow(u32::from(self.scale));
        if self.unscaled % divisor == 0 {
            Some(self.unscaled / divisor)
        } else {
            None
        }
    }

    /// Parse driver decimal text such as `"123"`, `"-0.50"` or `".5"`.
    ///
    /// Zero carries no sign: `"-0.00"` parses to the same value as `"0.00"`
    /// and displays without the minus.
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = || Error::Conversion(format!("invalid decimal text {:?}", text));
        let s = text.trim();
        let (negative, digits) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            _ => (false, s),
        };
        let (int_part, frac_part) = match digits.split_once('.') {
            Some((i, f)) => (i, f),
            None => (digits, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if frac_part.len() > MAX_PRECISION as usize {
            return Err(Error::Conversion(format!(
                "decimal {:?} has more than {} fractional digits",
                text, MAX_PRECISION
            )));
        }

        let mut unscaled: i128 = 0;
        let mut significant = 0u32;
        for b in int_part.bytes().chain(frac_part.bytes()) {
            if !b.is_ascii_digit() {
                return Err(invalid());
            }
            if significant > 0 || b != b'0' {
                significant += 1;
            }
            if significant > MAX_PRECISION {
                return Err(Error::Conversion(format!(
                    "decimal {:?} exceeds {} digits",
                    text, MAX_PRECISION
                )));
            }
            unscaled = unscaled * 10 + i128::from(b - b'0');
        }
        if negative {
            unscaled = -unscaled;
        }
        Ok(Self {
            unscaled,
            scale: frac_part.len() as u8,
        })
    }
}

impl FromStr for Decimal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl std::fmt::Display for Decimal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let digits = self.unscaled.unsigned_abs().to_string();
        let scale = usize::from(self.scale);
        if self.unscaled < 0 {
            f.write_str("-")?;
        }
        if scale == 0 {
            return f.write_str(&digits);
        }
        if digits.len() > scale {
            let (int_part, frac_part) = digits.split_at(digits.len() - scale);
            write!(f, "{}.{}", int_part, frac_part)
        } else {
            write!(f, "0.{:0>width$}", digits, width = scale)
        }
    }
}

impl FromValue for Decimal {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Decimal(d) => Ok(d),
            Value::Text(ref s) => Decimal::parse(s),
            ref v => match v.as_i128() {
                Some(wide) => Decimal::new(wide, 0),
                None => mismatch(v, "Decimal"),
            },
        }
    }
}
