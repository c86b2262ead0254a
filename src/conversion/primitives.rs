//! Primitive type implementations (bool, integers, floats).

use crate::error::{Error, Result};

use super::{FromValue, Value, mismatch};

// === Boolean ===

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(b),
            ref v => match v.as_i128() {
                Some(0) => Ok(false),
                Some(1) => Ok(true),
                Some(_) => Err(Error::overflow(v.type_name(), "bool")),
                None => mismatch(v, "bool"),
            },
        }
    }
}

// === Integer types ===

/// Integers accept any integer value that fits, and decimals without a
/// fractional part.
macro_rules! impl_from_value_int {
    ($($t:ty),+) => {
        $(
            impl FromValue for $t {
                fn from_value(value: Value) -> Result<Self> {
                    let wide = match &value {
                        Value::Decimal(d) => d.to_i128().ok_or_else(|| {
                            Error::Conversion(format!(
                                "decimal {} has a fractional part, cannot convert to {}",
                                d,
                                stringify!($t)
                            ))
                        })?,
                        v => match v.as_i128() {
                            Some(wide) => wide,
                            None => return mismatch(v, stringify!($t)),
                        },
                    };
                    <$t>::try_from(wide)
                        .map_err(|_| Error::overflow(value.type_name(), stringify!($t)))
                }
            }
        )+
    };
}

impl_from_value_int!(i8, i16, i32, i64, u8, u16, u32, u64, i128);

// === Floating point types ===

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::F32(v) => Ok(v),
            Value::I8(v) => Ok(v.into()),
            Value::I16(v) => Ok(v.into()),
            Value::U8(v) => Ok(v.into()),
            Value::U16(v) => Ok(v.into()),
            Value::F64(v) => {
                let narrow = v as f32;
                if f64::from(narrow) == v || v.is_nan() {
                    Ok(narrow)
                } else {
                    Err(Error::overflow("f64", "f32"))
                }
            }
            ref v => mismatch(v, "f32"),
        }
    }
}

/// Largest integer magnitude an `f64` holds exactly.
const F64_EXACT_INT: i128 = 1 << 53;

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::F64(v) => Ok(v),
            Value::F32(v) => Ok(v.into()),
            ref v => match v.as_i128() {
                Some(wide) if wide.abs() <= F64_EXACT_INT => Ok(wide as f64),
                Some(_) => Err(Error::overflow(v.type_name(), "f64")),
                None => mismatch(v, "f64"),
            },
        }
    }
}
