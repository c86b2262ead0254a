//! Conversion between native buffers and portable values.
//!
//! Column data arrives in one of two ways:
//! - bound columns: the driver writes each row into a pre-registered buffer,
//!   decoded by [`convert_bound`]
//! - deferred columns: the value is pulled in chunks after the fetch, see
//!   [`read_deferred`]
//!
//! Both produce a [`Value`]. [`FromValue`] then turns values into Rust types,
//! rejecting anything that does not fit the target type.

mod chunked;
mod datetime;
mod decimal;
mod native;
mod primitives;
mod string;

#[cfg(feature = "with-chrono")]
mod chrono;
#[cfg(feature = "with-rust-decimal")]
mod rust_decimal;
#[cfg(feature = "with-time")]
mod time;
#[cfg(feature = "with-uuid")]
mod uuid;

pub use chunked::{ChunkLimits, read_deferred};
pub use datetime::{Date, Time, Timestamp};
pub use decimal::Decimal;
pub use native::{convert_bound, encode_native};

pub(crate) use native::decode_variable;

use crate::error::{Error, Result};

/// A portable column or parameter value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    Bytes(Vec<u8>),
    Date(Date),
    Time(Time),
    Timestamp(Timestamp),
    Text(String),
}

/// The kind of a [`Value`], without payload.
///
/// Used as the conversion target of a column and as its scan type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Decimal,
    Bytes,
    Date,
    Time,
    Timestamp,
    Text,
}

impl ValueKind {
    /// Rust type a column of this kind scans into.
    pub fn rust_type_name(self) -> &'static str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::I8 => "i8",
            ValueKind::I16 => "i16",
            ValueKind::I32 => "i32",
            ValueKind::I64 => "i64",
            ValueKind::U8 => "u8",
            ValueKind::U16 => "u16",
            ValueKind::U32 => "u32",
            ValueKind::U64 => "u64",
            ValueKind::F32 => "f32",
            ValueKind::F64 => "f64",
            ValueKind::Decimal => "Decimal",
            ValueKind::Bytes => "Vec<u8>",
            ValueKind::Date => "Date",
            ValueKind::Time => "Time",
            ValueKind::Timestamp => "Timestamp",
            ValueKind::Text => "String",
        }
    }
}

impl Value {
    /// Kind of this value, `None` for `Null`.
    pub fn kind(&self) -> Option<ValueKind> {
        Some(match self {
            Value::Null => return None,
            Value::Bool(_) => ValueKind::Bool,
            Value::I8(_) => ValueKind::I8,
            Value::I16(_) => ValueKind::I16,
            Value::I32(_) => ValueKind::I32,
            Value::I64(_) => ValueKind::I64,
            Value::U8(_) => ValueKind::U8,
            Value::U16(_) => ValueKind::U16,
            Value::U32(_) => ValueKind::U32,
            Value::U64(_) => ValueKind::U64,
            Value::F32(_) => ValueKind::F32,
            Value::F64(_) => ValueKind::F64,
            Value::Decimal(_) => ValueKind::Decimal,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Date(_) => ValueKind::Date,
            Value::Time(_) => ValueKind::Time,
            Value::Timestamp(_) => ValueKind::Timestamp,
            Value::Text(_) => ValueKind::Text,
        })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer payload widened to `i128`, `None` for non-integer values.
    pub(crate) fn as_i128(&self) -> Option<i128> {
        match *self {
            Value::I8(v) => Some(v.into()),
            Value::I16(v) => Some(v.into()),
            Value::I32(v) => Some(v.into()),
            Value::I64(v) => Some(v.into()),
            Value::U8(v) => Some(v.into()),
            Value::U16(v) => Some(v.into()),
            Value::U32(v) => Some(v.into()),
            Value::U64(v) => Some(v.into()),
            _ => None,
        }
    }

    pub(crate) fn type_name(&self) -> &'static str {
        match self.kind() {
            Some(kind) => kind.rust_type_name(),
            None => "NULL",
        }
    }
}

/// Trait for converting portable values into Rust types.
pub trait FromValue: Sized {
    /// Decode from NULL.
    ///
    /// Default implementation returns an error. Override for types that can
    /// represent NULL (like `Option<T>`).
    fn from_null() -> Result<Self> {
        Err(Error::Conversion("unexpected NULL value".into()))
    }

    /// Decode from a non-NULL value.
    fn from_value(value: Value) -> Result<Self>;
}

/// Decode a value, dispatching NULL to [`FromValue::from_null`].
pub fn decode<T: FromValue>(value: Value) -> Result<T> {
    match value {
        Value::Null => T::from_null(),
        value => T::from_value(value),
    }
}

pub(crate) fn mismatch<T>(value: &Value, target: &str) -> Result<T> {
    Err(Error::Conversion(format!(
        "cannot convert {} to {}",
        value.type_name(),
        target
    )))
}

// === Option<T> - NULL handling ===

impl<T: FromValue> FromValue for Option<T> {
    fn from_null() -> Result<Self> {
        Ok(None)
    }

    fn from_value(value: Value) -> Result<Self> {
        T::from_value(value).map(Some)
    }
}

impl FromValue for Value {
    fn from_null() -> Result<Self> {
        Ok(Value::Null)
    }

    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_null() {
        assert_eq!(decode::<Option<i32>>(Value::Null).unwrap(), None);
        assert_eq!(decode::<Option<i32>>(Value::I32(7)).unwrap(), Some(7));
    }

    #[test]
    fn test_null_rejected() {
        assert!(matches!(
            decode::<i32>(Value::Null),
            Err(Error::Conversion(_))
        ));
    }

    #[test]
    fn test_kind() {
        assert_eq!(Value::Null.kind(), None);
        assert_eq!(Value::Text(String::new()).kind(), Some(ValueKind::Text));
        assert_eq!(ValueKind::Bytes.rust_type_name(), "Vec<u8>");
    }
}
