//! Native buffer representations.
//!
//! Fixed-size representations are read at their exact width with native
//! byte order. Character data is narrow UTF-8 (`CHAR`) or UTF-16 (`WCHAR`);
//! DECIMAL/NUMERIC travel as character data and are parsed into [`Decimal`].

use zerocopy::{FromBytes, IntoBytes};

use crate::api::{CType, DateStruct, GuidStruct, NO_TOTAL, NULL_DATA, TimeStruct, TimestampStruct};
use crate::error::{Error, Result};

use super::{Date, Decimal, FromValue, Time, Timestamp, Value, ValueKind, mismatch};

/// Convert the contents of a bound column buffer.
///
/// `indicator` is the length/indicator the driver wrote alongside the data.
/// Character and binary data whose length exceeds the buffer was truncated
/// by the driver and is rejected instead of silently shortened.
pub fn convert_bound(
    c_type: CType,
    target: ValueKind,
    buffer: &[u8],
    indicator: isize,
) -> Result<Value> {
    if indicator == NULL_DATA {
        return Ok(Value::Null);
    }
    if c_type.fixed_width().is_some() {
        return decode_fixed(c_type, buffer);
    }
    let capacity = buffer.len().saturating_sub(c_type.terminator_len());
    let len = match usize::try_from(indicator) {
        Ok(len) if indicator != NO_TOTAL && len <= capacity => len,
        _ => {
            return Err(Error::Conversion(format!(
                "column data truncated: length {} exceeds bound buffer of {} bytes",
                indicator, capacity
            )));
        }
    };
    decode_variable(c_type, target, &buffer[..len])
}

/// Decode complete character or binary data.
pub(crate) fn decode_variable(c_type: CType, target: ValueKind, bytes: &[u8]) -> Result<Value> {
    match c_type {
        CType::BINARY => Ok(Value::Bytes(bytes.to_vec())),
        CType::CHAR => {
            let s = simdutf8::compat::from_utf8(bytes)
                .map_err(|e| Error::Conversion(format!("invalid UTF-8: {}", e)))?;
            text_value(target, s.to_owned())
        }
        CType::WCHAR => {
            if bytes.len() % 2 != 0 {
                return Err(Error::Conversion(format!(
                    "odd length {} for UTF-16 data",
                    bytes.len()
                )));
            }
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|c| u16::from_ne_bytes([c[0], c[1]]))
                .collect();
            let s = String::from_utf16(&units)
                .map_err(|e| Error::Conversion(format!("invalid UTF-16: {}", e)))?;
            text_value(target, s)
        }
        other => Err(Error::Internal(format!(
            "C type {} is not variable-length",
            other.0
        ))),
    }
}

fn text_value(target: ValueKind, s: String) -> Result<Value> {
    match target {
        ValueKind::Decimal => Decimal::parse(&s).map(Value::Decimal),
        ValueKind::Bytes => Ok(Value::Bytes(s.into_bytes())),
        _ => Ok(Value::Text(s)),
    }
}

fn array<const N: usize>(buffer: &[u8]) -> Result<[u8; N]> {
    buffer
        .get(..N)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| short_buffer(N, buffer.len()))
}

fn short_buffer(expected: usize, actual: usize) -> Error {
    Error::Internal(format!(
        "bound buffer of {} bytes is shorter than {}",
        actual, expected
    ))
}

fn read_struct<T: FromBytes>(buffer: &[u8]) -> Result<T> {
    T::read_from_prefix(buffer)
        .map(|(value, _)| value)
        .map_err(|_| short_buffer(size_of::<T>(), buffer.len()))
}

fn decode_fixed(c_type: CType, buffer: &[u8]) -> Result<Value> {
    Ok(match c_type {
        CType::BIT => Value::Bool(array::<1>(buffer)?[0] != 0),
        CType::STINYINT => Value::I8(i8::from_ne_bytes(array(buffer)?)),
        CType::UTINYINT => Value::U8(u8::from_ne_bytes(array(buffer)?)),
        CType::SSHORT => Value::I16(i16::from_ne_bytes(array(buffer)?)),
        CType::USHORT => Value::U16(u16::from_ne_bytes(array(buffer)?)),
        CType::SLONG => Value::I32(i32::from_ne_bytes(array(buffer)?)),
        CType::ULONG => Value::U32(u32::from_ne_bytes(array(buffer)?)),
        CType::SBIGINT => Value::I64(i64::from_ne_bytes(array(buffer)?)),
        CType::UBIGINT => Value::U64(u64::from_ne_bytes(array(buffer)?)),
        CType::FLOAT => Value::F32(f32::from_ne_bytes(array(buffer)?)),
        CType::DOUBLE => Value::F64(f64::from_ne_bytes(array(buffer)?)),
        CType::TYPE_DATE => Value::Date(Date::from_native(&read_struct::<DateStruct>(buffer)?)?),
        CType::TYPE_TIME => Value::Time(Time::from_native(&read_struct::<TimeStruct>(buffer)?)?),
        CType::TYPE_TIMESTAMP => Value::Timestamp(Timestamp::from_native(
            &read_struct::<TimestampStruct>(buffer)?,
        )?),
        CType::GUID => Value::Text(format_guid(&read_struct::<GuidStruct>(buffer)?)),
        other => {
            return Err(Error::Internal(format!(
                "C type {} is not fixed-width",
                other.0
            )));
        }
    })
}

/// Canonical `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx` form of a GUID.
pub(crate) fn format_guid(guid: &GuidStruct) -> String {
    let d4 = guid.d4;
    format!(
        "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        guid.d1, guid.d2, guid.d3, d4[0], d4[1], d4[2], d4[3], d4[4], d4[5], d4[6], d4[7]
    )
}

/// Parse the canonical GUID form, with or without surrounding braces.
pub(crate) fn parse_guid(text: &str) -> Result<GuidStruct> {
    let invalid = || Error::Conversion(format!("invalid GUID {:?}", text));
    let s = text.trim();
    let s = s
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .unwrap_or(s);
    let groups: Vec<&str> = s.split('-').collect();
    let lens = [8, 4, 4, 4, 12];
    if groups.len() != lens.len()
        || groups.iter().zip(lens).any(|(g, len)| g.len() != len)
        || !groups.iter().all(|g| g.bytes().all(|b| b.is_ascii_hexdigit()))
    {
        return Err(invalid());
    }
    let tail = format!("{}{}", groups[3], groups[4]);
    let mut d4 = [0u8; 8];
    for (i, byte) in d4.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&tail[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
    }
    Ok(GuidStruct {
        d1: u32::from_str_radix(groups[0], 16).map_err(|_| invalid())?,
        d2: u16::from_str_radix(groups[1], 16).map_err(|_| invalid())?,
        d3: u16::from_str_radix(groups[2], 16).map_err(|_| invalid())?,
        d4,
    })
}

/// Write `value` in the native representation `c_type`.
///
/// Character data is written without terminator. Integers are range-checked
/// against the width of `c_type`.
pub fn encode_native(value: &Value, c_type: CType, out: &mut Vec<u8>) -> Result<()> {
    if value.is_null() {
        return Err(Error::Conversion(
            "NULL has no native representation, use the NULL indicator".into(),
        ));
    }
    let owned = || value.clone();
    match c_type {
        CType::BIT => out.push(u8::from(bool::from_value(owned())?)),
        CType::STINYINT => out.extend_from_slice(&i8::from_value(owned())?.to_ne_bytes()),
        CType::UTINYINT => out.push(u8::from_value(owned())?),
        CType::SSHORT => out.extend_from_slice(&i16::from_value(owned())?.to_ne_bytes()),
        CType::USHORT => out.extend_from_slice(&u16::from_value(owned())?.to_ne_bytes()),
        CType::SLONG => out.extend_from_slice(&i32::from_value(owned())?.to_ne_bytes()),
        CType::ULONG => out.extend_from_slice(&u32::from_value(owned())?.to_ne_bytes()),
        CType::SBIGINT => out.extend_from_slice(&i64::from_value(owned())?.to_ne_bytes()),
        CType::UBIGINT => out.extend_from_slice(&u64::from_value(owned())?.to_ne_bytes()),
        CType::FLOAT => out.extend_from_slice(&f32::from_value(owned())?.to_ne_bytes()),
        CType::DOUBLE => out.extend_from_slice(&f64::from_value(owned())?.to_ne_bytes()),
        CType::TYPE_DATE => out.extend_from_slice(Date::from_value(owned())?.to_native().as_bytes()),
        CType::TYPE_TIME => out.extend_from_slice(Time::from_value(owned())?.to_native().as_bytes()),
        CType::TYPE_TIMESTAMP => {
            out.extend_from_slice(Timestamp::from_value(owned())?.to_native().as_bytes())
        }
        CType::GUID => match value {
            Value::Text(s) => out.extend_from_slice(parse_guid(s)?.as_bytes()),
            v => return mismatch(v, "GUID"),
        },
        CType::CHAR => out.extend_from_slice(text_of(value)?.as_bytes()),
        CType::WCHAR => {
            for unit in text_of(value)?.encode_utf16() {
                out.extend_from_slice(&unit.to_ne_bytes());
            }
        }
        CType::BINARY => match value {
            Value::Bytes(b) => out.extend_from_slice(b),
            Value::Text(s) => out.extend_from_slice(s.as_bytes()),
            v => return mismatch(v, "binary"),
        },
        other => {
            return Err(Error::Internal(format!(
                "unsupported C type {}",
                other.0
            )));
        }
    }
    Ok(())
}

fn text_of(value: &Value) -> Result<String> {
    match value {
        Value::Text(s) => Ok(s.clone()),
        Value::Decimal(d) => Ok(d.to_string()),
        Value::Date(d) => Ok(d.to_string()),
        Value::Time(t) => Ok(t.to_string()),
        Value::Timestamp(ts) => Ok(ts.to_string()),
        v => mismatch(v, "text"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Encode into a buffer sized like a bound column, then convert back.
    fn round_trip(value: Value, c_type: CType, target: ValueKind) -> Value {
        let mut buf = Vec::new();
        let indicator = if value.is_null() {
            NULL_DATA
        } else {
            encode_native(&value, c_type, &mut buf).unwrap();
            buf.len() as isize
        };
        let width = c_type.fixed_width().unwrap_or(buf.len() + c_type.terminator_len());
        buf.resize(width.max(1), 0);
        convert_bound(c_type, target, &buf, indicator).unwrap()
    }

    #[test]
    fn test_round_trip_fixed() {
        let cases = [
            (Value::Bool(true), CType::BIT, ValueKind::Bool),
            (Value::Bool(false), CType::BIT, ValueKind::Bool),
            (Value::I8(i8::MIN), CType::STINYINT, ValueKind::I8),
            (Value::U8(u8::MAX), CType::UTINYINT, ValueKind::U8),
            (Value::I16(i16::MIN), CType::SSHORT, ValueKind::I16),
            (Value::U16(u16::MAX), CType::USHORT, ValueKind::U16),
            (Value::I32(0), CType::SLONG, ValueKind::I32),
            (Value::I32(i32::MAX), CType::SLONG, ValueKind::I32),
            (Value::U32(u32::MAX), CType::ULONG, ValueKind::U32),
            (Value::I64(i64::MIN), CType::SBIGINT, ValueKind::I64),
            (Value::I64(i64::MAX), CType::SBIGINT, ValueKind::I64),
            (Value::U64(u64::MAX), CType::UBIGINT, ValueKind::U64),
            (Value::F32(f32::MIN_POSITIVE), CType::FLOAT, ValueKind::F32),
            (Value::F64(f64::MAX), CType::DOUBLE, ValueKind::F64),
            (Value::F64(-0.0), CType::DOUBLE, ValueKind::F64),
            (
                Value::Date(Date::new(1, 1, 1).unwrap()),
                CType::TYPE_DATE,
                ValueKind::Date,
            ),
            (
                Value::Time(Time::new(23, 59, 59, 0).unwrap()),
                CType::TYPE_TIME,
                ValueKind::Time,
            ),
            (
                Value::Timestamp(Timestamp::new(
                    Date::new(9999, 12, 31).unwrap(),
                    Time::new(23, 59, 59, 999_999_999).unwrap(),
                )),
                CType::TYPE_TIMESTAMP,
                ValueKind::Timestamp,
            ),
            (
                Value::Text("a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11".into()),
                CType::GUID,
                ValueKind::Text,
            ),
            (Value::Null, CType::SLONG, ValueKind::I32),
        ];
        for (value, c_type, target) in cases {
            assert_eq!(round_trip(value.clone(), c_type, target), value);
        }
    }

    #[test]
    fn test_round_trip_variable() {
        let cases = [
            (Value::Text(String::new()), CType::CHAR, ValueKind::Text),
            (Value::Text("héllo wörld".into()), CType::CHAR, ValueKind::Text),
            (Value::Text("日本語 🎉".into()), CType::WCHAR, ValueKind::Text),
            (Value::Bytes(vec![]), CType::BINARY, ValueKind::Bytes),
            (Value::Bytes(vec![0, 0xff, 0x7f]), CType::BINARY, ValueKind::Bytes),
            (
                Value::Decimal("-123456789012345678901234567.89012345678".parse().unwrap()),
                CType::CHAR,
                ValueKind::Decimal,
            ),
            (Value::Null, CType::WCHAR, ValueKind::Text),
        ];
        for (value, c_type, target) in cases {
            assert_eq!(round_trip(value.clone(), c_type, target), value);
        }
    }

    #[test]
    fn test_truncated_text_is_error() {
        let buf = b"abcd\0".to_vec();
        assert!(matches!(
            convert_bound(CType::CHAR, ValueKind::Text, &buf, 10),
            Err(Error::Conversion(_))
        ));
        assert!(matches!(
            convert_bound(CType::CHAR, ValueKind::Text, &buf, NO_TOTAL),
            Err(Error::Conversion(_))
        ));
        assert_eq!(
            convert_bound(CType::CHAR, ValueKind::Text, &buf, 4).unwrap(),
            Value::Text("abcd".into())
        );
    }

    #[test]
    fn test_encode_range_checked() {
        let mut buf = Vec::new();
        assert!(matches!(
            encode_native(&Value::I64(i64::from(i32::MAX) + 1), CType::SLONG, &mut buf),
            Err(Error::Conversion(_))
        ));
        assert!(matches!(
            encode_native(&Value::I16(-1), CType::UTINYINT, &mut buf),
            Err(Error::Conversion(_))
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_invalid_utf8() {
        assert!(matches!(
            decode_variable(CType::CHAR, ValueKind::Text, &[0xff, 0xfe]),
            Err(Error::Conversion(_))
        ));
    }

    #[test]
    fn test_guid_text() {
        let guid = parse_guid("{A0EEBC99-9C0B-4EF8-BB6D-6BB9BD380A11}").unwrap();
        assert_eq!(guid.d1, 0xa0eebc99);
        assert_eq!(guid.d4, [0xbb, 0x6d, 0x6b, 0xb9, 0xbd, 0x38, 0x0a, 0x11]);
        assert_eq!(format_guid(&guid), "a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11");
        assert!(parse_guid("a0eebc99-9c0b-4ef8-bb6d").is_err());
        assert!(parse_guid("g0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11").is_err());
    }
}
