//! String and byte types.

use crate::error::Result;

use super::{FromValue, Value, mismatch};

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s),
            Value::Decimal(d) => Ok(d.to_string()),
            ref v => mismatch(v, "String"),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bytes(b) => Ok(b),
            Value::Text(s) => Ok(s.into_bytes()),
            ref v => mismatch(v, "Vec<u8>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::decode;

    #[test]
    fn test_string() {
        assert_eq!(decode::<String>(Value::Text("hello".into())).unwrap(), "hello");
        assert_eq!(decode::<String>(Value::Text(String::new())).unwrap(), "");
        assert!(decode::<String>(Value::I32(1)).is_err());
        assert!(decode::<String>(Value::Bytes(vec![0xff])).is_err());
    }

    #[test]
    fn test_bytes() {
        assert_eq!(decode::<Vec<u8>>(Value::Bytes(vec![0, 1])).unwrap(), vec![0, 1]);
        assert_eq!(decode::<Vec<u8>>(Value::Text("ab".into())).unwrap(), b"ab".to_vec());
    }
}
