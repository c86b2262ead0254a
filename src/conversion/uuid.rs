//! UUID type implementation (uuid crate).
//!
//! GUID columns surface as canonical text; raw 16-byte values are accepted too.

use crate::error::{Error, Result};

use super::{FromValue, Value, mismatch};

impl FromValue for uuid::Uuid {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(s) => {
                uuid::Uuid::parse_str(&s).map_err(|e| Error::Conversion(format!("invalid UUID: {}", e)))
            }
            Value::Bytes(b) => {
                uuid::Uuid::from_slice(&b).map_err(|e| Error::Conversion(format!("invalid UUID: {}", e)))
            }
            ref v => mismatch(v, "Uuid"),
        }
    }
}
