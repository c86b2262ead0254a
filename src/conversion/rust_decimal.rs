//! Decimal type implementation (rust_decimal crate).

use crate::error::{Error, Result};

use super::{Decimal, FromValue, Value};

impl FromValue for rust_decimal::Decimal {
    fn from_value(value: Value) -> Result<Self> {
        let d = Decimal::from_value(value)?;
        rust_decimal::Decimal::try_from_i128_with_scale(d.unscaled(), d.scale().into())
            .map_err(|e| Error::Conversion(format!("decimal {} out of range: {}", d, e)))
    }
}
