//! Rows and typed row decoding.

use std::sync::Arc;

use crate::conversion::{FromValue, Value, decode};
use crate::error::{Error, Result};

/// One fetched row: a value per column, in column order.
///
/// Rows are produced fresh on every fetch and own their values; nothing
/// refers back into the cursor's buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    names: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub(crate) fn new(names: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { names, values }
    }

    /// Column names of the result set this row belongs to.
    pub fn columns(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Decode column `index` (0-based).
    pub fn get<T: FromValue>(&self, index: usize) -> Result<T> {
        let value = self.values.get(index).ok_or_else(|| {
            Error::InvalidUsage(format!(
                "column index {} out of range for {} columns",
                index,
                self.values.len()
            ))
        })?;
        decode(value.clone())
    }

    /// Decode the first column named `name`.
    pub fn get_by_name<T: FromValue>(&self, name: &str) -> Result<T> {
        let index = self
            .names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| Error::InvalidUsage(format!("no column named {:?}", name)))?;
        self.get(index)
    }
}

/// Trait for decoding a row into a Rust type.
pub trait FromRow: Sized {
    fn from_row(row: Row) -> Result<Self>;
}

impl FromRow for Row {
    fn from_row(row: Row) -> Result<Self> {
        Ok(row)
    }
}

impl FromRow for Vec<Value> {
    fn from_row(row: Row) -> Result<Self> {
        Ok(row.values)
    }
}

// Tuple implementations via macro
macro_rules! impl_from_row {
    ($count:expr, $($T:ident),+) => {
        impl<$($T: FromValue),+> FromRow for ($($T,)+) {
            fn from_row(row: Row) -> Result<Self> {
                if row.values.len() != $count {
                    return Err(Error::Conversion(format!(
                        "row has {} columns, expected {}",
                        row.values.len(),
                        $count
                    )));
                }
                let mut iter = row.values.into_iter();
                Ok(($(decode::<$T>(iter.next().unwrap_or_default())?,)+))
            }
        }
    };
}

impl_from_row!(1, T0);
impl_from_row!(2, T0, T1);
impl_from_row!(3, T0, T1, T2);
impl_from_row!(4, T0, T1, T2, T3);
impl_from_row!(5, T0, T1, T2, T3, T4);
impl_from_row!(6, T0, T1, T2, T3, T4, T5);
impl_from_row!(7, T0, T1, T2, T3, T4, T5, T6);
impl_from_row!(8, T0, T1, T2, T3, T4, T5, T6, T7);
impl_from_row!(9, T0, T1, T2, T3, T4, T5, T6, T7, T8);
impl_from_row!(10, T0, T1, T2, T3, T4, T5, T6, T7, T8, T9);
impl_from_row!(11, T0, T1, T2, T3, T4, T5, T6, T7, T8, T9, T10);
impl_from_row!(12, T0, T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11);

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: Vec<Value>) -> Row {
        let names: Vec<String> = (0..values.len()).map(|i| format!("c{}", i)).collect();
        Row::new(names.into(), values)
    }

    #[test]
    fn test_tuple() {
        let r = row(vec![Value::I32(1), Value::Text("a".into()), Value::Null]);
        let (id, name, note): (i64, String, Option<String>) = FromRow::from_row(r).unwrap();
        assert_eq!((id, name.as_str(), note), (1, "a", None));
    }

    #[test]
    fn test_tuple_arity_mismatch() {
        let r = row(vec![Value::I32(1), Value::I32(2)]);
        assert!(matches!(
            <(i32,)>::from_row(r),
            Err(Error::Conversion(_))
        ));
    }

    #[test]
    fn test_get_by_name() {
        let r = row(vec![Value::I16(5), Value::Bool(true)]);
        assert_eq!(r.get_by_name::<bool>("c1").unwrap(), true);
        assert_eq!(r.get::<i32>(0).unwrap(), 5);
        assert!(r.get::<i32>(2).is_err());
        assert!(r.get_by_name::<i32>("missing").is_err());
    }
}
