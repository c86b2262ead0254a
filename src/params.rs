//! Input parameters.
//!
//! Parameters are converted to [`Value`]s and written into heap buffers owned
//! by the statement. The driver reads those buffers at execute time, so they
//! stay alive until the parameters are reset by the next execute or the
//! statement is closed.

use crate::api::{Api, CType, HandleType, NULL_DATA, RawHandle, SqlType};
use crate::column::BoundBuffer;
use crate::conversion::{Date, Decimal, Time, Timestamp, Value, encode_native};
use crate::diag::{ErrorClass, check};
use crate::error::{Error, Result};

/// Trait for converting a Rust value into a statement parameter.
pub trait ToParam {
    fn to_param(&self) -> Value;
}

/// Trait for encoding multiple parameters.
pub trait ToParams {
    /// Number of parameters.
    fn param_count(&self) -> usize;

    /// Append all parameters in order.
    fn to_values(&self, out: &mut Vec<Value>);
}

macro_rules! impl_to_param {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl ToParam for $t {
                fn to_param(&self) -> Value {
                    Value::$variant(*self)
                }
            }
        )*
    };
}

impl_to_param!(
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    Decimal => Decimal,
    Date => Date,
    Time => Time,
    Timestamp => Timestamp,
);

impl ToParam for str {
    fn to_param(&self) -> Value {
        Value::Text(self.to_string())
    }
}

impl ToParam for String {
    fn to_param(&self) -> Value {
        Value::Text(self.clone())
    }
}

impl ToParam for [u8] {
    fn to_param(&self) -> Value {
        Value::Bytes(self.to_vec())
    }
}

impl ToParam for Vec<u8> {
    fn to_param(&self) -> Value {
        Value::Bytes(self.clone())
    }
}

impl ToParam for Value {
    fn to_param(&self) -> Value {
        self.clone()
    }
}

impl<T: ToParam> ToParam for Option<T> {
    fn to_param(&self) -> Value {
        match self {
            Some(v) => v.to_param(),
            None => Value::Null,
        }
    }
}

impl<T: ToParam + ?Sized> ToParam for &T {
    fn to_param(&self) -> Value {
        (*self).to_param()
    }
}

// === ToParams implementations ===

impl ToParams for () {
    fn param_count(&self) -> usize {
        0
    }

    fn to_values(&self, _out: &mut Vec<Value>) {}
}

impl<T: ToParams + ?Sized> ToParams for &T {
    fn param_count(&self) -> usize {
        (*self).param_count()
    }

    fn to_values(&self, out: &mut Vec<Value>) {
        (*self).to_values(out);
    }
}

impl ToParams for [Value] {
    fn param_count(&self) -> usize {
        self.len()
    }

    fn to_values(&self, out: &mut Vec<Value>) {
        out.extend_from_slice(self);
    }
}

impl ToParams for Vec<Value> {
    fn param_count(&self) -> usize {
        self.len()
    }

    fn to_values(&self, out: &mut Vec<Value>) {
        out.extend_from_slice(self);
    }
}

macro_rules! impl_to_params {
    ($count:expr, $($idx:tt: $T:ident),+) => {
        impl<$($T: ToParam),+> ToParams for ($($T,)+) {
            fn param_count(&self) -> usize {
                $count
            }

            fn to_values(&self, out: &mut Vec<Value>) {
                $(out.push(self.$idx.to_param());)+
            }
        }
    };
}

impl_to_params!(1, 0: T0);
impl_to_params!(2, 0: T0, 1: T1);
impl_to_params!(3, 0: T0, 1: T1, 2: T2);
impl_to_params!(4, 0: T0, 1: T1, 2: T2, 3: T3);
impl_to_params!(5, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4);
impl_to_params!(6, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5);
impl_to_params!(7, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6);
impl_to_params!(8, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7);
impl_to_params!(9, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7, 8: T8);
impl_to_params!(10, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7, 8: T8, 9: T9);
impl_to_params!(11, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7, 8: T8, 9: T9, 10: T10);
impl_to_params!(12, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7, 8: T8, 9: T9, 10: T10, 11: T11);

/// Native description of a parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamShape {
    pub c_type: CType,
    pub sql_type: SqlType,
    pub column_size: usize,
    pub decimal_digits: i16,
}

impl ParamShape {
    fn new(c_type: CType, sql_type: SqlType, column_size: usize, decimal_digits: i16) -> Self {
        Self {
            c_type,
            sql_type,
            column_size,
            decimal_digits,
        }
    }
}

fn decimal_precision(d: &Decimal) -> usize {
    let digits = d.unscaled().unsigned_abs().checked_ilog10().map_or(1, |n| n as usize + 1);
    digits.max(usize::from(d.scale())).max(1)
}

/// Native buffer type and SQL type a value is sent as.
pub fn param_shape(value: &Value) -> ParamShape {
    match value {
        // any type works for NULL, the indicator carries the value
        Value::Null => ParamShape::new(CType::CHAR, SqlType::VARCHAR, 1, 0),
        Value::Bool(_) => ParamShape::new(CType::BIT, SqlType::BIT, 1, 0),
        Value::I8(_) => ParamShape::new(CType::STINYINT, SqlType::TINYINT, 3, 0),
        Value::U8(_) => ParamShape::new(CType::UTINYINT, SqlType::TINYINT, 3, 0),
        Value::I16(_) => ParamShape::new(CType::SSHORT, SqlType::SMALLINT, 5, 0),
        Value::U16(_) => ParamShape::new(CType::USHORT, SqlType::SMALLINT, 5, 0),
        Value::I32(_) => ParamShape::new(CType::SLONG, SqlType::INTEGER, 10, 0),
        Value::U32(_) => ParamShape::new(CType::ULONG, SqlType::INTEGER, 10, 0),
        Value::I64(_) => ParamShape::new(CType::SBIGINT, SqlType::BIGINT, 19, 0),
        Value::U64(_) => ParamShape::new(CType::UBIGINT, SqlType::BIGINT, 20, 0),
        Value::F32(_) => ParamShape::new(CType::FLOAT, SqlType::REAL, 7, 0),
        Value::F64(_) => ParamShape::new(CType::DOUBLE, SqlType::DOUBLE, 15, 0),
        Value::Decimal(d) => ParamShape::new(
            CType::CHAR,
            SqlType::DECIMAL,
            decimal_precision(d),
            i16::from(d.scale()),
        ),
        Value::Bytes(b) => ParamShape::new(CType::BINARY, SqlType::VARBINARY, b.len().max(1), 0),
        Value::Date(_) => ParamShape::new(CType::TYPE_DATE, SqlType::TYPE_DATE, 10, 0),
        Value::Time(_) => ParamShape::new(CType::TYPE_TIME, SqlType::TYPE_TIME, 8, 0),
        Value::Timestamp(_) => {
            ParamShape::new(CType::TYPE_TIMESTAMP, SqlType::TYPE_TIMESTAMP, 29, 9)
        }
        Value::Text(s) => ParamShape::new(
            CType::WCHAR,
            SqlType::WVARCHAR,
            s.encode_utf16().count().max(1),
            0,
        ),
    }
}

/// Parameter buffers registered with a statement.
#[derive(Debug, Default)]
pub struct ParamBuffers {
    buffers: Vec<BoundBuffer>,
}

impl ParamBuffers {
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

/// Encode `params` and bind them to `stmt`, numbered from 1.
///
/// On failure the bindings made so far are reset before the error is
/// returned.
pub fn bind_params<P: ToParams + ?Sized>(
    api: &dyn Api,
    stmt: RawHandle,
    params: &P,
) -> Result<ParamBuffers> {
    let mut values = Vec::with_capacity(params.param_count());
    params.to_values(&mut values);

    let mut out = ParamBuffers::default();
    let mut bytes = Vec::new();
    for (i, value) in values.iter().enumerate() {
        let number = u16::try_from(i + 1)
            .map_err(|_| Error::InvalidUsage(format!("too many parameters: {}", values.len())))?;
        let shape = param_shape(value);
        bytes.clear();
        let buffer = if value.is_null() {
            BoundBuffer::filled(&[], NULL_DATA)
        } else {
            encode_native(value, shape.c_type, &mut bytes)?;
            // bytes.len() never exceeds isize::MAX for an allocated Vec
            BoundBuffer::filled(&bytes, bytes.len() as isize)
        };
        let buffer_len = buffer.len() as isize;
        // SAFETY: the buffer is kept in the returned ParamBuffers, which the
        // statement holds until it resets parameters or is freed.
        let ret = unsafe {
            api.bind_parameter(
                stmt,
                number,
                shape.c_type,
                shape.sql_type,
                shape.column_size,
                shape.decimal_digits,
                buffer.data_ptr(),
                buffer_len,
                buffer.indicator_ptr(),
            )
        };
        if let Err(e) = check(api, HandleType::Stmt, stmt, "SQLBindParameter", ret, ErrorClass::Bind)
        {
            api.reset_params(stmt);
            return Err(e);
        }
        out.buffers.push(buffer);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values<P: ToParams>(params: P) -> Vec<Value> {
        let mut out = Vec::new();
        params.to_values(&mut out);
        assert_eq!(out.len(), params.param_count());
        out
    }

    #[test]
    fn test_tuple_params() {
        let v = values((1i32, "a", None::<i64>, vec![1u8, 2]));
        assert_eq!(
            v,
            vec![
                Value::I32(1),
                Value::Text("a".into()),
                Value::Null,
                Value::Bytes(vec![1, 2]),
            ]
        );
        assert!(values(()).is_empty());
        let slice = [Value::Bool(true)];
        assert_eq!(values(&slice[..]), vec![Value::Bool(true)]);
    }

    #[test]
    fn test_param_shape() {
        let d = Decimal::parse("-123.45").unwrap();
        let shape = param_shape(&Value::Decimal(d));
        assert_eq!((shape.sql_type, shape.column_size, shape.decimal_digits), (SqlType::DECIMAL, 5, 2));

        let d = Decimal::parse("0.005").unwrap();
        assert_eq!(param_shape(&Value::Decimal(d)).column_size, 3);

        let shape = param_shape(&Value::Text("héllo".into()));
        assert_eq!((shape.c_type, shape.column_size), (CType::WCHAR, 5));
        assert_eq!(param_shape(&Value::Text(String::new())).column_size, 1);
        assert_eq!(param_shape(&Value::U64(1)).c_type, CType::UBIGINT);
    }
}
