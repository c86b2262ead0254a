//! Result column description and buffer binding.
//!
//! Every column of a result set is either *bound*, with an output buffer the
//! driver fills on each fetch, or *deferred*, retrieved with get-data calls
//! after the fetch. Fixed-width types and short character/binary data are
//! bound; long or unbounded data is deferred so that no buffer is sized for
//! the worst case.
//!
//! Drivers only guarantee get-data for columns after the last bound column,
//! so once one column is deferred every later column is deferred as well.

use crate::api::{Api, CType, ColumnDescription, HandleType, Nullable, RawHandle, SqlType};
use crate::conversion::{ChunkLimits, Value, ValueKind, convert_bound, read_deferred};
use crate::diag::{ErrorClass, check};
use crate::error::{Error, Result};

/// Description of one result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    /// 1-based position within the result set.
    pub ordinal: u16,
    pub sql_type: SqlType,
    /// Native representation the value is bound or retrieved as.
    pub c_type: CType,
    /// Kind of value the column converts to.
    pub target: ValueKind,
    /// Declared size: characters, bytes, or precision for numerics.
    pub column_size: usize,
    /// Scale for numerics.
    pub decimal_digits: i16,
    pub nullable: Nullable,
    pub unsigned: bool,
}

/// How a column's data reaches the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Bound to a buffer of `len` bytes.
    Bound { len: usize },
    /// Retrieved on demand after each fetch.
    Deferred,
}

fn is_integer(sql_type: SqlType) -> bool {
    matches!(
        sql_type,
        SqlType::TINYINT | SqlType::SMALLINT | SqlType::INTEGER | SqlType::BIGINT
    )
}

/// Conversion target and native representation for a SQL type.
pub fn native_mapping(sql_type: SqlType, unsigned: bool) -> (ValueKind, CType) {
    match (sql_type, unsigned) {
        (SqlType::BIT, _) => (ValueKind::Bool, CType::BIT),
        (SqlType::TINYINT, false) => (ValueKind::I8, CType::STINYINT),
        (SqlType::TINYINT, true) => (ValueKind::U8, CType::UTINYINT),
        (SqlType::SMALLINT, false) => (ValueKind::I16, CType::SSHORT),
        (SqlType::SMALLINT, true) => (ValueKind::U16, CType::USHORT),
        (SqlType::INTEGER, false) => (ValueKind::I32, CType::SLONG),
        (SqlType::INTEGER, true) => (ValueKind::U32, CType::ULONG),
        (SqlType::BIGINT, false) => (ValueKind::I64, CType::SBIGINT),
        (SqlType::BIGINT, true) => (ValueKind::U64, CType::UBIGINT),
        (SqlType::REAL, _) => (ValueKind::F32, CType::FLOAT),
        (SqlType::FLOAT | SqlType::DOUBLE, _) => (ValueKind::F64, CType::DOUBLE),
        (SqlType::DECIMAL | SqlType::NUMERIC, _) => (ValueKind::Decimal, CType::CHAR),
        (SqlType::DATE | SqlType::TYPE_DATE, _) => (ValueKind::Date, CType::TYPE_DATE),
        (SqlType::TIME | SqlType::TYPE_TIME, _) => (ValueKind::Time, CType::TYPE_TIME),
        (SqlType::TIMESTAMP | SqlType::TYPE_TIMESTAMP, _) => {
            (ValueKind::Timestamp, CType::TYPE_TIMESTAMP)
        }
        (SqlType::GUID, _) => (ValueKind::Text, CType::GUID),
        (SqlType::WCHAR | SqlType::WVARCHAR | SqlType::WLONGVARCHAR, _) => {
            (ValueKind::Text, CType::WCHAR)
        }
        (SqlType::BINARY | SqlType::VARBINARY | SqlType::LONGVARBINARY, _) => {
            (ValueKind::Bytes, CType::BINARY)
        }
        // CHAR, VARCHAR, LONGVARCHAR and unrecognized codes are read as text
        _ => (ValueKind::Text, CType::CHAR),
    }
}

impl ColumnDescriptor {
    /// Build a descriptor from a raw describe result.
    pub fn new(ordinal: u16, raw: ColumnDescription, unsigned: bool) -> Self {
        let (target, c_type) = native_mapping(raw.data_type, unsigned);
        Self {
            name: raw.name,
            ordinal,
            sql_type: raw.data_type,
            c_type,
            target,
            column_size: raw.column_size,
            decimal_digits: raw.decimal_digits,
            nullable: raw.nullable,
            unsigned,
        }
    }

    /// Binding strategy for this column given the widest buffer the client
    /// is willing to bind.
    pub fn binding(&self, max_bind_width: usize) -> Binding {
        if let Some(len) = self.c_type.fixed_width() {
            return Binding::Bound { len };
        }
        let size = self.column_size;
        let len = match self.sql_type {
            SqlType::LONGVARCHAR | SqlType::WLONGVARCHAR | SqlType::LONGVARBINARY => {
                return Binding::Deferred;
            }
            _ if size == 0 || size > max_bind_width => return Binding::Deferred,
            _ if self.sql_type.name().is_empty() => return Binding::Deferred,
            // sign, leading zero, decimal point and terminator
            SqlType::DECIMAL | SqlType::NUMERIC => size + 4,
            _ => match self.c_type {
                // up to four UTF-8 bytes per character
                CType::CHAR => size * 4 + 1,
                CType::WCHAR => (size + 1) * 2,
                _ => size,
            },
        };
        Binding::Bound { len }
    }

    /// Kind of value this column scans into.
    pub fn scan_type(&self) -> ValueKind {
        self.target
    }

    /// `Some(nullable)`, or `None` when the driver does not know.
    pub fn is_nullable(&self) -> Option<bool> {
        self.nullable.known()
    }

    /// Database type name, empty for an unrecognized type code.
    pub fn database_type_name(&self) -> &'static str {
        self.sql_type.name()
    }

    /// Declared length of variable-length character and binary columns.
    pub fn length(&self) -> Option<usize> {
        match self.c_type {
            CType::CHAR | CType::WCHAR | CType::BINARY if self.target != ValueKind::Decimal => {
                Some(self.column_size)
            }
            _ => None,
        }
    }

    /// Precision and scale of decimal columns.
    pub fn precision_scale(&self) -> Option<(usize, i16)> {
        match self.target {
            ValueKind::Decimal => Some((self.column_size, self.decimal_digits)),
            _ => None,
        }
    }
}

/// Describe the columns of the current result set.
///
/// Any failing call fails the whole describe step; no partial list is returned.
pub fn describe(api: &dyn Api, stmt: RawHandle) -> Result<Vec<ColumnDescriptor>> {
    let mut count: i16 = 0;
    let ret = api.num_result_cols(stmt, &mut count);
    check(api, HandleType::Stmt, stmt, "SQLNumResultCols", ret, ErrorClass::Describe)?;
    let count = u16::try_from(count)
        .map_err(|_| Error::Internal(format!("SQLNumResultCols returned {}", count)))?;

    let mut columns = Vec::with_capacity(count.into());
    for ordinal in 1..=count {
        let mut raw = ColumnDescription::default();
        let ret = api.describe_col(stmt, ordinal, &mut raw);
        check(api, HandleType::Stmt, stmt, "SQLDescribeCol", ret, ErrorClass::Describe)?;

        let mut unsigned = false;
        if is_integer(raw.data_type) {
            let ret = api.col_unsigned(stmt, ordinal, &mut unsigned);
            check(api, HandleType::Stmt, stmt, "SQLColAttribute", ret, ErrorClass::Describe)?;
        }
        columns.push(ColumnDescriptor::new(ordinal, raw, unsigned));
    }
    tracing::debug!(handle = %stmt, columns = columns.len(), "described result set");
    Ok(columns)
}

/// Heap buffer plus length/indicator registered with the driver.
///
/// Both allocations keep a stable address for the life of the value; the
/// driver writes into them during fetch, so they are only accessed through
/// raw pointers.
pub struct BoundBuffer {
    data: *mut u8,
    len: usize,
    indicator: *mut isize,
}

// SAFETY: the buffer exclusively owns its allocations. The driver only writes
// into them during calls made by the thread that owns the statement.
unsafe impl Send for BoundBuffer {}

impl BoundBuffer {
    pub fn new(len: usize) -> Self {
        let data = Box::into_raw(vec![0u8; len].into_boxed_slice()) as *mut u8;
        let indicator = Box::into_raw(Box::new(0isize));
        Self {
            data,
            len,
            indicator,
        }
    }

    /// A buffer holding `bytes` with `indicator`, for input parameters.
    pub(crate) fn filled(bytes: &[u8], indicator: isize) -> Self {
        let buffer = Self::new(bytes.len());
        // SAFETY: both allocations were just made with room for exactly this data
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), buffer.data, bytes.len());
            buffer.indicator.write(indicator);
        }
        buffer
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn data_ptr(&self) -> *mut u8 {
        self.data
    }

    pub(crate) fn indicator_ptr(&self) -> *mut isize {
        self.indicator
    }

    /// Contents written by the last fetch.
    pub fn data(&self) -> &[u8] {
        // SAFETY: `data` points to `len` initialized bytes owned by self
        unsafe { std::slice::from_raw_parts(self.data, self.len) }
    }

    pub fn indicator(&self) -> isize {
        // SAFETY: `indicator` points to an isize owned by self
        unsafe { self.indicator.read() }
    }
}

impl Drop for BoundBuffer {
    fn drop(&mut self) {
        // SAFETY: both pointers came from Box::into_raw in `new` and are freed once
        unsafe {
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                self.data, self.len,
            )));
            drop(Box::from_raw(self.indicator));
        }
    }
}

impl std::fmt::Debug for BoundBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundBuffer")
            .field("len", &self.len)
            .field("indicator", &self.indicator())
            .finish()
    }
}

/// A result column, bound or deferred.
#[derive(Debug)]
pub enum Column {
    Bound {
        desc: ColumnDescriptor,
        buffer: BoundBuffer,
    },
    Deferred {
        desc: ColumnDescriptor,
    },
}

impl Column {
    pub fn descriptor(&self) -> &ColumnDescriptor {
        match self {
            Column::Bound { desc, .. } | Column::Deferred { desc } => desc,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor().name
    }

    pub fn sql_type(&self) -> SqlType {
        self.descriptor().sql_type
    }

    pub fn target(&self) -> ValueKind {
        self.descriptor().target
    }

    pub fn nullable(&self) -> Option<bool> {
        self.descriptor().is_nullable()
    }

    pub fn is_bound(&self) -> bool {
        matches!(self, Column::Bound { .. })
    }

    /// Value of this column in the current row.
    ///
    /// Must be called after a successful fetch. Deferred columns can be read
    /// once per row, in ordinal order.
    pub fn value(&self, api: &dyn Api, stmt: RawHandle, limits: ChunkLimits) -> Result<Value> {
        match self {
            Column::Bound { desc, buffer } => {
                convert_bound(desc.c_type, desc.target, buffer.data(), buffer.indicator())
            }
            Column::Deferred { desc } => {
                read_deferred(api, stmt, desc.ordinal, desc.c_type, desc.target, limits)
            }
        }
    }
}

/// Bind output buffers for `descriptors`.
///
/// On failure every binding made so far is released before the error is
/// returned.
pub fn bind_columns(
    api: &dyn Api,
    stmt: RawHandle,
    descriptors: Vec<ColumnDescriptor>,
    max_bind_width: usize,
) -> Result<Vec<Column>> {
    let mut columns = Vec::with_capacity(descriptors.len());
    let mut bind = true;
    for desc in descriptors {
        let len = match desc.binding(max_bind_width) {
            Binding::Bound { len } if bind => len,
            _ => {
                bind = false;
                columns.push(Column::Deferred { desc });
                continue;
            }
        };
        let buffer = BoundBuffer::new(len);
        let buffer_len = isize::try_from(len)
            .map_err(|_| Error::Internal(format!("bind width {} too large", len)))?;
        // SAFETY: the buffer is stored in the returned column and outlives
        // the binding; the statement unbinds before dropping its columns.
        let ret = unsafe {
            api.bind_col(
                stmt,
                desc.ordinal,
                desc.c_type,
                buffer.data_ptr(),
                buffer_len,
                buffer.indicator_ptr(),
            )
        };
        if let Err(e) = check(api, HandleType::Stmt, stmt, "SQLBindCol", ret, ErrorClass::Bind) {
            api.unbind_cols(stmt);
            return Err(e);
        }
        columns.push(Column::Bound { desc, buffer });
    }
    tracing::debug!(
        handle = %stmt,
        bound = columns.iter().filter(|c| c.is_bound()).count(),
        deferred = columns.iter().filter(|c| !c.is_bound()).count(),
        "bound result columns"
    );
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(sql_type: SqlType, column_size: usize) -> ColumnDescriptor {
        ColumnDescriptor::new(
            1,
            ColumnDescription {
                name: "c".into(),
                data_type: sql_type,
                column_size,
                decimal_digits: 0,
                nullable: Nullable::Unknown,
            },
            false,
        )
    }

    #[test]
    fn test_binding_strategy() {
        assert_eq!(desc(SqlType::INTEGER, 10).binding(1024), Binding::Bound { len: 4 });
        assert_eq!(desc(SqlType::TYPE_TIMESTAMP, 0).binding(1024), Binding::Bound { len: 16 });
        assert_eq!(desc(SqlType::VARCHAR, 10).binding(1024), Binding::Bound { len: 41 });
        assert_eq!(desc(SqlType::WVARCHAR, 10).binding(1024), Binding::Bound { len: 22 });
        assert_eq!(desc(SqlType::VARBINARY, 16).binding(1024), Binding::Bound { len: 16 });
        assert_eq!(desc(SqlType::DECIMAL, 38).binding(1024), Binding::Bound { len: 42 });
        assert_eq!(desc(SqlType::NUMERIC, 3).binding(1024), Binding::Bound { len: 7 });

        assert_eq!(desc(SqlType::VARCHAR, 0).binding(1024), Binding::Deferred);
        assert_eq!(desc(SqlType::VARCHAR, 4000).binding(1024), Binding::Deferred);
        assert_eq!(desc(SqlType::LONGVARCHAR, 10).binding(1024), Binding::Deferred);
        assert_eq!(desc(SqlType::LONGVARBINARY, 10).binding(1024), Binding::Deferred);
        assert_eq!(desc(SqlType(-150), 10).binding(1024), Binding::Deferred);
    }

    #[test]
    fn test_unsigned_mapping() {
        assert_eq!(
            native_mapping(SqlType::BIGINT, true),
            (ValueKind::U64, CType::UBIGINT)
        );
        assert_eq!(
            native_mapping(SqlType::BIGINT, false),
            (ValueKind::I64, CType::SBIGINT)
        );
        assert_eq!(native_mapping(SqlType(-150), false), (ValueKind::Text, CType::CHAR));
    }

    #[test]
    fn test_introspection() {
        let d = desc(SqlType::DECIMAL, 18);
        assert_eq!(d.precision_scale(), Some((18, 0)));
        assert_eq!(d.length(), None);
        assert_eq!(d.database_type_name(), "DECIMAL");
        assert_eq!(d.is_nullable(), None);

        let d = desc(SqlType::VARCHAR, 50);
        assert_eq!(d.length(), Some(50));
        assert_eq!(d.precision_scale(), None);
        assert_eq!(desc(SqlType(-150), 1).database_type_name(), "");
    }

    #[test]
    fn test_bound_buffer() {
        let buffer = BoundBuffer::new(8);
        assert_eq!(buffer.len(), 8);
        assert_eq!(buffer.data(), &[0u8; 8]);
        // SAFETY: pointers are valid for the buffer's length
        unsafe {
            buffer.data_ptr().write(7);
            buffer.indicator_ptr().write(1);
        }
        assert_eq!(buffer.data()[0], 7);
        assert_eq!(buffer.indicator(), 1);
    }
}
