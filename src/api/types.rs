//! Common types of the native call-level interface.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Opaque reference to a native resource (environment, connection or statement).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RawHandle(pub usize);

impl RawHandle {
    /// The null handle.
    pub const NULL: RawHandle = RawHandle(0);

    /// Returns true if this is the null handle.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for RawHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Kind of a native handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum HandleType {
    /// Environment handle
    Env = 1,
    /// Connection handle
    Dbc = 2,
    /// Statement handle
    Stmt = 3,
}

impl std::fmt::Display for HandleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HandleType::Env => "environment",
            HandleType::Dbc => "connection",
            HandleType::Stmt => "statement",
        };
        f.write_str(name)
    }
}

/// Return code of a native call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SqlReturn(pub i16);

impl SqlReturn {
    pub const SUCCESS: SqlReturn = SqlReturn(0);
    pub const SUCCESS_WITH_INFO: SqlReturn = SqlReturn(1);
    pub const STILL_EXECUTING: SqlReturn = SqlReturn(2);
    pub const NEED_DATA: SqlReturn = SqlReturn(99);
    pub const NO_DATA: SqlReturn = SqlReturn(100);
    pub const ERROR: SqlReturn = SqlReturn(-1);
    pub const INVALID_HANDLE: SqlReturn = SqlReturn(-2);

    /// Returns true for `SUCCESS` and `SUCCESS_WITH_INFO`.
    pub fn is_success(self) -> bool {
        matches!(self, SqlReturn::SUCCESS | SqlReturn::SUCCESS_WITH_INFO)
    }
}

impl std::fmt::Display for SqlReturn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            SqlReturn::SUCCESS => f.write_str("SQL_SUCCESS"),
            SqlReturn::SUCCESS_WITH_INFO => f.write_str("SQL_SUCCESS_WITH_INFO"),
            SqlReturn::STILL_EXECUTING => f.write_str("SQL_STILL_EXECUTING"),
            SqlReturn::NEED_DATA => f.write_str("SQL_NEED_DATA"),
            SqlReturn::NO_DATA => f.write_str("SQL_NO_DATA"),
            SqlReturn::ERROR => f.write_str("SQL_ERROR"),
            SqlReturn::INVALID_HANDLE => f.write_str("SQL_INVALID_HANDLE"),
            SqlReturn(other) => write!(f, "return code {}", other),
        }
    }
}

/// Length/indicator value marking a NULL column or parameter.
pub const NULL_DATA: isize = -1;

/// Length/indicator value returned when the remaining length is unknown.
pub const NO_TOTAL: isize = -4;

/// Native SQL data type code.
///
/// Codes outside the known set are representable; [`SqlType::name`] returns
/// an empty string for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SqlType(pub i16);

impl SqlType {
    pub const UNKNOWN: SqlType = SqlType(0);
    pub const CHAR: SqlType = SqlType(1);
    pub const NUMERIC: SqlType = SqlType(2);
    pub const DECIMAL: SqlType = SqlType(3);
    pub const INTEGER: SqlType = SqlType(4);
    pub const SMALLINT: SqlType = SqlType(5);
    pub const FLOAT: SqlType = SqlType(6);
    pub const REAL: SqlType = SqlType(7);
    pub const DOUBLE: SqlType = SqlType(8);
    pub const DATE: SqlType = SqlType(9);
    pub const TIME: SqlType = SqlType(10);
    pub const TIMESTAMP: SqlType = SqlType(11);
    pub const VARCHAR: SqlType = SqlType(12);
    pub const TYPE_DATE: SqlType = SqlType(91);
    pub const TYPE_TIME: SqlType = SqlType(92);
    pub const TYPE_TIMESTAMP: SqlType = SqlType(93);
    pub const LONGVARCHAR: SqlType = SqlType(-1);
    pub const BINARY: SqlType = SqlType(-2);
    pub const VARBINARY: SqlType = SqlType(-3);
    pub const LONGVARBINARY: SqlType = SqlType(-4);
    pub const BIGINT: SqlType = SqlType(-5);
    pub const TINYINT: SqlType = SqlType(-6);
    pub const BIT: SqlType = SqlType(-7);
    pub const WCHAR: SqlType = SqlType(-8);
    pub const WVARCHAR: SqlType = SqlType(-9);
    pub const WLONGVARCHAR: SqlType = SqlType(-10);
    pub const GUID: SqlType = SqlType(-11);

    /// Database type name of this code, or `""` for an unrecognized code.
    pub fn name(self) -> &'static str {
        match self {
            SqlType::CHAR => "CHAR",
            SqlType::NUMERIC => "NUMERIC",
            SqlType::DECIMAL => "DECIMAL",
            SqlType::INTEGER => "INTEGER",
            SqlType::SMALLINT => "SMALLINT",
            SqlType::FLOAT => "FLOAT",
            SqlType::REAL => "REAL",
            SqlType::DOUBLE => "DOUBLE",
            SqlType::DATE | SqlType::TYPE_DATE => "DATE",
            SqlType::TIME | SqlType::TYPE_TIME => "TIME",
            SqlType::TIMESTAMP | SqlType::TYPE_TIMESTAMP => "TIMESTAMP",
            SqlType::VARCHAR => "VARCHAR",
            SqlType::LONGVARCHAR => "LONGVARCHAR",
            SqlType::BINARY => "BINARY",
            SqlType::VARBINARY => "VARBINARY",
            SqlType::LONGVARBINARY => "LONGVARBINARY",
            SqlType::BIGINT => "BIGINT",
            SqlType::TINYINT => "TINYINT",
            SqlType::BIT => "BIT",
            SqlType::WCHAR => "WCHAR",
            SqlType::WVARCHAR => "WVARCHAR",
            SqlType::WLONGVARCHAR => "WLONGVARCHAR",
            SqlType::GUID => "GUID",
            _ => "",
        }
    }
}

/// Native buffer representation requested when binding or retrieving data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CType(pub i16);

impl CType {
    pub const CHAR: CType = CType(1);
    pub const WCHAR: CType = CType(-8);
    pub const BINARY: CType = CType(-2);
    pub const BIT: CType = CType(-7);
    pub const STINYINT: CType = CType(-26);
    pub const UTINYINT: CType = CType(-28);
    pub const SSHORT: CType = CType(-15);
    pub const USHORT: CType = CType(-17);
    pub const SLONG: CType = CType(-16);
    pub const ULONG: CType = CType(-18);
    pub const SBIGINT: CType = CType(-25);
    pub const UBIGINT: CType = CType(-27);
    pub const FLOAT: CType = CType(7);
    pub const DOUBLE: CType = CType(8);
    pub const TYPE_DATE: CType = CType(91);
    pub const TYPE_TIME: CType = CType(92);
    pub const TYPE_TIMESTAMP: CType = CType(93);
    pub const GUID: CType = CType(-11);

    /// Byte width of a fixed-size representation, `None` for character and
    /// binary data.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            CType::BIT | CType::STINYINT | CType::UTINYINT => Some(1),
            CType::SSHORT | CType::USHORT => Some(2),
            CType::SLONG | CType::ULONG | CType::FLOAT => Some(4),
            CType::SBIGINT | CType::UBIGINT | CType::DOUBLE => Some(8),
            CType::TYPE_DATE => Some(size_of::<DateStruct>()),
            CType::TYPE_TIME => Some(size_of::<TimeStruct>()),
            CType::TYPE_TIMESTAMP => Some(size_of::<TimestampStruct>()),
            CType::GUID => Some(size_of::<GuidStruct>()),
            _ => None,
        }
    }

    /// Number of terminator bytes the driver appends to variable data.
    pub fn terminator_len(self) -> usize {
        match self {
            CType::CHAR => 1,
            CType::WCHAR => 2,
            _ => 0,
        }
    }
}

/// Column nullability as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Nullable {
    /// The column never contains NULL.
    No,
    /// The column may contain NULL.
    Yes,
    /// The driver cannot tell.
    #[default]
    Unknown,
}

impl Nullable {
    /// Create from the raw native nullability code.
    pub fn from_i16(value: i16) -> Self {
        match value {
            0 => Nullable::No,
            1 => Nullable::Yes,
            _ => Nullable::Unknown,
        }
    }

    /// `Some(nullable)` when known, `None` when unknown.
    pub fn known(self) -> Option<bool> {
        match self {
            Nullable::No => Some(false),
            Nullable::Yes => Some(true),
            Nullable::Unknown => None,
        }
    }
}

/// Raw column description as returned by the describe call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnDescription {
    pub name: String,
    pub data_type: SqlType,
    /// Declared column size (characters or bytes, precision for numerics); 0 if unknown.
    pub column_size: usize,
    pub decimal_digits: i16,
    pub nullable: Nullable,
}

impl Default for SqlType {
    fn default() -> Self {
        SqlType::UNKNOWN
    }
}

/// One diagnostic record attached to a handle after a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagRecord {
    /// Five-character SQLSTATE.
    pub state: String,
    /// Driver- or data-source-specific error code.
    pub native_error: i32,
    pub message: String,
}

impl DiagRecord {
    pub fn new(state: &str, native_error: i32, message: impl Into<String>) -> Self {
        Self {
            state: state.to_string(),
            native_error,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for DiagRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} (native error {})",
            self.state, self.message, self.native_error
        )
    }
}

/// Environment attributes set by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvAttr {
    OdbcVersion,
    ConnectionPooling,
    PoolMatch,
}

/// Connection attributes set by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectAttr {
    AutoCommit,
    LoginTimeout,
}

/// Transaction completion type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Commit,
    Rollback,
}

/// Attribute values used with [`EnvAttr`].
pub mod attr {
    pub const OV_ODBC3: usize = 3;
    pub const CP_OFF: usize = 0;
    pub const CP_ONE_PER_DRIVER: usize = 1;
    pub const CP_ONE_PER_HENV: usize = 2;
    pub const CP_STRICT_MATCH: usize = 0;
    pub const CP_RELAXED_MATCH: usize = 1;
    pub const AUTOCOMMIT_OFF: usize = 0;
    pub const AUTOCOMMIT_ON: usize = 1;
}

/// Native `DATE_STRUCT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct DateStruct {
    pub year: i16,
    pub month: u16,
    pub day: u16,
}

/// Native `TIME_STRUCT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct TimeStruct {
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
}

/// Native `TIMESTAMP_STRUCT`. `fraction` is in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct TimestampStruct {
    pub year: i16,
    pub month: u16,
    pub day: u16,
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
    pub fraction: u32,
}

/// Native `SQLGUID`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct GuidStruct {
    pub d1: u32,
    pub d2: u16,
    pub d3: u16,
    pub d4: [u8; 8],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_struct_sizes() {
        assert_eq!(size_of::<DateStruct>(), 6);
        assert_eq!(size_of::<TimeStruct>(), 6);
        assert_eq!(size_of::<TimestampStruct>(), 16);
        assert_eq!(size_of::<GuidStruct>(), 16);
    }

    #[test]
    fn test_unknown_type_name_is_empty() {
        assert_eq!(SqlType(1234).name(), "");
        assert_eq!(SqlType::WVARCHAR.name(), "WVARCHAR");
        assert_eq!(SqlType::TYPE_TIMESTAMP.name(), "TIMESTAMP");
    }

    #[test]
    fn test_nullable_known() {
        assert_eq!(Nullable::from_i16(0).known(), Some(false));
        assert_eq!(Nullable::from_i16(1).known(), Some(true));
        assert_eq!(Nullable::from_i16(2).known(), None);
    }
}
