//! [`Api`] over the system ODBC driver manager.
//!
//! Text crosses the boundary as UTF-16 through the wide (`W`) entry points.

use std::ptr::null_mut;

use odbc_sys::{
    CDataType, CompletionType, ConnectionAttribute, Desc, DriverConnectOption,
    EnvironmentAttribute, FreeStmtOption, HDbc, HEnv, HStmt, Handle, Len, Nullability, ParamType,
    Pointer, SQLAllocHandle, SQLBindCol, SQLBindParameter, SQLCancel, SQLColAttributeW,
    SQLDescribeColW, SQLDisconnect, SQLDriverConnectW, SQLEndTran, SQLExecDirectW, SQLExecute,
    SQLFetch, SQLFreeHandle, SQLFreeStmt, SQLGetData, SQLGetDiagRecW, SQLMoreResults,
    SQLNumResultCols, SQLPrepareW, SQLRowCount, SQLSetConnectAttrW, SQLSetEnvAttr, SqlDataType,
    ULen,
};

use super::types::{
    CType, ColumnDescription, Completion, ConnectAttr, DiagRecord, EnvAttr, HandleType, Nullable,
    RawHandle, SqlReturn, SqlType,
};
use super::Api;

/// Initial capacity for column names, in UTF-16 units.
const NAME_CAPACITY: usize = 128;
/// Initial capacity for diagnostic messages, in UTF-16 units.
const MESSAGE_CAPACITY: usize = 512;

/// The system ODBC driver manager.
#[derive(Debug, Default, Clone, Copy)]
pub struct OdbcApi;

impl OdbcApi {
    pub fn new() -> Self {
        Self
    }
}

fn ret(code: odbc_sys::SqlReturn) -> SqlReturn {
    SqlReturn(code.0)
}

fn handle(raw: RawHandle) -> Handle {
    raw.0 as Handle
}

fn env(raw: RawHandle) -> HEnv {
    raw.0 as HEnv
}

fn dbc(raw: RawHandle) -> HDbc {
    raw.0 as HDbc
}

fn stmt(raw: RawHandle) -> HStmt {
    raw.0 as HStmt
}

fn handle_type(kind: HandleType) -> odbc_sys::HandleType {
    match kind {
        HandleType::Env => odbc_sys::HandleType::Env,
        HandleType::Dbc => odbc_sys::HandleType::Dbc,
        HandleType::Stmt => odbc_sys::HandleType::Stmt,
    }
}

fn c_type(target: CType) -> CDataType {
    match target {
        CType::WCHAR => CDataType::WChar,
        CType::BINARY => CDataType::Binary,
        CType::BIT => CDataType::Bit,
        CType::STINYINT => CDataType::STinyInt,
        CType::UTINYINT => CDataType::UTinyInt,
        CType::SSHORT => CDataType::SShort,
        CType::USHORT => CDataType::UShort,
        CType::SLONG => CDataType::SLong,
        CType::ULONG => CDataType::ULong,
        CType::SBIGINT => CDataType::SBigInt,
        CType::UBIGINT => CDataType::UBigInt,
        CType::FLOAT => CDataType::Float,
        CType::DOUBLE => CDataType::Double,
        CType::TYPE_DATE => CDataType::TypeDate,
        CType::TYPE_TIME => CDataType::TypeTime,
        CType::TYPE_TIMESTAMP => CDataType::TypeTimestamp,
        CType::GUID => CDataType::Guid,
        _ => CDataType::Char,
    }
}

fn wide(text: &str) -> Vec<u16> {
    text.encode_utf16().collect()
}

fn clamp_small_int(n: usize) -> i16 {
    i16::try_from(n).unwrap_or(i16::MAX)
}

fn clamp_integer(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

impl Api for OdbcApi {
    fn alloc_handle(&self, kind: HandleType, parent: RawHandle, out: &mut RawHandle) -> SqlReturn {
        let mut allocated: Handle = null_mut();
        // SAFETY: `parent` is null or a live handle of the parent kind
        let code = unsafe { SQLAllocHandle(handle_type(kind), handle(parent), &mut allocated) };
        *out = RawHandle(allocated as usize);
        ret(code)
    }

    fn free_handle(&self, kind: HandleType, raw: RawHandle) -> SqlReturn {
        // SAFETY: callers free each handle exactly once
        ret(unsafe { SQLFreeHandle(handle_type(kind), handle(raw)) })
    }

    fn set_env_attr(&self, raw: RawHandle, attr: EnvAttr, value: usize) -> SqlReturn {
        let attribute = match attr {
            EnvAttr::OdbcVersion => EnvironmentAttribute::OdbcVersion,
            EnvAttr::ConnectionPooling => EnvironmentAttribute::ConnectionPooling,
            EnvAttr::PoolMatch => EnvironmentAttribute::CpMatch,
        };
        // SAFETY: integer attributes are passed by value in the pointer argument
        ret(unsafe { SQLSetEnvAttr(env(raw), attribute, value as Pointer, 0) })
    }

    fn set_connect_attr(&self, raw: RawHandle, attr: ConnectAttr, value: usize) -> SqlReturn {
        let attribute = match attr {
            ConnectAttr::AutoCommit => ConnectionAttribute::AutoCommit,
            ConnectAttr::LoginTimeout => ConnectionAttribute::LoginTimeout,
        };
        // SAFETY: integer attributes are passed by value in the pointer argument
        ret(unsafe { SQLSetConnectAttrW(dbc(raw), attribute, value as Pointer, 0) })
    }

    fn driver_connect(&self, raw: RawHandle, connection_string: &str) -> SqlReturn {
        let text = wide(connection_string);
        // SAFETY: `text` outlives the call; no output buffer is requested
        let code = unsafe {
            SQLDriverConnectW(
                dbc(raw),
                null_mut(),
                text.as_ptr(),
                clamp_small_int(text.len()),
                null_mut(),
                0,
                null_mut(),
                DriverConnectOption::NoPrompt,
            )
        };
        ret(code)
    }

    fn disconnect(&self, raw: RawHandle) -> SqlReturn {
        // SAFETY: `raw` is a connected connection handle
        ret(unsafe { SQLDisconnect(dbc(raw)) })
    }

    fn end_tran(&self, raw: RawHandle, completion: Completion) -> SqlReturn {
        let completion = match completion {
            Completion::Commit => CompletionType::Commit,
            Completion::Rollback => CompletionType::Rollback,
        };
        // SAFETY: `raw` is a live connection handle
        ret(unsafe { SQLEndTran(odbc_sys::HandleType::Dbc, handle(raw), completion) })
    }

    fn prepare(&self, raw: RawHandle, sql: &str) -> SqlReturn {
        let text = wide(sql);
        // SAFETY: `text` outlives the call
        ret(unsafe { SQLPrepareW(stmt(raw), text.as_ptr(), clamp_integer(text.len())) })
    }

    fn execute(&self, raw: RawHandle) -> SqlReturn {
        // SAFETY: bound parameter buffers are kept alive by the statement
        ret(unsafe { SQLExecute(stmt(raw)) })
    }

    fn exec_direct(&self, raw: RawHandle, sql: &str) -> SqlReturn {
        let text = wide(sql);
        // SAFETY: `text` outlives the call; parameter buffers are kept alive by the statement
        ret(unsafe { SQLExecDirectW(stmt(raw), text.as_ptr(), clamp_integer(text.len())) })
    }

    fn num_result_cols(&self, raw: RawHandle, count: &mut i16) -> SqlReturn {
        // SAFETY: `count` is valid for writes
        ret(unsafe { SQLNumResultCols(stmt(raw), count) })
    }

    fn describe_col(
        &self,
        raw: RawHandle,
        column: u16,
        desc: &mut ColumnDescription,
    ) -> SqlReturn {
        let mut name = vec![0u16; NAME_CAPACITY];
        loop {
            let mut name_length: i16 = 0;
            let mut data_type = SqlDataType::UNKNOWN_TYPE;
            let mut column_size: ULen = 0;
            let mut decimal_digits: i16 = 0;
            let mut nullable = Nullability::UNKNOWN;
            // SAFETY: every output pointer refers to a live local
            let code = unsafe {
                SQLDescribeColW(
                    stmt(raw),
                    column,
                    name.as_mut_ptr(),
                    clamp_small_int(name.len()),
                    &mut name_length,
                    &mut data_type,
                    &mut column_size,
                    &mut decimal_digits,
                    &mut nullable,
                )
            };
            let code = ret(code);
            if !code.is_success() {
                return code;
            }
            let needed = usize::try_from(name_length).unwrap_or(0);
            if needed + 1 > name.len() {
                // name truncated, retry with room for the terminator
                name.resize(needed + 1, 0);
                continue;
            }
            desc.name = String::from_utf16_lossy(&name[..needed]);
            desc.data_type = SqlType(data_type.0);
            desc.column_size = column_size;
            desc.decimal_digits = decimal_digits;
            desc.nullable = Nullable::from_i16(nullable.0);
            return code;
        }
    }

    fn col_unsigned(&self, raw: RawHandle, column: u16, unsigned: &mut bool) -> SqlReturn {
        let mut out: Len = 0;
        // SAFETY: numeric attribute; only `out` is written
        let code = unsafe {
            SQLColAttributeW(
                stmt(raw),
                column,
                Desc::Unsigned,
                null_mut(),
                0,
                null_mut(),
                &mut out,
            )
        };
        *unsigned = out != 0;
        ret(code)
    }

    unsafe fn bind_col(
        &self,
        raw: RawHandle,
        column: u16,
        target: CType,
        buffer: *mut u8,
        buffer_len: isize,
        indicator: *mut isize,
    ) -> SqlReturn {
        // SAFETY: the caller keeps `buffer` and `indicator` alive while bound
        let code = unsafe {
            SQLBindCol(
                stmt(raw),
                column,
                c_type(target),
                buffer as Pointer,
                buffer_len,
                indicator,
            )
        };
        ret(code)
    }

    fn unbind_cols(&self, raw: RawHandle) -> SqlReturn {
        // SAFETY: `raw` is a live statement handle
        ret(unsafe { SQLFreeStmt(stmt(raw), FreeStmtOption::Unbind) })
    }

    unsafe fn bind_parameter(
        &self,
        raw: RawHandle,
        number: u16,
        value_type: CType,
        parameter_type: SqlType,
        column_size: usize,
        decimal_digits: i16,
        buffer: *mut u8,
        buffer_len: isize,
        indicator: *mut isize,
    ) -> SqlReturn {
        // SAFETY: the caller keeps `buffer` and `indicator` alive while bound;
        // input parameters are only read by the driver
        let code = unsafe {
            SQLBindParameter(
                stmt(raw),
                number,
                ParamType::Input,
                c_type(value_type),
                SqlDataType(parameter_type.0),
                column_size,
                decimal_digits,
                buffer as Pointer,
                buffer_len,
                indicator,
            )
        };
        ret(code)
    }

    fn reset_params(&self, raw: RawHandle) -> SqlReturn {
        // SAFETY: `raw` is a live statement handle
        ret(unsafe { SQLFreeStmt(stmt(raw), FreeStmtOption::ResetParams) })
    }

    fn fetch(&self, raw: RawHandle) -> SqlReturn {
        // SAFETY: bound column buffers are kept alive by the statement
        ret(unsafe { SQLFetch(stmt(raw)) })
    }

    fn get_data(
        &self,
        raw: RawHandle,
        column: u16,
        target: CType,
        buffer: &mut [u8],
        indicator: &mut isize,
    ) -> SqlReturn {
        let buffer_len = isize::try_from(buffer.len()).unwrap_or(isize::MAX);
        // SAFETY: `buffer` is valid for `buffer_len` bytes for the duration of the call
        let code = unsafe {
            SQLGetData(
                stmt(raw),
                column,
                c_type(target),
                buffer.as_mut_ptr() as Pointer,
                buffer_len,
                indicator,
            )
        };
        ret(code)
    }

    fn more_results(&self, raw: RawHandle) -> SqlReturn {
        // SAFETY: `raw` is a live statement handle
        ret(unsafe { SQLMoreResults(stmt(raw)) })
    }

    fn row_count(&self, raw: RawHandle, count: &mut isize) -> SqlReturn {
        // SAFETY: `count` is valid for writes
        ret(unsafe { SQLRowCount(stmt(raw), count) })
    }

    fn close_cursor(&self, raw: RawHandle) -> SqlReturn {
        // SAFETY: closing without an open cursor is allowed with SQL_CLOSE
        ret(unsafe { SQLFreeStmt(stmt(raw), FreeStmtOption::Close) })
    }

    fn cancel(&self, raw: RawHandle) -> SqlReturn {
        // SAFETY: SQLCancel may be called from any thread on a live handle
        ret(unsafe { SQLCancel(stmt(raw)) })
    }

    fn get_diag_rec(&self, kind: HandleType, raw: RawHandle, record: i16) -> Option<DiagRecord> {
        let mut state = [0u16; 6];
        let mut message = vec![0u16; MESSAGE_CAPACITY];
        loop {
            let mut native_error: i32 = 0;
            let mut text_length: i16 = 0;
            // SAFETY: `state` holds five characters plus terminator, `message`
            // is valid for its length
            let code = unsafe {
                SQLGetDiagRecW(
                    handle_type(kind),
                    handle(raw),
                    record,
                    state.as_mut_ptr(),
                    &mut native_error,
                    message.as_mut_ptr(),
                    clamp_small_int(message.len()),
                    &mut text_length,
                )
            };
            if !ret(code).is_success() {
                return None;
            }
            let needed = usize::try_from(text_length).unwrap_or(0);
            if needed + 1 > message.len() && message.len() < i16::MAX as usize {
                message.resize(needed + 1, 0);
                continue;
            }
            let needed = needed.min(message.len());
            return Some(DiagRecord {
                state: String::from_utf16_lossy(&state[..5]),
                native_error,
                message: String::from_utf16_lossy(&message[..needed]),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_c_type_mapping() {
        assert_eq!(c_type(CType::WCHAR) as i16, CType::WCHAR.0);
        assert_eq!(c_type(CType::SBIGINT) as i16, CType::SBIGINT.0);
        assert_eq!(c_type(CType::TYPE_TIMESTAMP) as i16, CType::TYPE_TIMESTAMP.0);
        assert_eq!(c_type(CType::GUID) as i16, CType::GUID.0);
    }

    #[test]
    fn test_handle_round_trip() {
        let raw = RawHandle(0x1000);
        assert_eq!(RawHandle(stmt(raw) as usize), raw);
        assert!(handle(RawHandle::NULL).is_null());
    }
}
