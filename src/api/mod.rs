//! The native call-level interface consumed by the client.
//!
//! Every native call the client issues goes through [`Api`]. The client never
//! interprets return codes on its own: each call site hands the raw
//! [`SqlReturn`] to [`crate::diag::check`], which normalizes it into an
//! outcome or a translated error.
//!
//! Two implementations are provided:
//! - [`ScriptedApi`]: an in-memory interface driven by scripted result sets
//! - `OdbcApi` (feature `odbc`): the system ODBC driver manager

pub mod scripted;
pub mod types;

#[cfg(feature = "odbc")]
pub mod ffi;

pub use scripted::{ScriptedApi, ScriptedColumn, ScriptedResult};
pub use types::{
    CType, ColumnDescription, Completion, ConnectAttr, DateStruct, DiagRecord, EnvAttr, GuidStruct,
    HandleType, NO_TOTAL, NULL_DATA, Nullable, RawHandle, SqlReturn, SqlType, TimeStruct,
    TimestampStruct,
};

#[cfg(feature = "odbc")]
pub use ffi::OdbcApi;

/// Native handle-based call-level interface.
///
/// Method names follow the native calls they stand for. Output parameters are
/// written through `&mut` references and are only meaningful when the
/// returned code is a success.
pub trait Api: Send + Sync {
    /// Allocate a handle of `kind` under `parent` (`RawHandle::NULL` for environments).
    fn alloc_handle(&self, kind: HandleType, parent: RawHandle, out: &mut RawHandle) -> SqlReturn;

    /// Free a handle.
    fn free_handle(&self, kind: HandleType, handle: RawHandle) -> SqlReturn;

    fn set_env_attr(&self, env: RawHandle, attr: EnvAttr, value: usize) -> SqlReturn;

    fn set_connect_attr(&self, dbc: RawHandle, attr: ConnectAttr, value: usize) -> SqlReturn;

    /// Connect using a driver connection string without prompting.
    fn driver_connect(&self, dbc: RawHandle, connection_string: &str) -> SqlReturn;

    fn disconnect(&self, dbc: RawHandle) -> SqlReturn;

    /// Commit or roll back the transaction open on a connection.
    fn end_tran(&self, dbc: RawHandle, completion: Completion) -> SqlReturn;

    fn prepare(&self, stmt: RawHandle, sql: &str) -> SqlReturn;

    /// Execute a prepared statement. `NO_DATA` means a searched update or
    /// delete affected no rows and is not a failure.
    fn execute(&self, stmt: RawHandle) -> SqlReturn;

    fn exec_direct(&self, stmt: RawHandle, sql: &str) -> SqlReturn;

    fn num_result_cols(&self, stmt: RawHandle, count: &mut i16) -> SqlReturn;

    /// Describe a result column. Column numbers start at 1.
    fn describe_col(&self, stmt: RawHandle, column: u16, desc: &mut ColumnDescription)
    -> SqlReturn;

    /// Query the unsigned attribute of a numeric column.
    fn col_unsigned(&self, stmt: RawHandle, column: u16, unsigned: &mut bool) -> SqlReturn;

    /// Register an output buffer for a column. Re-binding a column replaces
    /// the previous association.
    ///
    /// # Safety
    ///
    /// `buffer` must be valid for writes of `buffer_len` bytes and
    /// `indicator` valid for writes of one `isize`, from this call until the
    /// column is unbound or the statement handle is freed.
    unsafe fn bind_col(
        &self,
        stmt: RawHandle,
        column: u16,
        target: CType,
        buffer: *mut u8,
        buffer_len: isize,
        indicator: *mut isize,
    ) -> SqlReturn;

    /// Release all column bindings of a statement.
    fn unbind_cols(&self, stmt: RawHandle) -> SqlReturn;

    /// Bind an input parameter. Parameter numbers start at 1.
    ///
    /// # Safety
    ///
    /// `buffer` must be valid for reads of `buffer_len` bytes and `indicator`
    /// valid for reads of one `isize`, until the parameters are reset or the
    /// statement handle is freed.
    #[allow(clippy::too_many_arguments)]
    unsafe fn bind_parameter(
        &self,
        stmt: RawHandle,
        number: u16,
        value_type: CType,
        parameter_type: SqlType,
        column_size: usize,
        decimal_digits: i16,
        buffer: *mut u8,
        buffer_len: isize,
        indicator: *mut isize,
    ) -> SqlReturn;

    /// Release all parameter bindings of a statement.
    fn reset_params(&self, stmt: RawHandle) -> SqlReturn;

    /// Advance to the next row, filling bound buffers. `NO_DATA` at the end.
    fn fetch(&self, stmt: RawHandle) -> SqlReturn;

    /// Retrieve (part of) a column of the current row into `buffer`.
    ///
    /// Repeated calls continue where the last one stopped. A truncated part
    /// returns `SUCCESS_WITH_INFO`; once everything has been retrieved the
    /// call returns `NO_DATA`.
    fn get_data(
        &self,
        stmt: RawHandle,
        column: u16,
        target: CType,
        buffer: &mut [u8],
        indicator: &mut isize,
    ) -> SqlReturn;

    /// Move to the next result set. `NO_DATA` when there is none.
    fn more_results(&self, stmt: RawHandle) -> SqlReturn;

    fn row_count(&self, stmt: RawHandle, count: &mut isize) -> SqlReturn;

    /// Close the open cursor (if any) and discard pending results. The
    /// statement stays allocated and can be executed again.
    fn close_cursor(&self, stmt: RawHandle) -> SqlReturn;

    /// Cancel processing on a statement. May be called from another thread.
    fn cancel(&self, stmt: RawHandle) -> SqlReturn;

    /// Read diagnostic record `record` (starting at 1) of a handle, `None`
    /// when no such record exists.
    fn get_diag_rec(&self, kind: HandleType, handle: RawHandle, record: i16)
    -> Option<DiagRecord>;
}
