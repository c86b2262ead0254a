//! In-memory native interface driven by scripted result sets.
//!
//! `ScriptedApi` behaves like a driver manager with one fake driver: it hands
//! out handles, keeps diagnostic records per handle, fills bound buffers on
//! fetch, serves get-data in chunks, and returns the native codes a real
//! driver would (`SQL_NO_DATA`, `SQL_SUCCESS_WITH_INFO` on truncation,
//! `SQL_INVALID_HANDLE` for freed handles). Every call is logged so that
//! tests can count native operations.
//!
//! ```
//! use zero_odbc::api::{ScriptedApi, ScriptedColumn, ScriptedResult, SqlType};
//! use zero_odbc::Value;
//!
//! let api = ScriptedApi::new();
//! api.script(
//!     "SELECT id FROM t",
//!     vec![ScriptedResult::rows(
//!         vec![ScriptedColumn::new("id", SqlType::INTEGER, 10)],
//!         vec![vec![Value::I32(1)], vec![Value::I32(2)]],
//!     )],
//! );
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::conversion::{Value, ValueKind, convert_bound, decode_variable, encode_native};

use super::{
    Api, CType, ColumnDescription, Completion, ConnectAttr, DiagRecord, EnvAttr, HandleType,
    NO_TOTAL, NULL_DATA, Nullable, RawHandle, SqlReturn, SqlType,
};

/// A column of a scripted result set.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedColumn {
    pub name: String,
    pub sql_type: SqlType,
    pub size: usize,
    pub decimal_digits: i16,
    pub nullable: Nullable,
    pub unsigned: bool,
}

impl ScriptedColumn {
    pub fn new(name: impl Into<String>, sql_type: SqlType, size: usize) -> Self {
        Self {
            name: name.into(),
            sql_type,
            size,
            decimal_digits: 0,
            nullable: Nullable::Unknown,
            unsigned: false,
        }
    }

    pub fn nullable(mut self, nullable: Nullable) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn unsigned(mut self) -> Self {
        self.unsigned = true;
        self
    }

    pub fn decimal_digits(mut self, digits: i16) -> Self {
        self.decimal_digits = digits;
        self
    }
}

/// One scripted result set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScriptedResult {
    pub columns: Vec<ScriptedColumn>,
    pub rows: Vec<Vec<Value>>,
    /// Reported by the row-count call.
    pub rows_affected: isize,
}

impl ScriptedResult {
    /// A result set with rows.
    pub fn rows(columns: Vec<ScriptedColumn>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows,
            rows_affected: -1,
        }
    }

    /// A result without columns, as produced by INSERT/UPDATE/DELETE.
    pub fn affected(rows_affected: isize) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            rows_affected,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Binding {
    c_type: CType,
    buffer: usize,
    len: isize,
    indicator: usize,
}

#[derive(Debug, Default)]
struct StmtState {
    prepared: Option<String>,
    pending: VecDeque<ScriptedResult>,
    /// Result set the cursor is on; `None` when no cursor is open.
    current: Option<ScriptedResult>,
    /// Index of the current row, `Some(rows.len())` once past the end.
    row: Option<usize>,
    rows_affected: isize,
    columns: HashMap<u16, Binding>,
    params: HashMap<u16, Binding>,
    /// Bytes already returned by get-data, per column of the current row.
    retrieved: HashMap<u16, usize>,
    cancelled: bool,
}

#[derive(Debug)]
enum State {
    Env {
        attrs: Vec<(EnvAttr, usize)>,
    },
    Dbc {
        attrs: Vec<(ConnectAttr, usize)>,
        connected: bool,
    },
    Stmt(Box<StmtState>),
}

#[derive(Debug)]
struct Entry {
    parent: RawHandle,
    state: State,
}

#[derive(Debug, Default)]
struct Inner {
    next_handle: usize,
    handles: HashMap<RawHandle, Entry>,
    diags: HashMap<RawHandle, Vec<DiagRecord>>,
    calls: Vec<(&'static str, RawHandle)>,
    scripts: HashMap<String, Vec<ScriptedResult>>,
    failures: HashMap<&'static str, Vec<DiagRecord>>,
    connection_strings: Vec<String>,
    completions: Vec<Completion>,
    executions: Vec<(String, Vec<Value>)>,
    unknown_lengths: bool,
}

/// In-memory, call-counting implementation of [`Api`].
#[derive(Debug, Default)]
pub struct ScriptedApi {
    inner: Mutex<Inner>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serve `results` every time `sql` is executed.
    pub fn script(&self, sql: impl Into<String>, results: Vec<ScriptedResult>) {
        self.lock().scripts.insert(sql.into(), results);
    }

    /// Make the next call to `function` (e.g. `"SQLFetch"`) fail with `records`.
    pub fn fail_next(&self, function: &'static str, records: Vec<DiagRecord>) {
        self.lock().failures.insert(function, records);
    }

    /// Attach diagnostic records to a handle.
    pub fn push_diag(&self, handle: RawHandle, records: Vec<DiagRecord>) {
        self.lock().diags.entry(handle).or_default().extend(records);
    }

    /// Report `SQL_NO_TOTAL` instead of the remaining length on truncated get-data.
    pub fn report_unknown_lengths(&self, unknown: bool) {
        self.lock().unknown_lengths = unknown;
    }

    /// Number of calls to `function`.
    pub fn calls(&self, function: &str) -> usize {
        self.lock().calls.iter().filter(|(f, _)| *f == function).count()
    }

    /// Number of calls made on `handle`, of any function.
    pub fn calls_on(&self, handle: RawHandle) -> usize {
        self.lock().calls.iter().filter(|(_, h)| *h == handle).count()
    }

    pub fn total_calls(&self) -> usize {
        self.lock().calls.len()
    }

    /// Number of free calls issued for `handle`, successful or not.
    pub fn free_count(&self, handle: RawHandle) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|(f, h)| *f == "SQLFreeHandle" && *h == handle)
            .count()
    }

    /// Number of allocated, not yet freed handles.
    pub fn live_handles(&self) -> usize {
        self.lock().handles.len()
    }

    /// Live statement handles.
    pub fn live_statements(&self) -> Vec<RawHandle> {
        let inner = self.lock();
        let mut stmts: Vec<RawHandle> = inner
            .handles
            .iter()
            .filter(|(_, e)| matches!(e.state, State::Stmt(_)))
            .map(|(h, _)| *h)
            .collect();
        stmts.sort_by_key(|h| h.0);
        stmts
    }

    /// Last value set for an environment attribute.
    pub fn env_attr(&self, env: RawHandle, attr: EnvAttr) -> Option<usize> {
        match &self.lock().handles.get(&env)?.state {
            State::Env { attrs } => attrs.iter().rev().find(|(a, _)| *a == attr).map(|(_, v)| *v),
            _ => None,
        }
    }

    /// Last value set for a connection attribute.
    pub fn connect_attr(&self, dbc: RawHandle, attr: ConnectAttr) -> Option<usize> {
        match &self.lock().handles.get(&dbc)?.state {
            State::Dbc { attrs, .. } => {
                attrs.iter().rev().find(|(a, _)| *a == attr).map(|(_, v)| *v)
            }
            _ => None,
        }
    }

    pub fn is_connected(&self, dbc: RawHandle) -> bool {
        matches!(
            self.lock().handles.get(&dbc).map(|e| &e.state),
            Some(State::Dbc { connected: true, .. })
        )
    }

    /// Connection strings passed to driver-connect, in order.
    pub fn connection_strings(&self) -> Vec<String> {
        self.lock().connection_strings.clone()
    }

    /// Transaction completions requested, in order.
    pub fn completions(&self) -> Vec<Completion> {
        self.lock().completions.clone()
    }

    /// Executed SQL with the parameter values bound at execution time.
    pub fn executions(&self) -> Vec<(String, Vec<Value>)> {
        self.lock().executions.clone()
    }
}

fn target_of(c_type: CType) -> ValueKind {
    match c_type {
        CType::BINARY => ValueKind::Bytes,
        _ => ValueKind::Text,
    }
}

impl Inner {
    /// Log the call and clear the handle's diagnostics. Returns the scripted
    /// failure for `function`, if any.
    fn enter(&mut self, function: &'static str, handle: RawHandle) -> Option<SqlReturn> {
        self.calls.push((function, handle));
        self.diags.remove(&handle);
        let records = self.failures.remove(function)?;
        self.diags.insert(handle, records);
        Some(SqlReturn::ERROR)
    }

    fn fail(&mut self, handle: RawHandle, state: &str, message: &str) -> SqlReturn {
        self.diags
            .entry(handle)
            .or_default()
            .push(DiagRecord::new(state, 0, message));
        SqlReturn::ERROR
    }

    fn info(&mut self, handle: RawHandle, state: &str, message: &str) -> SqlReturn {
        self.diags
            .entry(handle)
            .or_default()
            .push(DiagRecord::new(state, 0, message));
        SqlReturn::SUCCESS_WITH_INFO
    }

    fn stmt(&mut self, handle: RawHandle) -> Option<&mut StmtState> {
        match self.handles.get_mut(&handle) {
            Some(Entry {
                state: State::Stmt(s),
                ..
            }) => Some(&mut **s),
            _ => None,
        }
    }

    /// `Some(connected)` for a connection handle.
    fn dbc_connected(&self, handle: RawHandle) -> Option<bool> {
        match self.handles.get(&handle)?.state {
            State::Dbc { connected, .. } => Some(connected),
            _ => None,
        }
    }

    fn set_connected(&mut self, handle: RawHandle, value: bool) {
        if let Some(Entry {
            state: State::Dbc { connected, .. },
            ..
        }) = self.handles.get_mut(&handle)
        {
            *connected = value;
        }
    }

    fn start_results(&mut self, stmt: RawHandle, sql: &str) -> SqlReturn {
        let Some(results) = self.scripts.get(sql).cloned() else {
            return self.fail(stmt, "42S02", &format!("Invalid object name in {:?}", sql));
        };
        let Some(state) = self.stmt(stmt) else {
            return SqlReturn::INVALID_HANDLE;
        };
        if state.current.is_some() {
            return self.fail(stmt, "24000", "Invalid cursor state");
        }
        let params = match read_params(state) {
            Ok(params) => params,
            Err(e) => return self.fail(stmt, "HY105", &e.to_string()),
        };
        let Some(state) = self.stmt(stmt) else {
            return SqlReturn::INVALID_HANDLE;
        };
        state.pending = results.into();
        state.current = state.pending.pop_front();
        state.row = None;
        state.retrieved.clear();
        state.cancelled = false;
        state.rows_affected = state.current.as_ref().map_or(0, |r| r.rows_affected);
        self.executions.push((sql.to_string(), params));
        SqlReturn::SUCCESS
    }

    fn fill_bound(&mut self, stmt: RawHandle, row: &[Value]) -> SqlReturn {
        let Some(state) = self.stmt(stmt) else {
            return SqlReturn::INVALID_HANDLE;
        };
        let mut truncated = false;
        let mut failed = None;
        for (&column, binding) in &state.columns {
            let value = usize::from(column)
                .checked_sub(1)
                .and_then(|i| row.get(i))
                .cloned()
                .unwrap_or_default();
            match write_value(&value, binding) {
                Ok(t) => truncated |= t,
                Err(e) => failed = Some(e.to_string()),
            }
        }
        match failed {
            Some(message) => self.fail(stmt, "22018", &message),
            None if truncated => self.info(stmt, "01004", "String data, right truncated"),
            None => SqlReturn::SUCCESS,
        }
    }
}

/// Write `value` into a bound buffer. Returns true if the data was truncated.
fn write_value(value: &Value, binding: &Binding) -> crate::error::Result<bool> {
    let indicator = binding.indicator as *mut isize;
    if value.is_null() {
        // SAFETY: guaranteed valid by the bind_col contract
        unsafe { indicator.write(NULL_DATA) };
        return Ok(false);
    }
    let mut bytes = Vec::new();
    encode_native(value, binding.c_type, &mut bytes)?;
    let buffer_len = usize::try_from(binding.len).unwrap_or(0);
    let terminator = binding.c_type.terminator_len();
    let capacity = buffer_len.saturating_sub(terminator);
    let n = bytes.len().min(capacity);
    // SAFETY: guaranteed valid by the bind_col contract; n + terminator <= buffer_len
    unsafe {
        let buffer = binding.buffer as *mut u8;
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), buffer, n);
        if buffer_len >= n + terminator {
            std::ptr::write_bytes(buffer.add(n), 0, terminator);
        }
        indicator.write(bytes.len() as isize);
    }
    Ok(bytes.len() > capacity)
}

fn read_params(state: &StmtState) -> crate::error::Result<Vec<Value>> {
    let mut numbers: Vec<u16> = state.params.keys().copied().collect();
    numbers.sort_unstable();
    numbers
        .into_iter()
        .map(|n| {
            let binding = state.params[&n];
            // SAFETY: guaranteed valid by the bind_parameter contract
            let indicator = unsafe { (binding.indicator as *const isize).read() };
            if indicator == NULL_DATA {
                return Ok(Value::Null);
            }
            let len = usize::try_from(binding.len).unwrap_or(0);
            // SAFETY: guaranteed valid by the bind_parameter contract
            let bytes = unsafe { std::slice::from_raw_parts(binding.buffer as *const u8, len) };
            if binding.c_type.fixed_width().is_some() {
                convert_bound(binding.c_type, target_of(binding.c_type), bytes, indicator)
            } else {
                let len = usize::try_from(indicator).unwrap_or(0).min(bytes.len());
                decode_variable(binding.c_type, target_of(binding.c_type), &bytes[..len])
            }
        })
        .collect()
}

impl Api for ScriptedApi {
    fn alloc_handle(&self, kind: HandleType, parent: RawHandle, out: &mut RawHandle) -> SqlReturn {
        let mut inner = self.lock();
        if let Some(ret) = inner.enter("SQLAllocHandle", parent) {
            return ret;
        }
        let parent_state = inner.handles.get(&parent).map(|e| match e.state {
            State::Env { .. } => (HandleType::Env, false),
            State::Dbc { connected, .. } => (HandleType::Dbc, connected),
            State::Stmt(_) => (HandleType::Stmt, false),
        });
        let state = match (kind, parent_state) {
            (HandleType::Env, None) if parent.is_null() => State::Env { attrs: Vec::new() },
            (HandleType::Dbc, Some((HandleType::Env, _))) => State::Dbc {
                attrs: Vec::new(),
                connected: false,
            },
            (HandleType::Stmt, Some((HandleType::Dbc, true))) => State::Stmt(Box::default()),
            (HandleType::Stmt, Some((HandleType::Dbc, false))) => {
                return inner.fail(parent, "08003", "Connection not open");
            }
            _ => return SqlReturn::INVALID_HANDLE,
        };
        inner.next_handle += 1;
        // handles never collide with small integers used as fake handles in tests
        let raw = RawHandle(0x1000 + inner.next_handle);
        inner.handles.insert(raw, Entry { parent, state });
        *out = raw;
        SqlReturn::SUCCESS
    }

    fn free_handle(&self, kind: HandleType, handle: RawHandle) -> SqlReturn {
        let mut inner = self.lock();
        if let Some(ret) = inner.enter("SQLFreeHandle", handle) {
            return ret;
        }
        let Some(entry) = inner.handles.get(&handle) else {
            return SqlReturn::INVALID_HANDLE;
        };
        let kind_matches = matches!(
            (kind, &entry.state),
            (HandleType::Env, State::Env { .. })
                | (HandleType::Dbc, State::Dbc { .. })
                | (HandleType::Stmt, State::Stmt(_))
        );
        if !kind_matches {
            return SqlReturn::INVALID_HANDLE;
        }
        if matches!(entry.state, State::Dbc { connected: true, .. }) {
            return inner.fail(handle, "HY010", "Function sequence error: still connected");
        }
        if inner.handles.values().any(|e| e.parent == handle) {
            return inner.fail(handle, "HY010", "Function sequence error: child handles exist");
        }
        inner.handles.remove(&handle);
        inner.diags.remove(&handle);
        SqlReturn::SUCCESS
    }

    fn set_env_attr(&self, env: RawHandle, attr: EnvAttr, value: usize) -> SqlReturn {
        let mut inner = self.lock();
        if let Some(ret) = inner.enter("SQLSetEnvAttr", env) {
            return ret;
        }
        match inner.handles.get_mut(&env).map(|e| &mut e.state) {
            Some(State::Env { attrs }) => {
                attrs.push((attr, value));
                SqlReturn::SUCCESS
            }
            _ => SqlReturn::INVALID_HANDLE,
        }
    }

    fn set_connect_attr(&self, dbc: RawHandle, attr: ConnectAttr, value: usize) -> SqlReturn {
        let mut inner = self.lock();
        if let Some(ret) = inner.enter("SQLSetConnectAttr", dbc) {
            return ret;
        }
        match inner.handles.get_mut(&dbc).map(|e| &mut e.state) {
            Some(State::Dbc { attrs, .. }) => {
                attrs.push((attr, value));
                SqlReturn::SUCCESS
            }
            _ => SqlReturn::INVALID_HANDLE,
        }
    }

    fn driver_connect(&self, dbc: RawHandle, connection_string: &str) -> SqlReturn {
        let mut inner = self.lock();
        if let Some(ret) = inner.enter("SQLDriverConnect", dbc) {
            return ret;
        }
        match inner.dbc_connected(dbc) {
            Some(true) => inner.fail(dbc, "08002", "Connection name in use"),
            Some(false) => {
                inner.set_connected(dbc, true);
                inner.connection_strings.push(connection_string.to_string());
                SqlReturn::SUCCESS
            }
            None => SqlReturn::INVALID_HANDLE,
        }
    }

    fn disconnect(&self, dbc: RawHandle) -> SqlReturn {
        let mut inner = self.lock();
        if let Some(ret) = inner.enter("SQLDisconnect", dbc) {
            return ret;
        }
        match inner.dbc_connected(dbc) {
            Some(true) => {
                inner.set_connected(dbc, false);
                SqlReturn::SUCCESS
            }
            Some(false) => inner.fail(dbc, "08003", "Connection not open"),
            None => SqlReturn::INVALID_HANDLE,
        }
    }

    fn end_tran(&self, dbc: RawHandle, completion: Completion) -> SqlReturn {
        let mut inner = self.lock();
        if let Some(ret) = inner.enter("SQLEndTran", dbc) {
            return ret;
        }
        match inner.dbc_connected(dbc) {
            Some(true) => {
                inner.completions.push(completion);
                SqlReturn::SUCCESS
            }
            Some(false) => inner.fail(dbc, "08003", "Connection not open"),
            None => SqlReturn::INVALID_HANDLE,
        }
    }

    fn prepare(&self, stmt: RawHandle, sql: &str) -> SqlReturn {
        let mut inner = self.lock();
        if let Some(ret) = inner.enter("SQLPrepare", stmt) {
            return ret;
        }
        if inner.stmt(stmt).is_none() {
            return SqlReturn::INVALID_HANDLE;
        }
        if !inner.scripts.contains_key(sql) {
            return inner.fail(stmt, "42S02", &format!("Invalid object name in {:?}", sql));
        }
        if let Some(state) = inner.stmt(stmt) {
            state.prepared = Some(sql.to_string());
        }
        SqlReturn::SUCCESS
    }

    fn execute(&self, stmt: RawHandle) -> SqlReturn {
        let mut inner = self.lock();
        if let Some(ret) = inner.enter("SQLExecute", stmt) {
            return ret;
        }
        let Some(state) = inner.stmt(stmt) else {
            return SqlReturn::INVALID_HANDLE;
        };
        match state.prepared.clone() {
            Some(sql) => inner.start_results(stmt, &sql),
            None => inner.fail(stmt, "HY010", "Function sequence error: not prepared"),
        }
    }

    fn exec_direct(&self, stmt: RawHandle, sql: &str) -> SqlReturn {
        let mut inner = self.lock();
        if let Some(ret) = inner.enter("SQLExecDirect", stmt) {
            return ret;
        }
        inner.start_results(stmt, sql)
    }

    fn num_result_cols(&self, stmt: RawHandle, count: &mut i16) -> SqlReturn {
        let mut inner = self.lock();
        if let Some(ret) = inner.enter("SQLNumResultCols", stmt) {
            return ret;
        }
        let Some(state) = inner.stmt(stmt) else {
            return SqlReturn::INVALID_HANDLE;
        };
        *count = state.current.as_ref().map_or(0, |r| r.columns.len() as i16);
        SqlReturn::SUCCESS
    }

    fn describe_col(
        &self,
        stmt: RawHandle,
        column: u16,
        desc: &mut ColumnDescription,
    ) -> SqlReturn {
        let mut inner = self.lock();
        if let Some(ret) = inner.enter("SQLDescribeCol", stmt) {
            return ret;
        }
        let Some(state) = inner.stmt(stmt) else {
            return SqlReturn::INVALID_HANDLE;
        };
        let scripted = state
            .current
            .as_ref()
            .and_then(|r| r.columns.get(usize::from(column).wrapping_sub(1)))
            .cloned();
        match scripted {
            Some(c) => {
                *desc = ColumnDescription {
                    name: c.name,
                    data_type: c.sql_type,
                    column_size: c.size,
                    decimal_digits: c.decimal_digits,
                    nullable: c.nullable,
                };
                SqlReturn::SUCCESS
            }
            None => inner.fail(stmt, "07009", "Invalid descriptor index"),
        }
    }

    fn col_unsigned(&self, stmt: RawHandle, column: u16, unsigned: &mut bool) -> SqlReturn {
        let mut inner = self.lock();
        if let Some(ret) = inner.enter("SQLColAttribute", stmt) {
            return ret;
        }
        let Some(state) = inner.stmt(stmt) else {
            return SqlReturn::INVALID_HANDLE;
        };
        let scripted = state
            .current
            .as_ref()
            .and_then(|r| r.columns.get(usize::from(column).wrapping_sub(1)))
            .map(|c| c.unsigned);
        match scripted {
            Some(u) => {
                *unsigned = u;
                SqlReturn::SUCCESS
            }
            None => inner.fail(stmt, "07009", "Invalid descriptor index"),
        }
    }

    unsafe fn bind_col(
        &self,
        stmt: RawHandle,
        column: u16,
        target: CType,
        buffer: *mut u8,
        buffer_len: isize,
        indicator: *mut isize,
    ) -> SqlReturn {
        let mut inner = self.lock();
        if let Some(ret) = inner.enter("SQLBindCol", stmt) {
            return ret;
        }
        let Some(state) = inner.stmt(stmt) else {
            return SqlReturn::INVALID_HANDLE;
        };
        state.columns.insert(
            column,
            Binding {
                c_type: target,
                buffer: buffer as usize,
                len: buffer_len,
                indicator: indicator as usize,
            },
        );
        SqlReturn::SUCCESS
    }

    fn unbind_cols(&self, stmt: RawHandle) -> SqlReturn {
        let mut inner = self.lock();
        if let Some(ret) = inner.enter("SQLFreeStmt(SQL_UNBIND)", stmt) {
            return ret;
        }
        let Some(state) = inner.stmt(stmt) else {
            return SqlReturn::INVALID_HANDLE;
        };
        state.columns.clear();
        SqlReturn::SUCCESS
    }

    unsafe fn bind_parameter(
        &self,
        stmt: RawHandle,
        number: u16,
        value_type: CType,
        _parameter_type: SqlType,
        _column_size: usize,
        _decimal_digits: i16,
        buffer: *mut u8,
        buffer_len: isize,
        indicator: *mut isize,
    ) -> SqlReturn {
        let mut inner = self.lock();
        if let Some(ret) = inner.enter("SQLBindParameter", stmt) {
            return ret;
        }
        let Some(state) = inner.stmt(stmt) else {
            return SqlReturn::INVALID_HANDLE;
        };
        state.params.insert(
            number,
            Binding {
                c_type: value_type,
                buffer: buffer as usize,
                len: buffer_len,
                indicator: indicator as usize,
            },
        );
        SqlReturn::SUCCESS
    }

    fn reset_params(&self, stmt: RawHandle) -> SqlReturn {
        let mut inner = self.lock();
        if let Some(ret) = inner.enter("SQLFreeStmt(SQL_RESET_PARAMS)", stmt) {
            return ret;
        }
        let Some(state) = inner.stmt(stmt) else {
            return SqlReturn::INVALID_HANDLE;
        };
        state.params.clear();
        SqlReturn::SUCCESS
    }

    fn fetch(&self, stmt: RawHandle) -> SqlReturn {
        let mut inner = self.lock();
        if let Some(ret) = inner.enter("SQLFetch", stmt) {
            return ret;
        }
        let Some(state) = inner.stmt(stmt) else {
            return SqlReturn::INVALID_HANDLE;
        };
        if std::mem::take(&mut state.cancelled) {
            return inner.fail(stmt, "HY008", "Operation canceled");
        }
        let Some(result) = state.current.as_ref() else {
            return inner.fail(stmt, "24000", "Invalid cursor state");
        };
        let next = state.row.map_or(0, |r| r + 1).min(result.rows.len());
        state.row = Some(next);
        state.retrieved.clear();
        let Some(row) = result.rows.get(next).cloned() else {
            return SqlReturn::NO_DATA;
        };
        inner.fill_bound(stmt, &row)
    }

    fn get_data(
        &self,
        stmt: RawHandle,
        column: u16,
        target: CType,
        buffer: &mut [u8],
        indicator: &mut isize,
    ) -> SqlReturn {
        let mut inner = self.lock();
        if let Some(ret) = inner.enter("SQLGetData", stmt) {
            return ret;
        }
        let unknown_lengths = inner.unknown_lengths;
        let Some(state) = inner.stmt(stmt) else {
            return SqlReturn::INVALID_HANDLE;
        };
        let value = match (&state.current, state.row) {
            (Some(result), Some(row)) => result
                .rows
                .get(row)
                .and_then(|r| r.get(usize::from(column).wrapping_sub(1)))
                .cloned(),
            _ => None,
        };
        let Some(value) = value else {
            return inner.fail(stmt, "24000", "Invalid cursor state");
        };

        let mut bytes = Vec::new();
        if !value.is_null() {
            if let Err(e) = encode_native(&value, target, &mut bytes) {
                return inner.fail(stmt, "22018", &e.to_string());
            }
        }
        let offset = state.retrieved.get(&column).copied();
        if offset == Some(bytes.len()) {
            return SqlReturn::NO_DATA;
        }
        if value.is_null() {
            state.retrieved.insert(column, 0);
            *indicator = NULL_DATA;
            return SqlReturn::SUCCESS;
        }
        if target.fixed_width().is_some() {
            let n = bytes.len().min(buffer.len());
            buffer[..n].copy_from_slice(&bytes[..n]);
            state.retrieved.insert(column, bytes.len());
            *indicator = bytes.len() as isize;
            return SqlReturn::SUCCESS;
        }

        let offset = offset.unwrap_or(0);
        let remaining = bytes.len() - offset;
        let terminator = target.terminator_len();
        let capacity = buffer.len().saturating_sub(terminator);
        let n = remaining.min(capacity);
        buffer[..n].copy_from_slice(&bytes[offset..offset + n]);
        if buffer.len() >= n + terminator {
            buffer[n..n + terminator].fill(0);
        }
        state.retrieved.insert(column, offset + n);
        if n < remaining {
            *indicator = if unknown_lengths {
                NO_TOTAL
            } else {
                remaining as isize
            };
            inner.info(stmt, "01004", "String data, right truncated")
        } else {
            *indicator = remaining as isize;
            SqlReturn::SUCCESS
        }
    }

    fn more_results(&self, stmt: RawHandle) -> SqlReturn {
        let mut inner = self.lock();
        if let Some(ret) = inner.enter("SQLMoreResults", stmt) {
            return ret;
        }
        let Some(state) = inner.stmt(stmt) else {
            return SqlReturn::INVALID_HANDLE;
        };
        state.row = None;
        state.retrieved.clear();
        state.current = state.pending.pop_front();
        match &state.current {
            Some(result) => {
                state.rows_affected = result.rows_affected;
                SqlReturn::SUCCESS
            }
            None => SqlReturn::NO_DATA,
        }
    }

    fn row_count(&self, stmt: RawHandle, count: &mut isize) -> SqlReturn {
        let mut inner = self.lock();
        if let Some(ret) = inner.enter("SQLRowCount", stmt) {
            return ret;
        }
        let Some(state) = inner.stmt(stmt) else {
            return SqlReturn::INVALID_HANDLE;
        };
        *count = state.rows_affected;
        SqlReturn::SUCCESS
    }

    fn close_cursor(&self, stmt: RawHandle) -> SqlReturn {
        let mut inner = self.lock();
        if let Some(ret) = inner.enter("SQLFreeStmt(SQL_CLOSE)", stmt) {
            return ret;
        }
        let Some(state) = inner.stmt(stmt) else {
            return SqlReturn::INVALID_HANDLE;
        };
        state.current = None;
        state.pending.clear();
        state.row = None;
        state.retrieved.clear();
        SqlReturn::SUCCESS
    }

    fn cancel(&self, stmt: RawHandle) -> SqlReturn {
        let mut inner = self.lock();
        if let Some(ret) = inner.enter("SQLCancel", stmt) {
            return ret;
        }
        let Some(state) = inner.stmt(stmt) else {
            return SqlReturn::INVALID_HANDLE;
        };
        if state.current.is_some() {
            state.cancelled = true;
        }
        SqlReturn::SUCCESS
    }

    fn get_diag_rec(
        &self,
        _kind: HandleType,
        handle: RawHandle,
        record: i16,
    ) -> Option<DiagRecord> {
        let index = usize::try_from(record).ok()?.checked_sub(1)?;
        self.lock().diags.get(&handle)?.get(index).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected(api: &ScriptedApi) -> (RawHandle, RawHandle, RawHandle) {
        let (mut env, mut dbc, mut stmt) = (RawHandle::NULL, RawHandle::NULL, RawHandle::NULL);
        assert_eq!(api.alloc_handle(HandleType::Env, RawHandle::NULL, &mut env), SqlReturn::SUCCESS);
        assert_eq!(api.alloc_handle(HandleType::Dbc, env, &mut dbc), SqlReturn::SUCCESS);
        assert_eq!(api.driver_connect(dbc, "DSN=test"), SqlReturn::SUCCESS);
        assert_eq!(api.alloc_handle(HandleType::Stmt, dbc, &mut stmt), SqlReturn::SUCCESS);
        (env, dbc, stmt)
    }

    #[test]
    fn test_statement_needs_connection() {
        let api = ScriptedApi::new();
        let (mut env, mut dbc, mut stmt) = (RawHandle::NULL, RawHandle::NULL, RawHandle::NULL);
        api.alloc_handle(HandleType::Env, RawHandle::NULL, &mut env);
        api.alloc_handle(HandleType::Dbc, env, &mut dbc);
        assert_eq!(api.alloc_handle(HandleType::Stmt, dbc, &mut stmt), SqlReturn::ERROR);
        assert_eq!(api.get_diag_rec(HandleType::Dbc, dbc, 1).unwrap().state, "08003");
    }

    #[test]
    fn test_free_order_enforced() {
        let api = ScriptedApi::new();
        let (env, dbc, stmt) = connected(&api);
        assert_eq!(api.free_handle(HandleType::Dbc, dbc), SqlReturn::ERROR);
        assert_eq!(api.free_handle(HandleType::Stmt, stmt), SqlReturn::SUCCESS);
        assert_eq!(api.free_handle(HandleType::Stmt, stmt), SqlReturn::INVALID_HANDLE);
        assert_eq!(api.disconnect(dbc), SqlReturn::SUCCESS);
        assert_eq!(api.free_handle(HandleType::Dbc, dbc), SqlReturn::SUCCESS);
        assert_eq!(api.free_handle(HandleType::Env, env), SqlReturn::SUCCESS);
        assert_eq!(api.live_handles(), 0);
        assert_eq!(api.free_count(stmt), 2);
    }

    #[test]
    fn test_get_data_chunks() {
        let api = ScriptedApi::new();
        api.script(
            "SELECT doc",
            vec![ScriptedResult::rows(
                vec![ScriptedColumn::new("doc", SqlType::LONGVARCHAR, 0)],
                vec![vec![Value::Text("abcdefgh".into())]],
            )],
        );
        let (_, _, stmt) = connected(&api);
        assert_eq!(api.exec_direct(stmt, "SELECT doc"), SqlReturn::SUCCESS);
        assert_eq!(api.fetch(stmt), SqlReturn::SUCCESS);

        let mut buf = [0u8; 4];
        let mut ind = 0;
        assert_eq!(
            api.get_data(stmt, 1, CType::CHAR, &mut buf, &mut ind),
            SqlReturn::SUCCESS_WITH_INFO
        );
        assert_eq!((&buf[..3], ind), (&b"abc"[..], 8));
        assert_eq!(api.get_diag_rec(HandleType::Stmt, stmt, 1).unwrap().state, "01004");
        assert_eq!(
            api.get_data(stmt, 1, CType::CHAR, &mut buf, &mut ind),
            SqlReturn::SUCCESS_WITH_INFO
        );
        assert_eq!((&buf[..3], ind), (&b"def"[..], 5));
        assert_eq!(
            api.get_data(stmt, 1, CType::CHAR, &mut buf, &mut ind),
            SqlReturn::SUCCESS
        );
        assert_eq!((&buf[..2], ind), (&b"gh"[..], 2));
        assert_eq!(
            api.get_data(stmt, 1, CType::CHAR, &mut buf, &mut ind),
            SqlReturn::NO_DATA
        );
        assert_eq!(api.fetch(stmt), SqlReturn::NO_DATA);
        assert_eq!(api.fetch(stmt), SqlReturn::NO_DATA);
    }

    #[test]
    fn test_unknown_sql() {
        let api = ScriptedApi::new();
        let (_, _, stmt) = connected(&api);
        assert_eq!(api.exec_direct(stmt, "SELECT nope"), SqlReturn::ERROR);
        assert_eq!(api.get_diag_rec(HandleType::Stmt, stmt, 1).unwrap().state, "42S02");
        assert!(api.get_diag_rec(HandleType::Stmt, stmt, 2).is_none());
        // diagnostics are cleared by the next call on the handle
        api.close_cursor(stmt);
        assert!(api.get_diag_rec(HandleType::Stmt, stmt, 1).is_none());
    }

    #[test]
    fn test_fail_next() {
        let api = ScriptedApi::new();
        let (_, dbc, _) = connected(&api);
        api.fail_next("SQLEndTran", vec![DiagRecord::new("08S01", 10054, "link failure")]);
        assert_eq!(api.end_tran(dbc, Completion::Commit), SqlReturn::ERROR);
        assert_eq!(api.end_tran(dbc, Completion::Commit), SqlReturn::SUCCESS);
        assert_eq!(api.completions(), vec![Completion::Commit]);
        assert_eq!(api.calls("SQLEndTran"), 2);
    }
}
