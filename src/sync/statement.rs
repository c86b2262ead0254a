//! Statements and their execution.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::api::{Api, HandleType, RawHandle};
use crate::cancel::{CancelHandle, CloseFlag};
use crate::column::{Column, bind_columns, describe};
use crate::conversion::ChunkLimits;
use crate::diag::{ErrorClass, check};
use crate::error::{Error, Result};
use crate::handle::OwnedHandle;
use crate::handler::{CollectHandler, DropHandler, FirstRowHandler, RowHandler};
use crate::opts::Opts;
use crate::params::{ParamBuffers, ToParams, bind_params};
use crate::row::FromRow;

use super::env::Counters;
use super::rows::Rows;

/// A statement handle with its column and parameter buffers.
///
/// Created by [`Conn::prepare`](super::Conn::prepare). A statement runs one
/// result stream at a time: [`query`](Self::query) borrows it mutably until
/// the returned [`Rows`] is dropped.
pub struct Statement {
    pub(super) api: Arc<dyn Api>,
    pub(super) handle: Arc<OwnedHandle>,
    pub(super) columns: Vec<Column>,
    params: ParamBuffers,
    pub(super) flag: CloseFlag,
    /// Set once the statement is closed; closing its cursor then releases the handle.
    pub(super) closed: bool,
    pub(super) cursor_open: bool,
    /// SQL of a prepared statement, `None` for one-shot statements.
    sql: Option<String>,
    pub(super) limits: ChunkLimits,
    max_bind_width: usize,
    broken: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

impl Statement {
    /// Allocate a statement handle on a connection.
    pub(super) fn alloc(
        api: &Arc<dyn Api>,
        dbc: &Arc<OwnedHandle>,
        opts: &Opts,
        broken: &Arc<AtomicBool>,
        counters: &Arc<Counters>,
    ) -> Result<Self> {
        let handle = OwnedHandle::alloc(api, HandleType::Stmt, Some(dbc))?;
        counters.statement_opened();
        Ok(Self {
            api: Arc::clone(api),
            handle,
            columns: Vec::new(),
            params: ParamBuffers::default(),
            flag: CloseFlag::new(),
            closed: false,
            cursor_open: false,
            sql: None,
            limits: opts.chunk_limits(),
            max_bind_width: opts.max_bind_width,
            broken: Arc::clone(broken),
            counters: Arc::clone(counters),
        })
    }

    /// Prepare `sql` on this handle.
    pub(super) fn prepare(&mut self, sql: &str) -> Result<()> {
        let raw = self.handle.raw();
        let ret = self.api.prepare(raw, sql);
        let result = check(self.api(), HandleType::Stmt, raw, "SQLPrepare", ret, ErrorClass::Prepare);
        self.track(result)?;
        self.sql = Some(sql.to_string());
        tracing::debug!(handle = %raw, sql, "prepared statement");
        Ok(())
    }

    pub(super) fn api(&self) -> &dyn Api {
        self.api.as_ref()
    }

    pub(super) fn raw(&self) -> RawHandle {
        self.handle.raw()
    }

    /// Record connection-level failures on the owning connection.
    pub(super) fn track<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_connection_broken() {
                self.broken.store(true, Ordering::Release);
            }
        }
        result
    }

    /// Fail with [`Error::Cancelled`] once a background cancel has begun.
    pub(super) fn ensure_not_cancelled(&self) -> Result<()> {
        if self.flag.is_closing() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    fn ensure_usable(&self) -> Result<()> {
        self.ensure_not_cancelled()?;
        if self.closed || !self.handle.is_live() {
            return Err(Error::InvalidUsage("statement is closed".into()));
        }
        Ok(())
    }

    /// A handle that cancels this statement from another thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle::new(
            Arc::clone(&self.api),
            Arc::clone(&self.handle),
            self.flag.clone(),
        )
    }

    /// Returns true once a background cancel has begun.
    pub fn is_cancelled(&self) -> bool {
        self.flag.is_closing()
    }

    /// SQL this statement was prepared with.
    pub fn sql(&self) -> Option<&str> {
        self.sql.as_deref()
    }

    /// Execute the prepared statement and open a cursor on its results.
    pub fn query<P: ToParams>(&mut self, params: P) -> Result<Rows<'_>> {
        let sql = self
            .sql
            .clone()
            .ok_or_else(|| Error::InvalidUsage("statement is not prepared".into()))?;
        self.execute(&sql, &params, false)?;
        Ok(Rows::borrowed(self))
    }

    /// Execute with a handler.
    pub fn exec<P: ToParams, H: RowHandler>(&mut self, params: P, handler: &mut H) -> Result<()> {
        let mut rows = self.query(params)?;
        rows.drive(handler)?;
        rows.close()
    }

    /// Execute and discard results.
    pub fn exec_drop<P: ToParams>(&mut self, params: P) -> Result<Option<u64>> {
        let mut handler = DropHandler::new();
        self.exec(params, &mut handler)?;
        Ok(handler.rows_affected())
    }

    /// Execute and collect typed rows.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let mut stmt = conn.prepare("SELECT id, name FROM users WHERE id = ?")?;
    /// let rows: Vec<(i32, String)> = stmt.exec_collect((42,))?;
    /// ```
    pub fn exec_collect<T: FromRow, P: ToParams>(&mut self, params: P) -> Result<Vec<T>> {
        let mut handler = CollectHandler::<T>::new();
        self.exec(params, &mut handler)?;
        Ok(handler.into_rows())
    }

    /// Execute and return the first typed row.
    pub fn exec_first<T: FromRow, P: ToParams>(&mut self, params: P) -> Result<Option<T>> {
        let mut handler = FirstRowHandler::<T>::new();
        self.exec(params, &mut handler)?;
        Ok(handler.into_row())
    }

    /// Bind parameters, execute, then describe and bind the first result set.
    ///
    /// `direct` executes `sql` without a prior prepare. On failure the
    /// statement holds no columns and must be executed again.
    pub(super) fn execute<P: ToParams + ?Sized>(
        &mut self,
        sql: &str,
        params: &P,
        direct: bool,
    ) -> Result<()> {
        self.ensure_usable()?;
        let result = self.execute_inner(sql, params, direct);
        if result.is_err() {
            self.unbind();
        }
        self.track(result)
    }

    fn execute_inner<P: ToParams + ?Sized>(
        &mut self,
        sql: &str,
        params: &P,
        direct: bool,
    ) -> Result<()> {
        let raw = self.raw();
        self.reset()?;
        self.params = bind_params(self.api(), raw, params)?;

        let (function, ret) = if direct {
            ("SQLExecDirect", self.api.exec_direct(raw, sql))
        } else {
            ("SQLExecute", self.api.execute(raw))
        };
        // NO_DATA: a searched update or delete that matched nothing
        check(self.api(), HandleType::Stmt, raw, function, ret, ErrorClass::Execute)?;
        self.cursor_open = true;
        tracing::debug!(handle = %raw, sql, params = self.params.len(), "executed statement");

        self.bind_result_set()?;
        Ok(())
    }

    /// Describe the current result set and bind its columns. Returns the
    /// column count.
    pub(super) fn bind_result_set(&mut self) -> Result<usize> {
        let raw = self.raw();
        let descriptors = describe(self.api(), raw)?;
        self.columns = bind_columns(self.api(), raw, descriptors, self.max_bind_width)?;
        Ok(self.columns.len())
    }

    /// Release column bindings before their buffers are dropped.
    pub(super) fn unbind_columns(&mut self) -> Result<()> {
        if self.columns.iter().any(Column::is_bound) {
            let raw = self.raw();
            let ret = self.api.unbind_cols(raw);
            check(self.api(), HandleType::Stmt, raw, "SQLFreeStmt(SQL_UNBIND)", ret, ErrorClass::Bind)?;
        }
        self.columns.clear();
        Ok(())
    }

    /// Close the cursor, keeping the statement reusable.
    pub(super) fn close_cursor(&mut self) -> Result<()> {
        let raw = self.raw();
        let ret = self.api.close_cursor(raw);
        check(self.api(), HandleType::Stmt, raw, "SQLFreeStmt(SQL_CLOSE)", ret, ErrorClass::Close)?;
        self.cursor_open = false;
        Ok(())
    }

    /// Close any open cursor and drop bindings and parameters from the
    /// previous execution.
    fn reset(&mut self) -> Result<()> {
        if self.cursor_open {
            self.close_cursor()?;
        }
        self.unbind_columns()?;
        let raw = self.raw();
        if !self.params.is_empty() {
            let ret = self.api.reset_params(raw);
            check(
                self.api(),
                HandleType::Stmt,
                raw,
                "SQLFreeStmt(SQL_RESET_PARAMS)",
                ret,
                ErrorClass::Bind,
            )?;
            self.params = ParamBuffers::default();
        }
        Ok(())
    }

    /// Best-effort unbind after a failure; the original error wins.
    fn unbind(&mut self) {
        // on failure the buffers are kept, they must outlive the binding
        if let Err(e) = self.unbind_columns() {
            tracing::warn!(handle = %self.raw(), error = %e, "failed to unbind columns");
        }
    }

    /// Unbind and free the native handle, then the buffers it referenced.
    ///
    /// Does nothing once a background cancel has begun or the handle is
    /// already gone.
    pub(super) fn release(&mut self) -> Result<()> {
        self.closed = true;
        if self.flag.is_closing() || !self.handle.is_live() {
            return Ok(());
        }
        self.unbind();
        self.handle.release()?;
        self.cursor_open = false;
        self.columns.clear();
        self.params = ParamBuffers::default();
        Ok(())
    }

    /// Close the statement, releasing its handle.
    ///
    /// After a background cancel this performs no native calls: the
    /// canceller owns the handle.
    pub fn close(mut self) -> Result<()> {
        self.release()
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(handle = %self.handle.raw(), error = %e, "failed to close statement on drop");
        }
        self.counters.statement_closed();
    }
}

impl std::fmt::Debug for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("handle", &self.handle)
            .field("sql", &self.sql)
            .field("columns", &self.columns.len())
            .field("closed", &self.closed)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
