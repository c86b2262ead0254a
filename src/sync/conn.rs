//! Synchronous ODBC connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::api::types::attr;
use crate::api::{Api, Completion, ConnectAttr, HandleType};
use crate::diag::{ErrorClass, check};
use crate::error::{Error, Result};
use crate::handle::OwnedHandle;
use crate::handler::{CollectHandler, DropHandler, FirstRowHandler, RowHandler};
use crate::opts::Opts;
use crate::params::ToParams;
use crate::row::FromRow;

use super::env::Env;
use super::rows::Rows;
use super::statement::Statement;
use super::transaction::Transaction;

/// Synchronous ODBC connection.
pub struct Conn {
    env: Env,
    handle: Arc<OwnedHandle>,
    opts: Opts,
    autocommit: bool,
    in_transaction: bool,
    is_broken: Arc<AtomicBool>,
}

impl Conn {
    /// Connect to a data source.
    ///
    /// `opts` is anything convertible to [`Opts`]: an `odbc://` URL, a raw
    /// connection string, or `Opts` itself.
    pub fn new<O: TryInto<Opts>>(env: &Env, opts: O) -> Result<Self>
    where
        Error: From<O::Error>,
    {
        let opts = opts.try_into()?;
        let api = env.api();
        let handle = OwnedHandle::alloc(api, HandleType::Dbc, Some(env.handle()))?;
        let raw = handle.raw();

        if let Some(timeout) = opts.login_timeout {
            let ret = api.set_connect_attr(raw, ConnectAttr::LoginTimeout, timeout as usize);
            check(
                api.as_ref(),
                HandleType::Dbc,
                raw,
                "SQLSetConnectAttr(SQL_ATTR_LOGIN_TIMEOUT)",
                ret,
                ErrorClass::AttributeSet,
            )?;
        }

        let ret = api.driver_connect(raw, &opts.connection_string);
        check(api.as_ref(), HandleType::Dbc, raw, "SQLDriverConnect", ret, ErrorClass::Connect)?;
        handle.set_connected(true);
        tracing::debug!(handle = %raw, "connected");

        env.counters().connection_opened();
        let mut conn = Self {
            env: env.clone(),
            handle,
            autocommit: true,
            in_transaction: false,
            is_broken: Arc::new(AtomicBool::new(false)),
            opts,
        };
        if !conn.opts.autocommit {
            conn.set_autocommit(false)?;
        }
        Ok(conn)
    }

    fn api(&self) -> &dyn Api {
        self.env.api().as_ref()
    }

    /// Identifier of this connection, stable for its lifetime.
    pub fn connection_id(&self) -> usize {
        self.handle.raw().0
    }

    pub fn opts(&self) -> &Opts {
        &self.opts
    }

    /// Check if the connection is broken.
    pub fn is_broken(&self) -> bool {
        self.is_broken.load(Ordering::Acquire)
    }

    /// Check if currently in a transaction started by [`run_transaction`](Self::run_transaction).
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub fn autocommit(&self) -> bool {
        self.autocommit
    }

    fn track<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_connection_broken() {
                self.is_broken.store(true, Ordering::Release);
            }
        }
        result
    }

    fn new_statement(&self) -> Result<Statement> {
        let result = Statement::alloc(
            self.env.api(),
            &self.handle,
            &self.opts,
            &self.is_broken,
            self.env.counters(),
        );
        self.track(result)
    }

    /// Switch autocommit on or off.
    pub fn set_autocommit(&mut self, on: bool) -> Result<()> {
        let raw = self.handle.raw();
        let value = if on {
            attr::AUTOCOMMIT_ON
        } else {
            attr::AUTOCOMMIT_OFF
        };
        let ret = self.api().set_connect_attr(raw, ConnectAttr::AutoCommit, value);
        let result = check(
            self.api(),
            HandleType::Dbc,
            raw,
            "SQLSetConnectAttr(SQL_ATTR_AUTOCOMMIT)",
            ret,
            ErrorClass::AttributeSet,
        );
        self.track(result)?;
        self.autocommit = on;
        Ok(())
    }

    fn end_tran(&mut self, completion: Completion) -> Result<()> {
        let raw = self.handle.raw();
        let ret = self.api().end_tran(raw, completion);
        let result = check(self.api(), HandleType::Dbc, raw, "SQLEndTran", ret, ErrorClass::Transaction);
        self.in_transaction = false;
        self.track(result)?;
        tracing::debug!(handle = %raw, ?completion, "transaction ended");
        Ok(())
    }

    /// Commit the open transaction.
    pub fn commit(&mut self) -> Result<()> {
        self.end_tran(Completion::Commit)
    }

    /// Roll back the open transaction.
    pub fn rollback(&mut self) -> Result<()> {
        self.end_tran(Completion::Rollback)
    }

    /// Prepare a statement.
    pub fn prepare(&mut self, sql: &str) -> Result<Statement> {
        let mut stmt = self.new_statement()?;
        // a failed prepare drops the statement, releasing its handle
        stmt.prepare(sql)?;
        Ok(stmt)
    }

    /// Execute `sql` directly and return a cursor that owns its statement.
    ///
    /// Closing the cursor releases the statement handle.
    pub fn query_rows(&mut self, sql: &str) -> Result<Rows<'static>> {
        self.exec_rows(sql, ())
    }

    /// Execute `sql` directly with parameters and return a cursor that owns
    /// its statement.
    pub fn exec_rows<P: ToParams>(&mut self, sql: &str, params: P) -> Result<Rows<'static>> {
        let mut stmt = self.new_statement()?;
        stmt.execute(sql, &params, true)?;
        stmt.closed = true;
        Ok(Rows::owned(stmt))
    }

    /// Execute a query with a handler.
    pub fn query<H: RowHandler>(&mut self, sql: &str, handler: &mut H) -> Result<()> {
        let mut rows = self.query_rows(sql)?;
        rows.drive(handler)?;
        rows.close()
    }

    /// Execute a query and discard results.
    pub fn query_drop(&mut self, sql: &str) -> Result<Option<u64>> {
        let mut handler = DropHandler::new();
        self.query(sql, &mut handler)?;
        Ok(handler.rows_affected())
    }

    /// Execute a query and collect typed rows.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let rows: Vec<(i32, String)> = conn.query_collect("SELECT id, name FROM users")?;
    /// for (id, name) in rows {
    ///     println!("{}: {}", id, name);
    /// }
    /// ```
    pub fn query_collect<T: FromRow>(&mut self, sql: &str) -> Result<Vec<T>> {
        let mut handler = CollectHandler::<T>::new();
        self.query(sql, &mut handler)?;
        Ok(handler.into_rows())
    }

    /// Execute a query and return the first typed row.
    pub fn query_first<T: FromRow>(&mut self, sql: &str) -> Result<Option<T>> {
        let mut handler = FirstRowHandler::<T>::new();
        self.query(sql, &mut handler)?;
        Ok(handler.into_row())
    }

    /// Execute a statement with parameters with a handler, without preparing it.
    pub fn exec<P: ToParams, H: RowHandler>(
        &mut self,
        sql: &str,
        params: P,
        handler: &mut H,
    ) -> Result<()> {
        let mut rows = self.exec_rows(sql, params)?;
        rows.drive(handler)?;
        rows.close()
    }

    /// Execute a statement with parameters and discard results.
    pub fn exec_drop<P: ToParams>(&mut self, sql: &str, params: P) -> Result<Option<u64>> {
        let mut handler = DropHandler::new();
        self.exec(sql, params, &mut handler)?;
        Ok(handler.rows_affected())
    }

    /// Execute a closure within a transaction.
    ///
    /// Autocommit is switched off for the duration of the closure. If the
    /// closure returns `Ok`, the transaction is committed unless the closure
    /// already committed or rolled back; if it returns `Err`, the
    /// transaction is rolled back.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUsage` if called while already in a transaction.
    pub fn run_transaction<F, R>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Conn, Transaction) -> Result<R>,
    {
        if self.in_transaction {
            return Err(Error::InvalidUsage("nested transactions are not supported".into()));
        }
        let restore_autocommit = self.autocommit;
        if restore_autocommit {
            self.set_autocommit(false)?;
        }
        self.in_transaction = true;
        let tx = Transaction::new(self.connection_id());
        let mut result = f(self, tx);

        if self.in_transaction {
            let end = match result {
                Ok(_) => self.commit(),
                Err(_) => self.rollback(),
            };
            // Return the first error (either from closure or commit/rollback)
            if let Err(e) = end {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        if restore_autocommit && !self.is_broken() {
            self.set_autocommit(true)?;
        }
        result
    }

    /// Close the connection.
    ///
    /// An open transaction is rolled back. The connection is disconnected
    /// once the last statement allocated from it is gone.
    pub fn close(mut self) -> Result<()> {
        if self.in_transaction {
            self.rollback()?;
        }
        if Arc::strong_count(&self.handle) == 1 {
            self.handle.release()?;
        }
        Ok(())
    }
}

impl Drop for Conn {
    fn drop(&mut self) {
        if self.in_transaction && !self.is_broken() {
            if let Err(e) = self.rollback() {
                tracing::warn!(handle = %self.handle.raw(), error = %e, "rollback on drop failed");
            }
        }
        self.env.counters().connection_closed();
    }
}

impl std::fmt::Debug for Conn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conn")
            .field("handle", &self.handle)
            .field("autocommit", &self.autocommit)
            .field("in_transaction", &self.in_transaction)
            .field("is_broken", &self.is_broken())
            .finish()
    }
}
