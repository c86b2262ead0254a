//! Cursor over the result sets of an executed statement.

use std::sync::Arc;

use crate::api::HandleType;
use crate::column::{Column, ColumnDescriptor};
use crate::conversion::{Value, ValueKind};
use crate::diag::{ErrorClass, check};
use crate::error::{Error, Result};
use crate::handler::RowHandler;
use crate::row::Row;
use crate::state::cursor::{CloseAction, CursorState, CursorStateMachine, FetchAction};

use super::statement::Statement;

enum StatementRef<'a> {
    Borrowed(&'a mut Statement),
    /// One-shot statement, released together with the cursor.
    Owned(Box<Statement>),
}

/// Cursor over the result sets of an executed statement.
///
/// `next()` fetches rows of the current result set and
/// `next_result_set()` moves on to the next one. Dropping the cursor closes
/// it; call [`close`](Self::close) to observe errors.
pub struct Rows<'a> {
    stmt: StatementRef<'a>,
    cursor: CursorStateMachine,
    names: Arc<[String]>,
}

fn column_names(columns: &[Column]) -> Arc<[String]> {
    columns.iter().map(|c| c.name().to_string()).collect()
}

impl Rows<'static> {
    pub(super) fn owned(stmt: Statement) -> Self {
        Self::new(StatementRef::Owned(Box::new(stmt)))
    }
}

impl<'a> Rows<'a> {
    pub(super) fn borrowed(stmt: &'a mut Statement) -> Self {
        Self::new(StatementRef::Borrowed(stmt))
    }

    fn new(stmt: StatementRef<'a>) -> Self {
        let (cursor, names) = {
            let s = match &stmt {
                StatementRef::Borrowed(s) => &**s,
                StatementRef::Owned(s) => &**s,
            };
            (
                CursorStateMachine::new(s.columns.len()),
                column_names(&s.columns),
            )
        };
        Self {
            stmt,
            cursor,
            names,
        }
    }

    fn stmt(&self) -> &Statement {
        match &self.stmt {
            StatementRef::Borrowed(s) => &**s,
            StatementRef::Owned(s) => &**s,
        }
    }

    fn stmt_mut(&mut self) -> &mut Statement {
        match &mut self.stmt {
            StatementRef::Borrowed(s) => &mut **s,
            StatementRef::Owned(s) => &mut **s,
        }
    }

    /// Columns of the current result set.
    pub fn columns(&self) -> &[Column] {
        &self.stmt().columns
    }

    /// Column names of the current result set.
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn state(&self) -> CursorState {
        self.cursor.state()
    }

    /// Fetch the next row of the current result set.
    ///
    /// Returns `Ok(None)` at the end of the result set, and keeps doing so
    /// on further calls without touching the statement. A failed fetch
    /// leaves the cursor unusable for rows; a value that does not convert
    /// only fails this call.
    pub fn next(&mut self) -> Result<Option<Row>> {
        self.stmt().ensure_not_cancelled()?;
        if self.cursor.next_row()? == FetchAction::EndOfSequence {
            return Ok(None);
        }

        let stmt = self.stmt();
        let raw = stmt.raw();
        let ret = stmt.api.fetch(raw);
        tracing::trace!(handle = %raw, %ret, "fetch");
        let outcome = check(stmt.api(), HandleType::Stmt, raw, "SQLFetch", ret, ErrorClass::Fetch);
        let outcome = self.stmt().track(outcome);
        if self.cursor.fetched(outcome)? == FetchAction::EndOfSequence {
            return Ok(None);
        }

        let stmt = self.stmt();
        let values = stmt
            .columns
            .iter()
            .map(|column| column.value(stmt.api(), raw, stmt.limits))
            .collect::<Result<Vec<Value>>>();
        let values = self.stmt().track(values)?;
        Ok(Some(Row::new(Arc::clone(&self.names), values)))
    }

    /// Always true: whether another result set exists is only known by
    /// asking for it with [`next_result_set`](Self::next_result_set).
    pub fn has_next_result_set(&self) -> bool {
        true
    }

    /// Move to the next result set.
    ///
    /// Returns `Ok(false)` when there is none; the columns of the last
    /// result set are kept and nothing is re-described. On success the
    /// columns are unbound, re-described and bound again.
    pub fn next_result_set(&mut self) -> Result<bool> {
        self.stmt().ensure_not_cancelled()?;
        self.cursor.begin_next_result_set()?;

        let stmt = self.stmt();
        let raw = stmt.raw();
        let ret = stmt.api.more_results(raw);
        let outcome = check(
            stmt.api(),
            HandleType::Stmt,
            raw,
            "SQLMoreResults",
            ret,
            ErrorClass::Fetch,
        );

        let Self { stmt, cursor, .. } = self;
        let stmt = match stmt {
            StatementRef::Borrowed(s) => &mut **s,
            StatementRef::Owned(s) => &mut **s,
        };
        let more = cursor.next_result_set(outcome, || {
            stmt.unbind_columns()?;
            stmt.bind_result_set()
        });
        let more = stmt.track(more)?;
        if more {
            self.names = column_names(&self.stmt().columns);
            tracing::debug!(handle = %raw, columns = self.names.len(), "moved to next result set");
        } else {
            self.stmt_mut().cursor_open = false;
        }
        Ok(more)
    }

    /// Number of rows affected by the current result, `None` when the
    /// driver does not report one (typically for queries).
    pub fn rows_affected(&self) -> Result<Option<u64>> {
        let stmt = self.stmt();
        stmt.ensure_not_cancelled()?;
        let raw = stmt.raw();
        let mut count: isize = 0;
        let ret = stmt.api.row_count(raw, &mut count);
        check(stmt.api(), HandleType::Stmt, raw, "SQLRowCount", ret, ErrorClass::Fetch)?;
        Ok(u64::try_from(count).ok())
    }

    /// Close the cursor.
    ///
    /// - after a background cancel: no native calls, the canceller owns the handle
    /// - cursor of a one-shot statement: the statement handle is released
    /// - otherwise: only the cursor is closed and the statement can run again
    ///
    /// Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        let stmt = self.stmt();
        let (closing, closed, raw) = (stmt.flag.is_closing(), stmt.closed, stmt.raw());
        let action = self.cursor.close(closing, closed);
        tracing::debug!(handle = %raw, ?action, "closing cursor");
        match action {
            CloseAction::Nothing => Ok(()),
            CloseAction::ReleaseHandle => self.stmt_mut().release(),
            CloseAction::CloseCursor => self.stmt_mut().close_cursor(),
        }
    }

    /// Feed every row of every remaining result set into `handler`.
    pub fn drive<H: RowHandler>(&mut self, handler: &mut H) -> Result<()> {
        loop {
            let descriptors: Vec<ColumnDescriptor> = self
                .columns()
                .iter()
                .map(|c| c.descriptor().clone())
                .collect();
            handler.result_start(&descriptors)?;
            while let Some(row) = self.next()? {
                handler.row(row)?;
            }
            handler.result_end(self.rows_affected()?)?;
            if !self.next_result_set()? {
                return Ok(());
            }
        }
    }

    fn column(&self, index: usize) -> Result<&ColumnDescriptor> {
        self.columns()
            .get(index)
            .map(Column::descriptor)
            .ok_or_else(|| {
                Error::InvalidUsage(format!(
                    "column index {} out of range for {} columns",
                    index,
                    self.columns().len()
                ))
            })
    }

    /// Kind of value column `index` scans into.
    pub fn column_type_scan_type(&self, index: usize) -> Result<ValueKind> {
        Ok(self.column(index)?.scan_type())
    }

    /// `Some(nullable)`, or `None` when the driver does not know.
    pub fn column_type_nullable(&self, index: usize) -> Result<Option<bool>> {
        Ok(self.column(index)?.is_nullable())
    }

    pub fn column_type_database_type_name(&self, index: usize) -> Result<&'static str> {
        Ok(self.column(index)?.database_type_name())
    }

    pub fn column_type_length(&self, index: usize) -> Result<Option<usize>> {
        Ok(self.column(index)?.length())
    }

    pub fn column_type_precision_scale(&self, index: usize) -> Result<Option<(usize, i16)>> {
        Ok(self.column(index)?.precision_scale())
    }
}

impl Drop for Rows<'_> {
    fn drop(&mut self) {
        if self.cursor.state() == CursorState::Closed {
            return;
        }
        if let Err(e) = self.close() {
            tracing::warn!(handle = %self.stmt().raw(), error = %e, "failed to close cursor on drop");
        }
    }
}

impl std::fmt::Debug for Rows<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rows")
            .field("statement", self.stmt())
            .field("state", &self.cursor.state())
            .field("columns", &self.names)
            .finish()
    }
}
