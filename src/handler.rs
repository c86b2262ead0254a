//! Typed result handlers.

use crate::column::ColumnDescriptor;
use crate::error::Result;
use crate::row::{FromRow, Row};

/// Handler for statement results.
///
/// Callback patterns per result set:
/// - SELECT with rows: `result_start` → `row*` → `result_end`
/// - SELECT with 0 rows: `result_start` → `result_end`
/// - INSERT/UPDATE/DELETE: `result_start` (no columns) → `result_end`
///
/// A statement producing several result sets repeats the pattern once per
/// result set.
pub trait RowHandler {
    /// Called when a result set begins.
    fn result_start(&mut self, cols: &[ColumnDescriptor]) -> Result<()> {
        let _ = cols;
        Ok(())
    }

    /// Called for each row.
    fn row(&mut self, row: Row) -> Result<()>;

    /// Called when a result set ends, with the affected row count if the
    /// driver reports one.
    fn result_end(&mut self, rows_affected: Option<u64>) -> Result<()> {
        let _ = rows_affected;
        Ok(())
    }
}

/// A handler that discards all results.
#[derive(Debug, Default)]
pub struct DropHandler {
    rows_affected: Option<u64>,
}

impl DropHandler {
    /// Create a new drop handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of rows affected (if applicable).
    ///
    /// For several result sets, the counts are summed.
    pub fn rows_affected(&self) -> Option<u64> {
        self.rows_affected
    }
}

impl RowHandler for DropHandler {
    fn row(&mut self, _row: Row) -> Result<()> {
        Ok(())
    }

    fn result_end(&mut self, rows_affected: Option<u64>) -> Result<()> {
        if let Some(n) = rows_affected {
            self.rows_affected = Some(self.rows_affected.unwrap_or(0) + n);
        }
        Ok(())
    }
}

/// Handler that collects typed rows.
///
/// # Example
///
/// ```ignore
/// let mut handler: CollectHandler<(i32, String)> = CollectHandler::new();
/// conn.query("SELECT id, name FROM users", &mut handler)?;
/// for (id, name) in handler.into_rows() {
///     println!("{}: {}", id, name);
/// }
/// ```
#[derive(Default)]
pub struct CollectHandler<T> {
    rows: Vec<T>,
}

impl<T> CollectHandler<T> {
    /// Create a new collect handler.
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    /// Get collected rows.
    pub fn rows(&self) -> &[T] {
        &self.rows
    }

    /// Take collected rows.
    pub fn into_rows(self) -> Vec<T> {
        self.rows
    }

    /// Get the number of collected rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if no rows were collected.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl<T: FromRow> RowHandler for CollectHandler<T> {
    fn row(&mut self, row: Row) -> Result<()> {
        self.rows.push(T::from_row(row)?);
        Ok(())
    }
}

/// Handler that keeps only the first row.
#[derive(Default)]
pub struct FirstRowHandler<T> {
    row: Option<T>,
}

impl<T> FirstRowHandler<T> {
    /// Create a new first row handler.
    pub fn new() -> Self {
        Self { row: None }
    }

    /// Get the first row, if any.
    pub fn get(&self) -> Option<&T> {
        self.row.as_ref()
    }

    /// Take the first row.
    pub fn into_row(self) -> Option<T> {
        self.row
    }
}

impl<T: FromRow> RowHandler for FirstRowHandler<T> {
    fn row(&mut self, row: Row) -> Result<()> {
        if self.row.is_none() {
            self.row = Some(T::from_row(row)?);
        }
        Ok(())
    }
}
