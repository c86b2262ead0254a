//! Error types for zero-odbc.

use thiserror::Error;

use crate::api::{DiagRecord, SqlReturn};

/// Result type for zero-odbc operations.
pub type Result<T> = core::result::Result<T, Error>;

/// A failing native call with every diagnostic record attached to it.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    /// Native function that failed, e.g. `SQLFetch`
    pub function: &'static str,
    /// Return code of the failing call
    pub ret: SqlReturn,
    /// Diagnostic records in the order reported by the driver
    pub records: Vec<DiagRecord>,
}

impl Diagnostics {
    /// SQLSTATE of the first record.
    pub fn sqlstate(&self) -> Option<&str> {
        self.records.first().map(|r| r.state.as_str())
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} returned {}", self.function, self.ret)?;
        if self.records.is_empty() {
            return write!(f, " (no diagnostics)");
        }
        for (i, record) in self.records.iter().enumerate() {
            if i == 0 {
                write!(f, ": {}", record)?;
            } else {
                write!(f, "\n{}", record)?;
            }
        }
        Ok(())
    }
}

/// Error type for zero-odbc.
#[derive(Debug, Error)]
pub enum Error {
    /// A native handle could not be allocated
    #[error("handle allocation failed: {0}")]
    HandleAllocation(Diagnostics),

    /// An environment or connection attribute could not be set
    #[error("attribute set failed: {0}")]
    AttributeSet(Diagnostics),

    /// Connecting to the data source failed
    #[error("connect failed: {0}")]
    Connect(Diagnostics),

    /// Preparing a statement failed
    #[error("prepare failed: {0}")]
    Prepare(Diagnostics),

    /// Executing a statement failed
    #[error("execute failed: {0}")]
    Execute(Diagnostics),

    /// Describing result columns failed
    #[error("describe failed: {0}")]
    Describe(Diagnostics),

    /// Binding a column or parameter buffer failed
    #[error("bind failed: {0}")]
    Bind(Diagnostics),

    /// Fetching a row or moving to the next result set failed
    #[error("fetch failed: {0}")]
    Fetch(Diagnostics),

    /// Commit or rollback failed
    #[error("transaction failed: {0}")]
    Transaction(Diagnostics),

    /// Closing a cursor or releasing a handle failed
    #[error("close failed: {0}")]
    Close(Diagnostics),

    /// A native value cannot be represented losslessly in the target type
    #[error("conversion error: {0}")]
    Conversion(String),

    /// The statement is being cancelled or closed in the background
    #[error("statement was cancelled")]
    Cancelled,

    /// Internal invariant violation (e.g. a handle released twice)
    #[error("internal failure: {0}")]
    Internal(String),

    /// Invalid usage (e.g. fetching from a closed cursor)
    #[error("invalid usage: {0}")]
    InvalidUsage(String),
}

impl Error {
    /// Native diagnostics, if this error came from a failing native call.
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            Error::HandleAllocation(d)
            | Error::AttributeSet(d)
            | Error::Connect(d)
            | Error::Prepare(d)
            | Error::Execute(d)
            | Error::Describe(d)
            | Error::Bind(d)
            | Error::Fetch(d)
            | Error::Transaction(d)
            | Error::Close(d) => Some(d),
            _ => None,
        }
    }

    /// SQLSTATE of the first diagnostic record.
    pub fn sqlstate(&self) -> Option<&str> {
        self.diagnostics().and_then(Diagnostics::sqlstate)
    }

    /// Returns true if the error indicates the connection is broken and cannot be reused.
    pub fn is_connection_broken(&self) -> bool {
        // SQLSTATE class 08: connection exception
        matches!(self.sqlstate(), Some(state) if state.starts_with("08"))
    }

    /// A value does not fit into the target type.
    pub fn overflow(from: &str, to: &str) -> Self {
        Error::Conversion(format!("value of {} out of range for {}", from, to))
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}
