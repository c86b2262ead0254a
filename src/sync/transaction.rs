//! Transaction support for synchronous ODBC connections.

use super::Conn;
use crate::error::{Error, Result};

/// A transaction on a synchronous connection.
///
/// Handed to the closure of [`Conn::run_transaction`]. The connection is
/// passed to `commit` and `rollback`, which end the transaction with the
/// native end-transaction call.
pub struct Transaction {
    connection_id: usize,
}

impl Transaction {
    /// Create a new transaction (internal use only).
    pub(crate) fn new(connection_id: usize) -> Self {
        Self { connection_id }
    }

    fn check_connection(&self, conn: &Conn) -> Result<()> {
        let actual = conn.connection_id();
        if self.connection_id != actual {
            return Err(Error::InvalidUsage(format!(
                "connection mismatch: expected {:#x}, got {:#x}",
                self.connection_id, actual
            )));
        }
        Ok(())
    }

    /// Commit the transaction.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUsage` if the connection is not the same
    /// as the one that started the transaction.
    pub fn commit(self, conn: &mut Conn) -> Result<()> {
        self.check_connection(conn)?;
        conn.commit()
    }

    /// Roll back the transaction.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUsage` if the connection is not the same
    /// as the one that started the transaction.
    pub fn rollback(self, conn: &mut Conn) -> Result<()> {
        self.check_connection(conn)?;
        conn.rollback()
    }
}
