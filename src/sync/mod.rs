//! Synchronous ODBC client.

mod conn;
mod env;
mod pool;
mod rows;
mod statement;
mod transaction;

pub use conn::Conn;
pub use env::{Env, Stats};
pub use pool::{Pool, PooledConn};
pub use rows::Rows;
pub use statement::Statement;
pub use transaction::Transaction;
