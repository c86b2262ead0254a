//! Background cancellation of statements.
//!
//! A statement and any number of [`CancelHandle`]s share one [`CloseFlag`].
//! The canceller sets the flag before it touches the native handle; every
//! synchronous close path reads the flag first and backs off when it is set,
//! so the two paths never both try to tear down the same handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crate::api::{Api, HandleType};
use crate::diag::{ErrorClass, check};
use crate::error::Result;
use crate::handle::OwnedHandle;

/// Shared "closing in background" flag.
#[derive(Debug, Clone, Default)]
pub struct CloseFlag(Arc<AtomicBool>);

impl CloseFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag. Returns true if this call set it, false if it was already set.
    pub fn begin(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Returns true once a background close/cancel has begun.
    pub fn is_closing(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Handle for cancelling a statement from another thread.
///
/// Obtained from [`Statement::cancel_handle`](crate::sync::Statement::cancel_handle).
/// It keeps the native statement handle alive, so the handle is freed by
/// whichever of the statement and its cancel handles goes away last.
#[derive(Clone)]
pub struct CancelHandle {
    api: Arc<dyn Api>,
    handle: Arc<OwnedHandle>,
    flag: CloseFlag,
}

impl CancelHandle {
    pub(crate) fn new(api: Arc<dyn Api>, handle: Arc<OwnedHandle>, flag: CloseFlag) -> Self {
        Self { api, handle, flag }
    }

    /// Cancel the statement.
    ///
    /// Sets the close flag, then asks the driver to abort any in-flight call.
    /// Returns `Ok(false)` if a cancel was already in progress. After this,
    /// closing the statement or its cursor performs no native calls and new
    /// operations fail with [`Error::Cancelled`](crate::Error::Cancelled).
    pub fn cancel(&self) -> Result<bool> {
        if !self.flag.begin() {
            return Ok(false);
        }
        tracing::debug!(handle = %self.handle.raw(), "cancelling statement in background");
        let api = self.api.as_ref();
        match self.handle.with_live(|raw| (raw, api.cancel(raw))) {
            Some((raw, ret)) => {
                check(api, HandleType::Stmt, raw, "SQLCancel", ret, ErrorClass::Close)?;
            }
            None => {
                tracing::debug!("statement already released, nothing to cancel");
            }
        }
        Ok(true)
    }

    /// Run [`cancel`](Self::cancel) on a new thread.
    pub fn cancel_in_background(self) -> JoinHandle<Result<bool>> {
        std::thread::spawn(move || self.cancel())
    }

    /// Returns true once a cancel has begun.
    pub fn is_cancelled(&self) -> bool {
        self.flag.is_closing()
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("handle", &self.handle)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_once() {
        let flag = CloseFlag::new();
        let shared = flag.clone();
        assert!(!shared.is_closing());
        assert!(flag.begin());
        assert!(!shared.begin());
        assert!(shared.is_closing());
    }

    #[test]
    fn test_begin_races() {
        let flag = CloseFlag::new();
        let winners: usize = (0..8)
            .map(|_| {
                let flag = flag.clone();
                std::thread::spawn(move || flag.begin())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|t| t.join().unwrap() as usize)
            .sum();
        assert_eq!(winners, 1);
    }
}
