//! ODBC environment.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::api::types::attr;
use crate::api::{Api, EnvAttr, HandleType};
use crate::diag::{ErrorClass, check};
use crate::error::Result;
use crate::handle::OwnedHandle;
use crate::opts::Opts;

/// Snapshot of the resources open under an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    pub open_connections: usize,
    pub open_statements: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    connections: AtomicUsize,
    statements: AtomicUsize,
}

impl Counters {
    pub(crate) fn connection_opened(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connection_closed(&self) {
        self.connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn statement_opened(&self) {
        self.statements.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn statement_closed(&self) {
        self.statements.fetch_sub(1, Ordering::Relaxed);
    }
}

/// An environment handle configured for ODBC 3 behaviour.
///
/// Cloning is cheap; the native handle is freed when the last clone and the
/// last connection allocated from it are gone.
#[derive(Clone)]
pub struct Env {
    api: Arc<dyn Api>,
    handle: Arc<OwnedHandle>,
    counters: Arc<Counters>,
}

impl Env {
    /// Allocate an environment and configure versioning and pooling.
    pub fn new(api: Arc<dyn Api>, opts: &Opts) -> Result<Self> {
        let handle = OwnedHandle::alloc(&api, HandleType::Env, None)?;
        let raw = handle.raw();
        let settings = [
            (EnvAttr::OdbcVersion, attr::OV_ODBC3, "SQLSetEnvAttr(SQL_ATTR_ODBC_VERSION)"),
            (
                EnvAttr::ConnectionPooling,
                opts.pooling.attr_value(),
                "SQLSetEnvAttr(SQL_ATTR_CONNECTION_POOLING)",
            ),
            (
                EnvAttr::PoolMatch,
                opts.pool_match.attr_value(),
                "SQLSetEnvAttr(SQL_ATTR_CP_MATCH)",
            ),
        ];
        for (attr, value, function) in settings {
            let ret = api.set_env_attr(raw, attr, value);
            // on failure the handle is released when dropped
            check(api.as_ref(), HandleType::Env, raw, function, ret, ErrorClass::AttributeSet)?;
        }
        tracing::debug!(
            handle = %raw,
            pooling = ?opts.pooling,
            pool_match = ?opts.pool_match,
            "environment ready"
        );
        Ok(Self {
            api,
            handle,
            counters: Arc::default(),
        })
    }

    /// Environment on the system driver manager.
    #[cfg(feature = "odbc")]
    pub fn odbc(opts: &Opts) -> Result<Self> {
        Self::new(Arc::new(crate::api::OdbcApi::new()), opts)
    }

    pub fn api(&self) -> &Arc<dyn Api> {
        &self.api
    }

    pub(crate) fn handle(&self) -> &Arc<OwnedHandle> {
        &self.handle
    }

    pub(crate) fn counters(&self) -> &Arc<Counters> {
        &self.counters
    }

    /// Connections and statements currently open under this environment.
    pub fn stats(&self) -> Stats {
        Stats {
            open_connections: self.counters.connections.load(Ordering::Relaxed),
            open_statements: self.counters.statements.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for Env {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Env")
            .field("handle", &self.handle)
            .field("stats", &self.stats())
            .finish()
    }
}
