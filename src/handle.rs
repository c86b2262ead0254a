//! Owned native handles with exactly-once release.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::api::{Api, HandleType, RawHandle};
use crate::diag::{ErrorClass, check};
use crate::error::{Error, Result};

/// A native handle owned by the client.
///
/// The handle is freed exactly once: either by an explicit [`release`] or
/// when the last reference is dropped. A parent handle (the connection of a
/// statement, the environment of a connection) is kept alive for as long as
/// any child exists.
///
/// [`release`]: OwnedHandle::release
pub struct OwnedHandle {
    api: Arc<dyn Api>,
    kind: HandleType,
    raw: RawHandle,
    /// `true` until the native handle has been freed.
    live: Mutex<bool>,
    /// Connection handles only: disconnect before freeing.
    connected: AtomicBool,
    _parent: Option<Arc<OwnedHandle>>,
}

impl OwnedHandle {
    /// Allocate a new handle of `kind` under `parent`.
    pub fn alloc(
        api: &Arc<dyn Api>,
        kind: HandleType,
        parent: Option<&Arc<OwnedHandle>>,
    ) -> Result<Arc<Self>> {
        let (parent_kind, parent_raw) = match parent {
            Some(p) => (p.kind, p.raw),
            None => (HandleType::Env, RawHandle::NULL),
        };
        let mut raw = RawHandle::NULL;
        let ret = api.alloc_handle(kind, parent_raw, &mut raw);
        check(
            api.as_ref(),
            parent_kind,
            parent_raw,
            "SQLAllocHandle",
            ret,
            ErrorClass::HandleAllocation,
        )?;
        if raw.is_null() {
            return Err(Error::Internal(format!(
                "SQLAllocHandle returned a null {} handle",
                kind
            )));
        }
        tracing::debug!(%kind, handle = %raw, "allocated handle");
        Ok(Arc::new(Self {
            api: Arc::clone(api),
            kind,
            raw,
            live: Mutex::new(true),
            connected: AtomicBool::new(false),
            _parent: parent.cloned(),
        }))
    }

    /// The raw native handle.
    pub fn raw(&self) -> RawHandle {
        self.raw
    }

    pub fn kind(&self) -> HandleType {
        self.kind
    }

    /// Returns true until the native handle has been freed.
    pub fn is_live(&self) -> bool {
        *self.lock()
    }

    /// Mark a connection handle as connected so that it is disconnected
    /// before being freed.
    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    /// Run `f` with the raw handle while holding the live lock.
    ///
    /// Returns `None` without calling `f` if the handle was already released.
    /// A concurrent [`release`](Self::release) waits for `f` to return.
    pub(crate) fn with_live<R>(&self, f: impl FnOnce(RawHandle) -> R) -> Option<R> {
        let live = self.lock();
        if *live { Some(f(self.raw)) } else { None }
    }

    /// Free the native handle.
    ///
    /// Releasing a handle that was already released is an internal error and
    /// performs no native call.
    pub fn release(&self) -> Result<()> {
        let mut live = self.lock();
        if !*live {
            return Err(Error::Internal(format!(
                "{} handle {} released twice",
                self.kind, self.raw
            )));
        }
        self.free_locked(&mut live)
    }

    fn free_locked(&self, live: &mut MutexGuard<'_, bool>) -> Result<()> {
        let api = self.api.as_ref();
        if self.kind == HandleType::Dbc && self.connected.swap(false, Ordering::AcqRel) {
            let ret = api.disconnect(self.raw);
            if let Err(e) = check(api, self.kind, self.raw, "SQLDisconnect", ret, ErrorClass::Close) {
                tracing::warn!(handle = %self.raw, error = %e, "disconnect failed");
            }
        }
        let ret = api.free_handle(self.kind, self.raw);
        check(api, self.kind, self.raw, "SQLFreeHandle", ret, ErrorClass::Close)?;
        **live = false;
        tracing::debug!(kind = %self.kind, handle = %self.raw, "released handle");
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for OwnedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnedHandle")
            .field("kind", &self.kind)
            .field("raw", &self.raw)
            .field("live", &self.is_live())
            .finish()
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        let mut live = self.lock();
        if *live {
            if let Err(e) = self.free_locked(&mut live) {
                tracing::warn!(kind = %self.kind, handle = %self.raw, error = %e, "failed to free handle on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ScriptedApi;

    fn setup() -> (Arc<ScriptedApi>, Arc<dyn Api>) {
        let scripted = Arc::new(ScriptedApi::new());
        let api: Arc<dyn Api> = scripted.clone();
        (scripted, api)
    }

    #[test]
    fn test_release_once() {
        let (scripted, api) = setup();
        let env = OwnedHandle::alloc(&api, HandleType::Env, None).unwrap();
        let raw = env.raw();
        env.release().unwrap();
        assert!(!env.is_live());

        let err = env.release().unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        drop(env);
        assert_eq!(scripted.free_count(raw), 1);
    }

    #[test]
    fn test_drop_releases() {
        let (scripted, api) = setup();
        let env = OwnedHandle::alloc(&api, HandleType::Env, None).unwrap();
        let raw = env.raw();
        drop(env);
        assert_eq!(scripted.free_count(raw), 1);
        assert_eq!(scripted.live_handles(), 0);
    }

    #[test]
    fn test_parent_outlives_child() {
        let (scripted, api) = setup();
        let env = OwnedHandle::alloc(&api, HandleType::Env, None).unwrap();
        let env_raw = env.raw();
        let dbc = OwnedHandle::alloc(&api, HandleType::Dbc, Some(&env)).unwrap();
        drop(env);
        assert_eq!(scripted.free_count(env_raw), 0);
        drop(dbc);
        assert_eq!(scripted.free_count(env_raw), 1);
        assert_eq!(scripted.live_handles(), 0);
    }

    #[test]
    fn test_with_live_after_release() {
        let (_scripted, api) = setup();
        let env = OwnedHandle::alloc(&api, HandleType::Env, None).unwrap();
        assert!(env.with_live(|_| ()).is_some());
        env.release().unwrap();
        assert!(env.with_live(|_| ()).is_none());
    }
}
