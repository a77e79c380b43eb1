//! Shared access to a runtime host.
//!
//! A store is not safe for concurrent use. [`SharedHost`] lets several owners
//! hold the same host while still serializing every operation through one
//! logical owner at a time. Contention is reported, never waited out.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::RuntimeHost;
use enigma_common::RuntimeError;

/// A cloneable handle to a runtime host guarded by a mutex.
#[derive(Clone)]
pub struct SharedHost {
    inner: Arc<Mutex<RuntimeHost>>,
}

impl SharedHost {
    /// Wrap a host for shared ownership.
    pub fn new(host: RuntimeHost) -> Self {
        Self {
            inner: Arc::new(Mutex::new(host)),
        }
    }

    /// Run `f` with exclusive access to the host.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ConcurrentAccessDenied`] without running `f`
    /// if another caller currently holds the host, otherwise whatever `f`
    /// returns.
    pub fn with<R>(
        &self,
        f: impl FnOnce(&mut RuntimeHost) -> Result<R, RuntimeError>,
    ) -> Result<R, RuntimeError> {
        let Some(mut guard) = self.inner.try_lock() else {
            warn!("Runtime host busy, access denied");
            return Err(RuntimeError::ConcurrentAccessDenied);
        };
        f(&mut guard)
    }

    /// Take the host back if this is the last handle.
    ///
    /// # Errors
    ///
    /// Returns `self` unchanged if other handles are still alive.
    pub fn try_unwrap(self) -> Result<RuntimeHost, Self> {
        Arc::try_unwrap(self.inner)
            .map(Mutex::into_inner)
            .map_err(|inner| Self { inner })
    }
}

impl std::fmt::Debug for SharedHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedHost")
            .field("handles", &Arc::strong_count(&self.inner))
            .field("locked", &self.inner.is_locked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enigma_common::RuntimeConfig;

    const ADD_WAT: &str = r#"
        (module
            (func (export "add") (param i32 i32) (result i32)
                (i32.add (local.get 0) (local.get 1)))
        )
    "#;

    fn shared() -> SharedHost {
        let mut host = RuntimeHost::new(&RuntimeConfig::default()).unwrap();
        let module = host.load_wat(ADD_WAT).unwrap();
        host.instantiate(&module).unwrap();
        SharedHost::new(host)
    }

    #[test]
    fn test_with_runs_operation() {
        let shared = shared();
        let result = shared.with(|host| {
            let add = host.resolve_function("add")?;
            host.call_i32(&add, &[40, 2])
        });

        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_nested_access_denied() {
        let shared = shared();
        let other = shared.clone();

        let result = shared.with(|_host| other.with(|host| Ok(host.generation())));
        assert!(matches!(result, Err(RuntimeError::ConcurrentAccessDenied)));

        // Released afterwards
        assert!(shared.with(|host| Ok(host.is_live())).unwrap());
    }

    #[test]
    fn test_access_from_other_thread() {
        let shared = shared();
        let worker = shared.clone();

        let handle = std::thread::spawn(move || {
            worker.with(|host| {
                let add = host.resolve_function("add")?;
                host.call_i32(&add, &[1, 2])
            })
        });

        assert_eq!(handle.join().unwrap().unwrap(), 3);
    }

    #[test]
    fn test_try_unwrap() {
        let shared = shared();
        let other = shared.clone();

        let shared = shared.try_unwrap().unwrap_err();
        drop(other);

        let host = shared.try_unwrap().unwrap();
        assert!(host.is_live());
    }
}
