//! Shared test utilities for integration tests.
//!
//! Environment variables are process-global, so every test that reads or
//! writes them holds an [`EnvGuard`] for its whole body.

use std::sync::{Mutex, MutexGuard};

use bladedock::config::env_var_names;

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Exclusive access to the process environment.
pub struct EnvGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl EnvGuard<'_> {
    /// Acquire exclusive access to the environment.
    ///
    /// A lock poisoned by a panicking test is still acquired.
    #[must_use]
    pub fn lock() -> EnvGuard<'static> {
        let guard = ENV_LOCK
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        EnvGuard { _guard: guard }
    }

    /// Set `key` while the guard is held.
    pub fn set(&self, key: &str, value: &str) {
        // SAFETY: the guard gives this thread exclusive access to the environment.
        unsafe {
            std::env::set_var(key, value);
        }
    }
}

impl Drop for EnvGuard<'_> {
    fn drop(&mut self) {
        remove_bladedock_vars();
    }
}

/// Clear every `BLADEDOCK_*` variable and return a guard holding the lock.
///
/// The guard clears them again when dropped.
#[must_use]
pub fn clear_bladedock_env() -> EnvGuard<'static> {
    let guard = EnvGuard::lock();
    remove_bladedock_vars();
    guard
}

fn remove_bladedock_vars() {
    // SAFETY: only called while an `EnvGuard` holds the lock.
    unsafe {
        std::env::remove_var("BLADEDOCK_CONFIG_PATH");
    }
    for var in env_var_names() {
        // SAFETY: only called while an `EnvGuard` holds the lock.
        unsafe {
            std::env::remove_var(var);
        }
    }
}
