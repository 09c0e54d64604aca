//! Lock acquisition helpers
//!
//! A poisoned mutex or rwlock means a writer panicked mid-update; the engine
//! surfaces that as `PolystoreError::LockPoisoned` naming the structure, so
//! callers see which component is wedged. The extension trait below lets
//! every acquisition site stay a one-liner:
//! `self.topology.lock().or_poisoned("graph topology")?`.

use crate::core::common::PolystoreError;
use std::sync::{LockResult, PoisonError};

/// Extension for `lock()` / `read()` / `write()` results.
pub trait LockResultExt {
    type Guard;

    /// Replace a poisoning error with a `LockPoisoned` error that names the
    /// guarded structure.
    fn or_poisoned(self, what: &str) -> Result<Self::Guard, PolystoreError>;
}

impl<G> LockResultExt for LockResult<G> {
    type Guard = G;

    fn or_poisoned(self, what: &str) -> Result<G, PolystoreError> {
        self.map_err(|_: PoisonError<G>| {
            PolystoreError::LockPoisoned(format!("{what} lock poisoned"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::{Mutex, RwLock};

    #[test]
    fn test_healthy_locks_pass_through() {
        let mutex = Mutex::new(7);
        assert_eq!(*mutex.lock().or_poisoned("counter").unwrap(), 7);

        let rwlock = RwLock::new("x");
        assert_eq!(*rwlock.read().or_poisoned("label").unwrap(), "x");
    }

    #[test]
    fn test_poisoned_lock_names_the_structure() {
        let mutex = Mutex::new(0);
        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = mutex.lock().unwrap();
            panic!("poison it");
        }));

        let err = mutex.lock().or_poisoned("session table").unwrap_err();
        assert_eq!(err.to_string(), "Lock Poisoned: session table lock poisoned");
    }
}
