use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::EngineError;

/// Cross-process mutual exclusion via a marker file created exclusively.
///
/// The marker holds the owner's pid for operators; it is not used to
/// detect stale locks.
#[derive(Debug, Clone)]
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Takes the lock. Returns `None` when another process holds it.
    pub fn acquire(&self) -> Result<Option<LockGuard>, EngineError> {
        match OpenOptions::new().write(true).create_new(true).open(&self.path) {
            Ok(mut file) => {
                if let Err(e) = writeln!(file, "{}", std::process::id()) {
                    warn!(path = %self.path.display(), error = %e, "failed to write pid to lock file");
                }
                info!(path = %self.path.display(), "lock acquired");
                Ok(Some(LockGuard {
                    path: self.path.clone(),
                    released: false,
                }))
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(EngineError::Lock(format!("{}: {e}", self.path.display()))),
        }
    }
}

/// Held lock. Removes the marker on release or drop.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    released: bool,
}

impl LockGuard {
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match fs::remove_file(&self.path) {
            Ok(()) => info!(path = %self.path.display(), "lock released"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove lock file"),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let lock = FileLock::new(dir.path().join("run.lock"));

        let guard = lock.acquire().unwrap().expect("first acquire");
        assert!(lock.acquire().unwrap().is_none());

        guard.release();
        assert!(!lock.path().exists());
        assert!(lock.acquire().unwrap().is_some());
    }

    #[test]
    fn test_drop_releases() {
        let dir = tempfile::tempdir().unwrap();
        let lock = FileLock::new(dir.path().join("run.lock"));
        {
            let _guard = lock.acquire().unwrap().unwrap();
            assert!(lock.path().exists());
        }
        assert!(!lock.path().exists());
    }

    #[test]
    fn test_unwritable_location_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let lock = FileLock::new(dir.path().join("missing").join("run.lock"));
        assert!(matches!(lock.acquire(), Err(EngineError::Lock(_))));
    }
}
