//! Advisory exclusive lock serializing Store mutations.
//!
//! Writers in separate worker processes coordinate through an OS file lock.
//! The lock file sits beside the cache root because a flush removes the root.

use std::fs::{self, File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::Error;
use crate::config::LockMode;

/// Mutual exclusion for write, delete and flush.
#[derive(Debug, Clone)]
pub enum CacheLock {
    /// OS advisory lock on `path`.
    File { path: PathBuf },
    /// No exclusion; suitable only for a single worker.
    Noop,
}

/// Held lock. Released when dropped.
#[derive(Debug)]
pub struct LockGuard {
    file: Option<File>,
}

impl LockGuard {
    fn noop() -> Self {
        Self { file: None }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(file) = self.file.take()
            && let Err(err) = file.unlock()
        {
            warn!(error = %err, "failed to release cache lock");
        }
    }
}

impl CacheLock {
    pub fn from_mode(mode: LockMode, path: impl Into<PathBuf>) -> Self {
        match mode {
            LockMode::File => CacheLock::File { path: path.into() },
            LockMode::None => CacheLock::Noop,
        }
    }

    /// Wait until the lock is held.
    ///
    /// The wait happens on the blocking thread pool.
    pub async fn acquire(&self) -> Result<LockGuard, Error> {
        let path = match self {
            CacheLock::Noop => return Ok(LockGuard::noop()),
            CacheLock::File { path } => path.clone(),
        };

        tokio::task::spawn_blocking(move || {
            let file = open_lock_file(&path)?;
            file.lock().map_err(|e| Error::io(&path, e))?;
            Ok(LockGuard { file: Some(file) })
        })
        .await
        .map_err(|e| Error::Lock(format!("lock task failed: {e}")))?
    }

    /// Take the lock if nobody else holds it.
    ///
    /// Returns `Ok(None)` when another holder exists.
    pub fn try_acquire(&self) -> Result<Option<LockGuard>, Error> {
        let path = match self {
            CacheLock::Noop => return Ok(Some(LockGuard::noop())),
            CacheLock::File { path } => path,
        };

        let file = open_lock_file(path)?;
        match file.try_lock() {
            Ok(()) => Ok(Some(LockGuard { file: Some(file) })),
            Err(TryLockError::WouldBlock) => Ok(None),
            Err(TryLockError::Error(e)) => Err(Error::io(path, e)),
        }
    }
}

fn open_lock_file(path: &Path) -> Result<File, Error> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map_err(|e| Error::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_lock_excludes_second_holder() {
        let dir = tempfile::tempdir().unwrap();
        let lock = CacheLock::File { path: dir.path().join("cache.lock") };

        let guard = lock.acquire().await.unwrap();
        assert!(lock.try_acquire().unwrap().is_none());

        drop(guard);
        assert!(lock.try_acquire().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_blocking_acquire_waits_for_release() {
        let dir = tempfile::tempdir().unwrap();
        let lock = CacheLock::File { path: dir.path().join("nested").join("cache.lock") };

        let guard = lock.try_acquire().unwrap().unwrap();
        let waiter = {
            let lock = lock.clone();
            tokio::spawn(async move { lock.acquire().await.map(|_| ()) })
        };

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_noop_lock_never_blocks() {
        let lock = CacheLock::from_mode(LockMode::None, "/unused");
        let _first = lock.acquire().await.unwrap();
        assert!(lock.try_acquire().unwrap().is_some());
    }
}
