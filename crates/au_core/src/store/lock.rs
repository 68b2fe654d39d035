//! Advisory exclusive lock for writeable workspace sessions.
//!
//! The lock lives on a `.lock` sibling of the workspace file and is
//! cooperative: only holders of the store API respect it. fs2 maps it onto
//! `flock` on unix and `LockFileEx` on Windows.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{AuError, Result};

/// RAII guard for the exclusive write lock on a workspace.
///
/// Released explicitly via [`WorkspaceLock::release`] or implicitly on
/// drop.
#[derive(Debug)]
pub struct WorkspaceLock {
    file: std::fs::File,
    path: PathBuf,
}

impl WorkspaceLock {
    /// Try to acquire the lock without blocking.
    ///
    /// Fails with [`AuError::Conflict`] when another process already holds
    /// it.
    pub fn try_acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = file.set_permissions(std::fs::Permissions::from_mode(0o600));
        }
        if file.try_lock_exclusive().is_err() {
            return Err(AuError::Conflict(format!(
                "workspace is already locked for editing by another process ({})",
                path.display()
            )));
        }
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Explicitly release the lock. Also happens automatically on drop.
    pub fn release(self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ws.automerge.lock");
        let lock = WorkspaceLock::try_acquire(&path).unwrap();
        assert_eq!(lock.path(), path.as_path());
        lock.release();
        let _again = WorkspaceLock::try_acquire(&path).unwrap();
    }

    #[test]
    fn second_acquire_conflicts_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ws.automerge.lock");
        let _held = WorkspaceLock::try_acquire(&path).unwrap();
        let err = WorkspaceLock::try_acquire(&path).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn drop_releases_the_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ws.automerge.lock");
        {
            let _held = WorkspaceLock::try_acquire(&path).unwrap();
        }
        let _reacquired = WorkspaceLock::try_acquire(&path).unwrap();
    }
}
