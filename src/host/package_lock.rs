//! Serializes package manager access.
//!
//! yum holds its own lock but fails instead of waiting when another run owns
//! it, so concurrent instance convergences queue here first: an async mutex
//! for tasks in this process, then an exclusive `fs2` lock on a file for
//! other processes on the host.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, MutexGuard};

#[derive(Debug)]
pub struct PackageManagerLock {
    path: PathBuf,
    in_process: Mutex<()>,
}

/// Held while a package operation runs; releases both locks on drop.
pub struct PackageLockGuard<'a> {
    file: File,
    _in_process: MutexGuard<'a, ()>,
}

impl PackageManagerLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            in_process: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn acquire(&self) -> Result<PackageLockGuard<'_>> {
        let in_process = self.in_process.lock().await;

        let path = self.path.clone();
        let file = tokio::task::spawn_blocking(move || lock_file(&path))
            .await
            .map_err(|e| Error::Filesystem(format!("Package lock task failed: {}", e)))??;

        tracing::debug!("Acquired package manager lock {}", self.path.display());
        Ok(PackageLockGuard {
            file,
            _in_process: in_process,
        })
    }
}

fn lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            Error::Filesystem(format!("Cannot create '{}': {}", parent.display(), e))
        })?;
    }

    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map_err(|e| Error::Filesystem(format!("Cannot open '{}': {}", path.display(), e)))?;

    // Blocks until any other process releases it
    file.lock_exclusive()
        .map_err(|e| Error::Filesystem(format!("Cannot lock '{}': {}", path.display(), e)))?;

    Ok(file)
}

impl Drop for PackageLockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("Failed to release package manager lock: {}", e);
        }
    }
}
