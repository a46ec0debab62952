//! Cross-process exclusion for install directories.

use crate::config::InstallConfig;
use crate::{Result, WardenError};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Exclusive advisory lock on an install directory; released on drop.
#[derive(Debug)]
pub struct InstallLock {
    file: File,
    path: PathBuf,
}

impl InstallLock {
    /// Block until the lock on `install_dir` is acquired.
    ///
    /// Creates the directory if needed. Call from a blocking context.
    pub fn acquire(install_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(install_dir)
            .map_err(|e| WardenError::io_with_path(e, install_dir))?;

        let path = install_dir.join(InstallConfig::LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| WardenError::io_with_path(e, &path))?;

        file.lock_exclusive()
            .map_err(|e| WardenError::io_with_path(e, &path))?;
        debug!("Acquired install lock {}", path.display());

        Ok(Self { file, path })
    }

    /// Async wrapper running [`InstallLock::acquire`] on the blocking pool.
    pub async fn acquire_async(install_dir: &Path) -> Result<Self> {
        let dir = install_dir.to_path_buf();
        tokio::task::spawn_blocking(move || Self::acquire(&dir))
            .await
            .map_err(|e| WardenError::Other(format!("Install lock task failed: {}", e)))?
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to release install lock {}: {}", self.path.display(), e);
        }
    }
}
