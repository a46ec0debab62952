//! Persistence of the install record (`SERVER-INFO`).

use crate::config::InstallConfig;
use crate::metadata::atomic::{atomic_read_json, atomic_write_json};
use crate::models::InstallRecord;
use crate::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Reads and writes the install record of one install directory.
#[derive(Debug, Clone)]
pub struct InstallStateStore {
    path: PathBuf,
}

impl InstallStateStore {
    /// Store for the state file inside `install_dir`.
    pub fn new(install_dir: &Path) -> Self {
        Self {
            path: install_dir.join(InstallConfig::STATE_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the record.
    ///
    /// Never fails: a missing or unreadable file, or a version that is not a
    /// semantic version, yields [`InstallRecord::sentinel`].
    pub fn read(&self) -> InstallRecord {
        match atomic_read_json::<InstallRecord>(&self.path) {
            Ok(Some(record)) if record.parsed_version().is_some() => record,
            Ok(Some(record)) => {
                warn!(
                    "Ignoring {} with invalid version '{}'",
                    self.path.display(),
                    record.version
                );
                InstallRecord::sentinel()
            }
            Ok(None) => {
                debug!("No install record at {}", self.path.display());
                InstallRecord::sentinel()
            }
            Err(e) => {
                warn!("Ignoring unreadable install record: {}", e);
                InstallRecord::sentinel()
            }
        }
    }

    /// Replace the record atomically.
    pub fn write(&self, record: &InstallRecord) -> Result<()> {
        atomic_write_json(&self.path, record)?;
        debug!(
            "Saved install record {} (checked at {})",
            record.version, record.last_update
        );
        Ok(())
    }
}
