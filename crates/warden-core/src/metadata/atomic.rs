//! Atomic file operations for safe JSON persistence.
//!
//! Implements atomic writes using:
//! 1. Write to a temp file in the target's directory (PID suffix)
//! 2. fsync so the data reaches disk
//! 3. Rename over the target path
//!
//! Readers therefore see either the previous file or the new one, never a
//! truncated mix.

use crate::{Result, WardenError};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use tracing::debug;

/// Read and parse a JSON file.
///
/// Returns `None` if the file doesn't exist, or an error if reading or
/// parsing fails.
pub fn atomic_read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path).map_err(|e| WardenError::Io {
        message: format!("Failed to read {}", path.display()),
        path: Some(path.to_path_buf()),
        source: Some(e),
    })?;

    let data: T = serde_json::from_str(&contents).map_err(|e| WardenError::Parse {
        what: path.display().to_string(),
        message: e.to_string(),
    })?;

    Ok(Some(data))
}

/// Write data to a JSON file atomically (compact encoding).
pub fn atomic_write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WardenError::Io {
                message: format!("Failed to create directory {}", parent.display()),
                path: Some(parent.to_path_buf()),
                source: Some(e),
            })?;
        }
    }

    let serialized = serde_json::to_vec(data)?;
    let temp_path = temp_path_for(path);

    let written = write_synced(&temp_path, &serialized).and_then(|()| {
        fs::rename(&temp_path, path).map_err(|e| WardenError::Io {
            message: format!(
                "Failed to rename {} to {}",
                temp_path.display(),
                path.display()
            ),
            path: Some(path.to_path_buf()),
            source: Some(e),
        })
    });

    if written.is_err() {
        let _ = fs::remove_file(&temp_path);
    } else {
        debug!("Atomically wrote {}", path.display());
    }
    written
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    path.with_file_name(format!(".{}.{}.tmp", file_name, process::id()))
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|e| WardenError::io_with_path(e, path))?;

    file.write_all(bytes)
        .map_err(|e| WardenError::io_with_path(e, path))?;
    file.sync_all()
        .map_err(|e| WardenError::io_with_path(e, path))?;
    Ok(())
}
