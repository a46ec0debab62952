//! Zip extraction.

use crate::{Result, WardenError};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extract `archive_path` into `extract_dir`.
///
/// Entries whose names would escape `extract_dir` are skipped. Unix modes
/// stored in the archive are applied. Runs synchronously.
pub fn extract_zip(archive_path: &Path, extract_dir: &Path) -> Result<usize> {
    let extraction_error = |message: String| WardenError::Extraction {
        archive: archive_path.to_path_buf(),
        message,
    };

    let file = File::open(archive_path).map_err(|e| WardenError::io_with_path(e, archive_path))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| extraction_error(format!("Invalid zip archive: {}", e)))?;

    let mut extracted = 0;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| extraction_error(format!("Failed to read zip entry {}: {}", i, e)))?;

        let outpath = match entry.enclosed_name() {
            Some(path) => extract_dir.join(path),
            None => {
                debug!("Skipping unsafe zip entry {}", entry.name());
                continue;
            }
        };

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath).map_err(|e| WardenError::io_with_path(e, &outpath))?;
        } else {
            if let Some(parent) = outpath.parent() {
                std::fs::create_dir_all(parent).map_err(|e| WardenError::io_with_path(e, parent))?;
            }

            let mut outfile =
                File::create(&outpath).map_err(|e| WardenError::io_with_path(e, &outpath))?;
            std::io::copy(&mut entry, &mut outfile)
                .map_err(|e| WardenError::io_with_path(e, &outpath))?;
            extracted += 1;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode)).ok();
            }
        }
    }

    debug!(
        "Extracted {} files from {} into {}",
        extracted,
        archive_path.display(),
        extract_dir.display()
    );
    Ok(extracted)
}

/// Async wrapper running [`extract_zip`] on the blocking pool.
pub async fn extract_zip_async(archive_path: &Path, extract_dir: &Path) -> Result<usize> {
    let archive: PathBuf = archive_path.to_path_buf();
    let dir: PathBuf = extract_dir.to_path_buf();
    tokio::task::spawn_blocking(move || extract_zip(&archive, &dir))
        .await
        .map_err(|e| WardenError::Other(format!("Extraction task failed: {}", e)))?
}
