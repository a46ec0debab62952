//! Versioned asset installation with self-healing.
//!
//! One [`AssetInstaller`] owns one install directory:
//!
//! ```text
//! <install_dir>/
//!   SERVER-INFO            install record
//!   .install.lock          cross-process install lock
//!   download-<asset>       temp archive, only while installing
//!   <extracted>/bin/...    extracted release tree
//!   <extracted>/lib/...
//! ```

use crate::config::{InstallConfig, ServerKind};
use crate::install::archive::extract_zip_async;
use crate::install::corruption::{CorruptionDetector, CorruptionReason};
use crate::install::lock::InstallLock;
use crate::metadata::InstallStateStore;
use crate::models::{now_millis, InstallRecord, ReleaseAsset, ReleaseDescriptor};
use crate::network::{AssetDownloader, DownloadProgress, ProjectId, ReleaseSource};
use crate::platform::paths::script_name;
use crate::settings::Settings;
use crate::sink::ProgressSink;
use crate::{Result, WardenError};
use semver::Version;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What to install and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallSpec {
    pub project: ProjectId,
    /// Exact name of the release asset to download.
    pub asset_name: String,
    pub install_dir: PathBuf,
    /// Top-level directory the archive extracts to.
    pub extracted_dir_name: String,
    /// Launcher script name without platform suffix.
    pub script_name: String,
    /// Used in progress messages.
    pub display_name: String,
}

impl InstallSpec {
    /// Spec for one of the built-in server kinds.
    pub fn for_kind(kind: ServerKind, settings: &Settings) -> Result<Self> {
        Ok(Self {
            project: ProjectId::new(&settings.registry.organization, kind.github_project()),
            asset_name: kind.asset_name().to_string(),
            install_dir: settings.install_dir(kind)?,
            extracted_dir_name: kind.extracted_dir_name().to_string(),
            script_name: kind.script_name().to_string(),
            display_name: kind.display_name().to_string(),
        })
    }

    pub fn extracted_dir(&self) -> PathBuf {
        self.install_dir.join(&self.extracted_dir_name)
    }

    /// Launcher script inside the extracted tree.
    pub fn executable_path(&self) -> PathBuf {
        self.extracted_dir()
            .join(InstallConfig::BIN_DIR_NAME)
            .join(script_name(&self.script_name))
    }

    fn download_path(&self) -> PathBuf {
        self.install_dir
            .join(format!("{}{}", InstallConfig::DOWNLOAD_PREFIX, self.asset_name))
    }
}

/// Why a download happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallReason {
    /// The registry has a newer version.
    Update { from: String },
    /// The installed tree is damaged.
    Repair(CorruptionReason),
}

/// Result of [`AssetInstaller::download_server_if_needed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Checked recently; the registry was not asked.
    UpToDate { version: String },
    /// The registry was asked and nothing needed to change.
    Checked { version: String },
    /// A release was downloaded and extracted.
    Installed {
        version: String,
        reason: InstallReason,
    },
    /// The registry could not be used; the existing install is kept.
    OfflineFallback { version: String, error: String },
}

impl InstallOutcome {
    /// The version installed after the operation.
    pub fn version(&self) -> &str {
        match self {
            InstallOutcome::UpToDate { version }
            | InstallOutcome::Checked { version }
            | InstallOutcome::Installed { version, .. }
            | InstallOutcome::OfflineFallback { version, .. } => version,
        }
    }

    pub fn downloaded(&self) -> bool {
        matches!(self, InstallOutcome::Installed { .. })
    }
}

/// Keeps one install directory in sync with the registry.
pub struct AssetInstaller {
    spec: InstallSpec,
    releases: Arc<dyn ReleaseSource>,
    downloader: Arc<dyn AssetDownloader>,
    store: InstallStateStore,
    check_interval: Duration,
}

impl AssetInstaller {
    pub fn new(
        spec: InstallSpec,
        releases: Arc<dyn ReleaseSource>,
        downloader: Arc<dyn AssetDownloader>,
    ) -> Self {
        let store = InstallStateStore::new(&spec.install_dir);
        Self {
            spec,
            releases,
            downloader,
            store,
            check_interval: InstallConfig::CHECK_INTERVAL,
        }
    }

    /// Override the minimum time between two registry checks.
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn spec(&self) -> &InstallSpec {
        &self.spec
    }

    pub fn store(&self) -> &InstallStateStore {
        &self.store
    }

    pub fn executable_path(&self) -> PathBuf {
        self.spec.executable_path()
    }

    /// Current install record (sentinel when nothing is installed).
    pub fn installed_record(&self) -> InstallRecord {
        self.store.read()
    }

    /// Whether a usable install exists: a valid record and an extracted tree.
    pub fn has_install(&self, record: &InstallRecord) -> bool {
        !record.is_sentinel() && self.spec.extracted_dir().is_dir()
    }

    /// Make sure the newest release is installed and intact.
    ///
    /// Asks the registry at most once per check interval. Registry failures
    /// are tolerated when a usable install already exists.
    pub async fn download_server_if_needed(
        &self,
        progress: &dyn ProgressSink,
    ) -> Result<InstallOutcome> {
        self.ensure_installed(progress, false).await
    }

    /// Like [`AssetInstaller::download_server_if_needed`], ignoring the check interval.
    pub async fn check_now(&self, progress: &dyn ProgressSink) -> Result<InstallOutcome> {
        self.ensure_installed(progress, true).await
    }

    async fn ensure_installed(
        &self,
        progress: &dyn ProgressSink,
        force: bool,
    ) -> Result<InstallOutcome> {
        let _lock = InstallLock::acquire_async(&self.spec.install_dir).await?;

        let record = self.store.read();
        let now = now_millis();
        if !force && record.is_fresh(now, self.check_interval) {
            debug!(
                "{} {} checked {} ms ago, skipping registry",
                self.spec.display_name,
                record.version,
                record.millis_since_check(now)
            );
            return Ok(InstallOutcome::UpToDate {
                version: record.version,
            });
        }

        info!("Checking the registry for a new {} version", self.spec.display_name);
        let (release, latest) = match self.fetch_latest().await {
            Ok(found) => found,
            Err(e) if e.is_offline_tolerable() && self.has_install(&record) => {
                warn!(
                    "Could not check for {} updates, keeping {}: {}",
                    self.spec.display_name, record.version, e
                );
                return Ok(InstallOutcome::OfflineFallback {
                    version: record.version,
                    error: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        let installed = record
            .parsed_version()
            .unwrap_or_else(|| Version::new(0, 0, 0));
        let needs_update = latest > installed;
        let corruption = self.inspect_tree().await;

        let reason = if needs_update {
            Some(InstallReason::Update {
                from: record.version.clone(),
            })
        } else {
            corruption.map(InstallReason::Repair)
        };

        let outcome = match reason {
            Some(reason) => {
                match &reason {
                    InstallReason::Update { from } => {
                        info!("Updating {} from {} to {}", self.spec.display_name, from, latest)
                    }
                    InstallReason::Repair(why) => {
                        warn!("Reinstalling {} {}: {}", self.spec.display_name, latest, why)
                    }
                }

                let asset = release.find_asset(&self.spec.asset_name).ok_or_else(|| {
                    WardenError::MissingAsset {
                        project: self.spec.project.project.clone(),
                        asset: self.spec.asset_name.clone(),
                    }
                })?;
                self.install_asset(asset, &latest, progress).await?;

                InstallOutcome::Installed {
                    version: latest.to_string(),
                    reason,
                }
            }
            None => {
                debug!(
                    "{} {} is current (registry has {})",
                    self.spec.display_name, record.version, latest
                );
                InstallOutcome::Checked {
                    version: record.version.clone(),
                }
            }
        };

        // Always restamp so the check window restarts from now
        self.store
            .write(&record.checked_at(outcome.version(), now_millis()))?;

        Ok(outcome)
    }

    async fn fetch_latest(&self) -> Result<(ReleaseDescriptor, Version)> {
        let release = self.releases.latest_release(&self.spec.project).await?;
        let version = release.version()?;
        Ok((release, version))
    }

    async fn inspect_tree(&self) -> Option<CorruptionReason> {
        let dir = self.spec.extracted_dir();
        tokio::task::spawn_blocking(move || CorruptionDetector::inspect(&dir))
            .await
            .unwrap_or_else(|e| {
                warn!("Corruption check failed to run: {}", e);
                None
            })
    }

    async fn install_asset(
        &self,
        asset: &ReleaseAsset,
        version: &Version,
        progress: &dyn ProgressSink,
    ) -> Result<()> {
        let install_dir = &self.spec.install_dir;
        let name = &self.spec.display_name;

        tokio::fs::create_dir_all(install_dir)
            .await
            .map_err(|e| WardenError::io_with_path(e, install_dir))?;

        let archive = self.spec.download_path();
        progress.report(&format!("Downloading {} {}...", name, version));

        let on_progress = |p: DownloadProgress| {
            if let Some(percent) = p.percent() {
                progress.report(&format!("Downloading {} {}: {} %", name, version, percent));
            }
        };
        if let Err(e) = self
            .downloader
            .download(&asset.download_url, &archive, &on_progress)
            .await
        {
            remove_file_quietly(&archive).await;
            return Err(e);
        }

        progress.report(&format!("Unpacking {} {}...", name, version));
        let extracted = self.spec.extracted_dir();
        if let Err(e) = self.replace_tree(&archive, &extracted).await {
            remove_dir_quietly(&extracted).await;
            remove_file_quietly(&archive).await;
            return Err(e);
        }
        remove_file_quietly(&archive).await;

        progress.report(&format!("Initializing {}...", name));
        info!("Installed {} {} into {}", name, version, install_dir.display());
        Ok(())
    }

    async fn replace_tree(&self, archive: &Path, extracted: &Path) -> Result<()> {
        if tokio::fs::try_exists(extracted).await.unwrap_or(false) {
            debug!("Removing previous tree {}", extracted.display());
            tokio::fs::remove_dir_all(extracted)
                .await
                .map_err(|e| WardenError::io_with_path(e, extracted))?;
        }

        extract_zip_async(archive, &self.spec.install_dir).await?;

        if !extracted.is_dir() {
            return Err(WardenError::Extraction {
                archive: archive.to_path_buf(),
                message: format!(
                    "archive does not contain the directory '{}'",
                    self.spec.extracted_dir_name
                ),
            });
        }
        Ok(())
    }
}

async fn remove_file_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

async fn remove_dir_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_for_kind() {
        let settings = Settings {
            install_root: Some(PathBuf::from("/data/warden")),
            ..Settings::default()
        };
        let spec = InstallSpec::for_kind(ServerKind::DebugAdapter, &settings).unwrap();
        assert_eq!(spec.project, ProjectId::new("fwcd", "kotlin-debug-adapter"));
        assert_eq!(spec.asset_name, "adapter.zip");
        assert_eq!(spec.extracted_dir(), PathBuf::from("/data/warden/debugAdapterInstall/adapter"));
        assert_eq!(
            spec.download_path(),
            PathBuf::from("/data/warden/debugAdapterInstall/download-adapter.zip")
        );
        assert!(spec
            .executable_path()
            .starts_with("/data/warden/debugAdapterInstall/adapter/bin"));
    }

    #[test]
    fn test_outcome_version() {
        let outcome = InstallOutcome::Installed {
            version: "1.2.0".into(),
            reason: InstallReason::Update {
                from: "1.1.0".into(),
            },
        };
        assert_eq!(outcome.version(), "1.2.0");
        assert!(outcome.downloaded());
        assert!(!InstallOutcome::Checked {
            version: "1.2.0".into()
        }
        .downloaded());
    }
}
