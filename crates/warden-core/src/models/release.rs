//! Release metadata as published by the registry.

use crate::{Result, WardenError};
use semver::Version;
use serde::{Deserialize, Serialize};

/// Downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    #[serde(rename = "browser_download_url")]
    pub download_url: String,
    #[serde(default)]
    pub size: Option<u64>,
}

/// The latest release of a project.
///
/// Only the fields the installer needs are modelled; the registry sends more.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDescriptor {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl ReleaseDescriptor {
    /// Parse the tag as a semantic version.
    ///
    /// A leading `v` is accepted (`v1.2.0` and `1.2.0` are the same release).
    pub fn version(&self) -> Result<Version> {
        parse_version(&self.tag_name)
    }

    /// Find the asset whose name matches exactly.
    pub fn find_asset(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|a| a.name == name)
    }
}

/// Parse a version string, tolerating a leading `v`.
pub fn parse_version(raw: &str) -> Result<Version> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Version::parse(trimmed).map_err(|_| WardenError::InvalidVersion {
        version: raw.to_string(),
    })
}
