//! Release registry client.
//!
//! Asks the GitHub releases API for the latest release of a project. There is
//! deliberately no retry and no cache here: the installer decides whether a
//! failure is fatal, and the install record is the only cache.

use crate::models::ReleaseDescriptor;
use crate::network::client::HttpClient;
use crate::settings::RegistrySettings;
use crate::{Result, WardenError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Identifies a project on the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectId {
    pub organization: String,
    pub project: String,
}

impl ProjectId {
    pub fn new(organization: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
            project: project.into(),
        }
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.organization, self.project)
    }
}

/// Source of release metadata.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Fetch the latest published release of `project`.
    async fn latest_release(&self, project: &ProjectId) -> Result<ReleaseDescriptor>;
}

/// [`ReleaseSource`] backed by the GitHub REST API.
pub struct GitHubReleaseClient {
    http: Arc<HttpClient>,
    api_base: String,
}

impl GitHubReleaseClient {
    /// Create a client from registry settings.
    pub fn new(settings: &RegistrySettings) -> Result<Self> {
        let http = HttpClient::new(&settings.user_agent)?;
        Ok(Self::with_client(Arc::new(http), &settings.api_base))
    }

    /// Create a client reusing an existing HTTP client.
    pub fn with_client(http: Arc<HttpClient>, api_base: &str) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    /// URL of the "latest release" endpoint for `project`.
    pub fn latest_release_url(&self, project: &ProjectId) -> String {
        format!(
            "{}/repos/{}/{}/releases/latest",
            self.api_base, project.organization, project.project
        )
    }
}

#[async_trait]
impl ReleaseSource for GitHubReleaseClient {
    async fn latest_release(&self, project: &ProjectId) -> Result<ReleaseDescriptor> {
        let url = self.latest_release_url(project);
        info!("Querying registry for the latest release of {}", project);

        let response = self
            .http
            .get_with_headers(&url, &[("Accept", "application/vnd.github+json")])
            .await?;

        let body = response.text().await.map_err(|e| WardenError::Network {
            message: format!("Failed to read response from {}: {}", url, e),
            cause: None,
        })?;

        let release: ReleaseDescriptor =
            serde_json::from_str(&body).map_err(|e| WardenError::Parse {
                what: format!("latest release of {}", project),
                message: e.to_string(),
            })?;

        // A tag that is not a semantic version cannot be compared
        release.version()?;

        debug!(
            "Latest release of {} is {} with {} assets",
            project,
            release.tag_name,
            release.assets.len()
        );
        Ok(release)
    }
}
