//! Warden Core - acquisition of externally published language servers.
//!
//! This crate keeps a locally cached server release in sync with its release
//! registry: it asks the registry at most once per check window, downloads and
//! extracts newer (or damaged) installs, and records what is installed.
//! Launching the installed server is the job of `warden-launcher`.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use warden_core::{
//!     AssetInstaller, GitHubReleaseClient, HttpAssetDownloader, InstallSpec, ServerKind,
//!     Settings, TracingProgress,
//! };
//!
//! #[tokio::main]
//! async fn main() -> warden_core::Result<()> {
//!     let settings = Settings::default();
//!     let installer = AssetInstaller::new(
//!         InstallSpec::for_kind(ServerKind::LanguageServer, &settings)?,
//!         Arc::new(GitHubReleaseClient::new(&settings.registry)?),
//!         Arc::new(HttpAssetDownloader::new(&settings.registry.user_agent)?),
//!     );
//!
//!     let outcome = installer.download_server_if_needed(&TracingProgress).await?;
//!     println!("Installed {}", outcome.version());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod install;
pub mod metadata;
pub mod models;
pub mod network;
pub mod platform;
pub mod settings;
pub mod sink;

// Re-export commonly used types
pub use config::ServerKind;
pub use error::{ErrorKind, Result, WardenError};
pub use install::{
    AssetInstaller, CorruptionDetector, CorruptionReason, InstallOutcome, InstallReason,
    InstallSpec,
};
pub use metadata::InstallStateStore;
pub use models::{InstallRecord, ReleaseAsset, ReleaseDescriptor, TransportConfig};
pub use network::{
    AssetDownloader, GitHubReleaseClient, HttpAssetDownloader, ProjectId, ReleaseSource,
};
pub use platform::{JavaLocator, JavaRuntime};
pub use settings::{DebugAttach, RegistrySettings, ServerSettings, Settings};
pub use sink::{
    NotificationSink, NullSink, OutputSink, ProgressSink, TracingNotifier, TracingOutput,
    TracingProgress,
};
