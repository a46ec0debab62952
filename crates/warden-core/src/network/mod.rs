//! Registry access and asset downloads.

pub mod client;
pub mod download;
pub mod github;

pub use client::{HttpClient, RateLimitState};
pub use download::{AssetDownloader, DownloadProgress, HttpAssetDownloader, ProgressCallback};
pub use github::{GitHubReleaseClient, ProjectId, ReleaseSource};
