//! Asset downloads with progress reporting.

use crate::config::NetworkConfig;
use crate::network::client::HttpClient;
use crate::{Result, WardenError};
use async_trait::async_trait;
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Progress information for a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    /// Bytes downloaded so far.
    pub bytes_downloaded: u64,
    /// Total bytes (if the server sent a length).
    pub total_bytes: Option<u64>,
}

impl DownloadProgress {
    /// Percentage complete (0-100), if the total is known.
    pub fn percent(&self) -> Option<u8> {
        self.total_bytes.map(|total| {
            if total == 0 {
                100
            } else {
                let pct = self.bytes_downloaded.saturating_mul(100) / total;
                u8::try_from(pct.min(100)).unwrap_or(100)
            }
        })
    }
}

/// Callback receiving download progress.
pub type ProgressCallback<'a> = &'a (dyn Fn(DownloadProgress) + Send + Sync);

/// Fetches release assets to local files.
#[async_trait]
pub trait AssetDownloader: Send + Sync {
    /// Download `url` into `destination`, returning the number of bytes written.
    ///
    /// `destination` is created or truncated. On failure it may hold a
    /// partial file; the caller owns its cleanup.
    async fn download(
        &self,
        url: &str,
        destination: &Path,
        on_progress: ProgressCallback<'_>,
    ) -> Result<u64>;
}

/// [`AssetDownloader`] that streams over HTTP.
pub struct HttpAssetDownloader {
    http: Arc<HttpClient>,
}

impl HttpAssetDownloader {
    pub fn new(user_agent: &str) -> Result<Self> {
        Ok(Self {
            http: Arc::new(HttpClient::for_downloads(user_agent)?),
        })
    }

    pub fn with_client(http: Arc<HttpClient>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl AssetDownloader for HttpAssetDownloader {
    async fn download(
        &self,
        url: &str,
        destination: &Path,
        on_progress: ProgressCallback<'_>,
    ) -> Result<u64> {
        info!("Downloading {} to {}", url, destination.display());

        let response = self.http.get(url).await?;
        let total_bytes = response.content_length();

        let mut file = tokio::fs::File::create(destination)
            .await
            .map_err(|e| WardenError::io_with_path(e, destination))?;

        let mut reporter = ProgressReporter::new(total_bytes, on_progress);
        reporter.start();

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| WardenError::Network {
                message: format!("Error reading download stream from {}: {}", url, e),
                cause: None,
            })?;

            file.write_all(&chunk)
                .await
                .map_err(|e| WardenError::io_with_path(e, destination))?;

            reporter.advance(chunk.len() as u64);
        }

        file.flush()
            .await
            .map_err(|e| WardenError::io_with_path(e, destination))?;
        file.sync_all()
            .await
            .map_err(|e| WardenError::io_with_path(e, destination))?;

        let bytes = reporter.finish();
        debug!("Downloaded {} bytes from {}", bytes, url);
        Ok(bytes)
    }
}

/// Throttles progress callbacks to whole-percent steps.
pub(crate) struct ProgressReporter<'a> {
    total_bytes: Option<u64>,
    bytes_downloaded: u64,
    last_percent: Option<u8>,
    on_progress: ProgressCallback<'a>,
}

impl<'a> ProgressReporter<'a> {
    pub(crate) fn new(total_bytes: Option<u64>, on_progress: ProgressCallback<'a>) -> Self {
        Self {
            total_bytes,
            bytes_downloaded: 0,
            last_percent: None,
            on_progress,
        }
    }

    pub(crate) fn start(&mut self) {
        self.emit();
    }

    pub(crate) fn advance(&mut self, bytes: u64) {
        self.bytes_downloaded += bytes;
        let progress = self.snapshot();
        match (progress.percent(), self.last_percent) {
            (Some(pct), Some(last)) if pct < last.saturating_add(NetworkConfig::PROGRESS_STEP_PERCENT) => {}
            // Unknown total: nothing meaningful to report per chunk
            (None, _) => {}
            _ => self.emit(),
        }
    }

    pub(crate) fn finish(mut self) -> u64 {
        if self.last_percent != Some(100) {
            self.emit();
        }
        self.bytes_downloaded
    }

    fn snapshot(&self) -> DownloadProgress {
        DownloadProgress {
            bytes_downloaded: self.bytes_downloaded,
            total_bytes: self.total_bytes,
        }
    }

    fn emit(&mut self) {
        let progress = self.snapshot();
        self.last_percent = progress.percent();
        (self.on_progress)(progress);
    }
}
