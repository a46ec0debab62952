//! Shared fakes for the launcher tests.
//!
//! Servers are small shell scripts written into a temp dir; the registry and
//! downloader are in-memory.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use warden_core::network::{DownloadProgress, ProgressCallback};
use warden_core::{
    AssetDownloader, NotificationSink, OutputSink, ProgressSink, ProjectId, ReleaseAsset,
    ReleaseDescriptor, ReleaseSource, WardenError,
};
use warden_launcher::{ChannelReader, ChannelWriter, DuplexChannel, ProtocolClient};
use zip::write::SimpleFileOptions;

/// Server that echoes the channel back.
pub const ECHO_SERVER: &str = "#!/bin/sh\nexec cat\n";

/// Write an executable script into `dir`.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Collects every line it receives.
#[derive(Default)]
pub struct Recorder {
    lines: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }

    /// Poll until a line containing `needle` shows up.
    pub async fn wait_for(&self, needle: &str, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.contains(needle) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.contains(needle)
    }

    fn push(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }
}

impl OutputSink for Recorder {
    fn append_line(&self, line: &str) {
        self.push(line);
    }
}

impl NotificationSink for Recorder {
    fn notify_error(&self, message: &str) {
        self.push(message);
    }
}

/// Progress sink recording into `recorder`.
pub fn progress_into(recorder: Arc<Recorder>) -> Arc<dyn ProgressSink> {
    Arc::new(move |message: &str| recorder.push(message))
}

/// Protocol client whose handshake is a one-line echo.
#[derive(Default)]
pub struct EchoClient {
    attaches: AtomicUsize,
    detaches: AtomicUsize,
    fail_handshake: AtomicBool,
    channel: Mutex<Option<(ChannelReader, ChannelWriter)>>,
}

impl EchoClient {
    pub fn failing() -> Self {
        let client = Self::default();
        client.fail_handshake.store(true, Ordering::SeqCst);
        client
    }

    pub fn attaches(&self) -> usize {
        self.attaches.load(Ordering::SeqCst)
    }

    pub fn detaches(&self) -> usize {
        self.detaches.load(Ordering::SeqCst)
    }

    pub fn is_attached(&self) -> bool {
        self.channel.lock().unwrap().is_some()
    }
}

#[async_trait]
impl ProtocolClient for EchoClient {
    async fn attach(&self, channel: DuplexChannel) -> warden_core::Result<()> {
        self.attaches.fetch_add(1, Ordering::SeqCst);
        if self.fail_handshake.load(Ordering::SeqCst) {
            return Err(WardenError::Other("handshake rejected".into()));
        }

        let (mut reader, mut writer) = channel.into_parts();
        writer.write_all(b"initialize\n").await?;
        writer.flush().await?;

        let mut line = String::new();
        {
            let mut buffered = BufReader::new(&mut reader);
            tokio::time::timeout(Duration::from_secs(5), buffered.read_line(&mut line))
                .await
                .map_err(|_| WardenError::Other("no handshake reply".into()))??;
        }
        if line.trim() != "initialize" {
            return Err(WardenError::Other(format!("unexpected reply {:?}", line)));
        }

        *self.channel.lock().unwrap() = Some((reader, writer));
        Ok(())
    }

    async fn detach(&self) {
        self.detaches.fetch_add(1, Ordering::SeqCst);
        self.channel.lock().unwrap().take();
    }
}

/// Registry fake; `None` behaves like an unreachable registry.
pub struct FakeRegistry {
    release: Mutex<Option<ReleaseDescriptor>>,
    fetches: AtomicUsize,
}

impl FakeRegistry {
    pub fn new(release: Option<ReleaseDescriptor>) -> Arc<Self> {
        Arc::new(Self {
            release: Mutex::new(release),
            fetches: AtomicUsize::new(0),
        })
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReleaseSource for FakeRegistry {
    async fn latest_release(&self, _project: &ProjectId) -> warden_core::Result<ReleaseDescriptor> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.release
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| WardenError::Network {
                message: "registry unreachable".into(),
                cause: None,
            })
    }
}

/// Downloader fake serving archives from memory.
#[derive(Default)]
pub struct FakeDownloader {
    files: Mutex<HashMap<String, Vec<u8>>>,
    downloads: AtomicUsize,
}

impl FakeDownloader {
    pub fn serve(&self, url: &str, bytes: Vec<u8>) {
        self.files.lock().unwrap().insert(url.to_string(), bytes);
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetDownloader for FakeDownloader {
    async fn download(
        &self,
        url: &str,
        destination: &Path,
        on_progress: ProgressCallback<'_>,
    ) -> warden_core::Result<u64> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let bytes = self
            .files
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| WardenError::HttpStatus {
                url: url.to_string(),
                status: 404,
            })?;

        let total = bytes.len() as u64;
        std::fs::write(destination, &bytes)?;
        on_progress(DownloadProgress {
            bytes_downloaded: total,
            total_bytes: Some(total),
        });
        Ok(total)
    }
}

pub fn release(tag: &str, asset: &str) -> ReleaseDescriptor {
    ReleaseDescriptor {
        tag_name: tag.to_string(),
        assets: vec![ReleaseAsset {
            name: asset.to_string(),
            download_url: format!("https://x/{}/{}", tag, asset),
            size: None,
        }],
    }
}

/// Server archive whose launcher script is `script_body`.
pub fn server_zip(script_body: &str, version: &str) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().unix_permissions(0o755);

    zip.start_file("server/bin/kotlin-language-server", options)
        .unwrap();
    zip.write_all(script_body.as_bytes()).unwrap();
    zip.start_file(format!("server/lib/server-{}.jar", version), options)
        .unwrap();
    zip.write_all(b"jar").unwrap();

    zip.finish().unwrap().into_inner()
}
