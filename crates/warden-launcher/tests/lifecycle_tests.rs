//! Lifecycle controller tests: install, launch, restart and failure reporting.

#![cfg(unix)]

mod common;

use common::{
    progress_into, release, server_zip, write_script, EchoClient, FakeDownloader, FakeRegistry,
    Recorder, ECHO_SERVER,
};
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use warden_core::{
    AssetInstaller, ErrorKind, InstallSpec, JavaLocator, ServerKind, Settings, TransportConfig,
    WardenError,
};
use warden_launcher::{
    ControllerConfig, ControllerState, ExecutableSource, LifecycleController, Sinks,
};

const NAME: &str = "Kotlin Language Server";

struct Harness {
    controller: Arc<LifecycleController>,
    client: Arc<EchoClient>,
    output: Arc<Recorder>,
    progress: Arc<Recorder>,
    notifications: Arc<Recorder>,
    _temp_dir: TempDir,
}

impl Harness {
    fn build(source: ExecutableSource, client: EchoClient, temp_dir: TempDir) -> Self {
        Self::with_config(source, client, temp_dir, ControllerConfig::new(NAME, TransportConfig::Stdio))
    }

    fn with_config(
        source: ExecutableSource,
        client: EchoClient,
        temp_dir: TempDir,
        config: ControllerConfig,
    ) -> Self {
        let client = Arc::new(client);
        let output = Arc::new(Recorder::default());
        let progress = Arc::new(Recorder::default());
        let notifications = Arc::new(Recorder::default());
        let sinks = Sinks {
            progress: progress_into(progress.clone()),
            output: output.clone(),
            notifier: notifications.clone(),
        };
        let controller = Arc::new(LifecycleController::new(source, config, client.clone(), sinks));

        Self {
            controller,
            client,
            output,
            progress,
            notifications,
            _temp_dir: temp_dir,
        }
    }

    /// Controller running `body` as a user-supplied executable.
    fn custom(body: &str) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let script = write_script(temp_dir.path(), "server", body);
        Self::build(ExecutableSource::Custom(script), EchoClient::default(), temp_dir)
    }

    async fn wait_for_state(&self, expected: ControllerState) {
        let mut rx = self.controller.subscribe();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == expected))
            .await
            .expect("state change timed out")
            .unwrap();
    }
}

/// Managed install backed by fake registry and downloader.
fn managed(
    published: Option<&str>,
) -> (ExecutableSource, Arc<FakeRegistry>, Arc<FakeDownloader>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let settings = Settings {
        install_root: Some(temp_dir.path().to_path_buf()),
        ..Settings::default()
    };

    let registry = FakeRegistry::new(published.map(|tag| release(tag, "server.zip")));
    let downloader = Arc::new(FakeDownloader::default());
    if let Some(tag) = published {
        downloader.serve(
            &format!("https://x/{}/server.zip", tag),
            server_zip(ECHO_SERVER, tag),
        );
    }

    let installer = AssetInstaller::new(
        InstallSpec::for_kind(ServerKind::LanguageServer, &settings).unwrap(),
        registry.clone(),
        downloader.clone(),
    );
    (
        ExecutableSource::Managed(Arc::new(installer)),
        registry,
        downloader,
        temp_dir,
    )
}

#[tokio::test]
async fn test_start_installs_and_runs() {
    let (source, registry, downloader, temp_dir) = managed(Some("1.0.0"));
    let harness = Harness::build(source, EchoClient::default(), temp_dir);
    assert_eq!(harness.controller.state(), ControllerState::Uninstalled);

    harness.controller.start().await.unwrap();

    assert_eq!(harness.controller.state(), ControllerState::Running);
    assert_eq!(registry.fetches(), 1);
    assert_eq!(downloader.downloads(), 1);
    assert_eq!(harness.client.attaches(), 1);
    assert!(harness.client.is_attached());
    assert!(harness.controller.server_pid().await.is_some());
    assert!(harness.progress.contains("Downloading Kotlin Language Server 1.0.0"));
    assert!(harness.progress.contains("Initializing Kotlin Language Server..."));
    assert!(harness.progress.contains("Starting Kotlin Language Server..."));

    harness.controller.stop().await.unwrap();
    assert_eq!(harness.controller.state(), ControllerState::Idle);
    assert_eq!(harness.client.detaches(), 1);
    assert!(!harness.client.is_attached());
    assert!(harness.controller.server_pid().await.is_none());
    assert!(harness.output.contains("The Kotlin Language Server exited"));
    assert!(harness.notifications.lines().is_empty());
}

#[tokio::test]
async fn test_second_start_within_window_skips_registry() {
    let (source, registry, downloader, temp_dir) = managed(Some("1.0.0"));
    let harness = Harness::build(source, EchoClient::default(), temp_dir);

    harness.controller.start().await.unwrap();
    harness.controller.stop().await.unwrap();
    harness.controller.start().await.unwrap();

    assert_eq!(registry.fetches(), 1);
    assert_eq!(downloader.downloads(), 1);
    assert_eq!(harness.client.attaches(), 2);
    harness.controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_offline_first_start_notifies_once() {
    let (source, registry, downloader, temp_dir) = managed(None);
    let harness = Harness::build(source, EchoClient::default(), temp_dir);

    let err = harness.controller.start().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Network);
    assert_eq!(registry.fetches(), 1);
    assert_eq!(downloader.downloads(), 0);
    assert_eq!(harness.client.attaches(), 0);
    assert!(harness.controller.server_pid().await.is_none());
    assert_eq!(harness.controller.state(), ControllerState::Uninstalled);

    let notifications = harness.notifications.lines();
    assert_eq!(notifications.len(), 1);
    assert!(notifications[0].starts_with("Failed to start Kotlin Language Server"));
}

#[tokio::test]
async fn test_restart_writes_separator() {
    let harness = Harness::custom(ECHO_SERVER);
    harness.controller.start().await.unwrap();
    let first_pid = harness.controller.server_pid().await;

    harness.controller.restart().await.unwrap();

    assert_eq!(harness.controller.state(), ControllerState::Running);
    assert_ne!(harness.controller.server_pid().await, first_pid);
    assert_eq!(harness.client.attaches(), 2);
    assert_eq!(harness.client.detaches(), 1);

    let lines = harness.output.lines();
    let marker = lines
        .iter()
        .position(|line| line == " === Kotlin Language Server Restart ===")
        .expect("restart separator");
    assert_eq!(lines[marker - 1], "");
    assert_eq!(lines[marker + 1], "");
    // The old server's exit line comes first
    assert!(lines[..marker]
        .iter()
        .any(|line| line.starts_with("The Kotlin Language Server exited")));

    harness.controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_restart_requires_running_or_crashed() {
    let harness = Harness::custom(ECHO_SERVER);

    let err = harness.controller.restart().await.unwrap_err();
    assert!(matches!(err, WardenError::InvalidState { .. }));
    assert_eq!(err.to_string(), "Cannot restart while idle");
    assert_eq!(harness.client.attaches(), 0);
    assert!(harness.notifications.lines().is_empty());
}

#[tokio::test]
async fn test_start_while_running_is_invalid() {
    let harness = Harness::custom(ECHO_SERVER);
    harness.controller.start().await.unwrap();

    let err = harness.controller.start().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(harness.client.attaches(), 1);

    harness.controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_when_idle_is_noop() {
    let harness = Harness::custom(ECHO_SERVER);

    harness.controller.stop().await.unwrap();
    harness.controller.stop().await.unwrap();

    assert_eq!(harness.controller.state(), ControllerState::Idle);
    assert_eq!(harness.client.detaches(), 0);
}

#[tokio::test]
async fn test_crash_moves_to_crashed_and_restarts() {
    // Answers the handshake, then dies
    let harness = Harness::custom("#!/bin/sh\nread line\necho \"$line\"\nexit 4\n");

    harness.controller.start().await.unwrap();
    harness.wait_for_state(ControllerState::Crashed).await;
    assert!(
        harness
            .output
            .wait_for(
                "The Kotlin Language Server exited, code: 4, signal: none",
                Duration::from_secs(5)
            )
            .await
    );
    assert!(harness.notifications.lines().is_empty());

    harness.controller.restart().await.unwrap();
    assert_eq!(harness.client.attaches(), 2);
    harness.wait_for_state(ControllerState::Crashed).await;

    harness.controller.start().await.unwrap();
    assert_eq!(harness.client.attaches(), 3);
    harness.wait_for_state(ControllerState::Crashed).await;
    harness.controller.stop().await.unwrap();
    assert_eq!(harness.controller.state(), ControllerState::Idle);
}

#[tokio::test]
async fn test_failed_handshake_stops_server() {
    let temp_dir = TempDir::new().unwrap();
    let script = write_script(temp_dir.path(), "server", ECHO_SERVER);
    let harness = Harness::build(ExecutableSource::Custom(script), EchoClient::failing(), temp_dir);

    let err = harness.controller.start().await.unwrap_err();

    assert_eq!(err.to_string(), "handshake rejected");
    assert_eq!(harness.controller.state(), ControllerState::Idle);
    assert!(harness.controller.server_pid().await.is_none());
    assert_eq!(harness.notifications.lines().len(), 1);
    assert!(
        harness
            .output
            .wait_for("The Kotlin Language Server exited", Duration::from_secs(5))
            .await
    );
}

#[tokio::test]
async fn test_missing_java_fails_before_spawn() {
    let temp_dir = TempDir::new().unwrap();
    let marker = temp_dir.path().join("spawned");
    let script = write_script(
        temp_dir.path(),
        "server",
        &format!("#!/bin/sh\ntouch '{}'\nexec cat\n", marker.display()),
    );
    let empty_path = TempDir::new().unwrap();

    let mut config = ControllerConfig::new(NAME, TransportConfig::Stdio);
    config.java = Some(JavaLocator::new(
        None,
        None,
        Some(OsString::from(empty_path.path())),
    ));
    let harness = Harness::with_config(
        ExecutableSource::Custom(script),
        EchoClient::default(),
        temp_dir,
        config,
    );

    let err = harness.controller.start().await.unwrap_err();

    assert!(matches!(err, WardenError::JavaNotFound { searched: 1 }));
    assert!(!marker.exists());
    assert_eq!(harness.notifications.lines().len(), 1);
    assert_eq!(harness.controller.state(), ControllerState::Idle);
}

#[tokio::test]
async fn test_server_sees_located_java_home() {
    let temp_dir = TempDir::new().unwrap();
    let jdk = temp_dir.path().join("jdk-17");
    std::fs::create_dir_all(jdk.join("bin")).unwrap();
    std::fs::write(jdk.join("bin").join("java"), b"").unwrap();
    let script = write_script(
        temp_dir.path(),
        "server",
        "#!/bin/sh\necho \"JAVA_HOME=$JAVA_HOME\" >&2\nexec cat\n",
    );

    let java_home = std::env::join_paths([temp_dir.path().join("missing"), jdk.clone()]).unwrap();
    let settings = Settings {
        java_home: Some(PathBuf::from(java_home)),
        ..Settings::default()
    };
    let config = ControllerConfig::from_settings(ServerKind::LanguageServer, &settings, None);
    let harness = Harness::with_config(
        ExecutableSource::Custom(script),
        EchoClient::default(),
        temp_dir,
        config,
    );

    harness.controller.start().await.unwrap();

    let expected = format!("JAVA_HOME={}", jdk.display());
    assert!(harness.output.wait_for(&expected, Duration::from_secs(5)).await);
    harness.controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_missing_custom_executable_is_spawn_error() {
    let temp_dir = TempDir::new().unwrap();
    let harness = Harness::build(
        ExecutableSource::Custom(PathBuf::from("/nonexistent/kotlin-language-server")),
        EchoClient::default(),
        temp_dir,
    );

    let err = harness.controller.start().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProcessSpawn);
    assert_eq!(harness.notifications.lines().len(), 1);
}

#[tokio::test]
async fn test_concurrent_restarts_run_in_order() {
    let harness = Harness::custom(ECHO_SERVER);
    harness.controller.start().await.unwrap();

    let first = {
        let controller = harness.controller.clone();
        tokio::spawn(async move { controller.restart().await })
    };
    let second = {
        let controller = harness.controller.clone();
        tokio::spawn(async move { controller.restart().await })
    };
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    assert_eq!(harness.controller.state(), ControllerState::Running);
    assert_eq!(harness.client.attaches(), 3);
    assert_eq!(harness.client.detaches(), 2);

    let separators = harness
        .output
        .lines()
        .iter()
        .filter(|line| line.contains("Restart ==="))
        .count();
    assert_eq!(separators, 2);
    assert!(harness.notifications.lines().is_empty());

    harness.controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_state_changes_are_published() {
    let harness = Harness::custom(ECHO_SERVER);
    let mut rx = harness.controller.subscribe();

    harness.controller.start().await.unwrap();
    assert!(rx.has_changed().unwrap());
    assert_eq!(*rx.borrow_and_update(), ControllerState::Running);

    harness.controller.stop().await.unwrap();
    assert_eq!(*rx.borrow_and_update(), ControllerState::Idle);
}
