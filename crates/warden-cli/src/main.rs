//! Warden - installs, updates and runs the Kotlin language tooling servers.
//!
//! `warden run` bridges the server's channel to its own stdin/stdout, so an
//! editor can use it as the server command. Logs go to stderr.

mod bridge;
mod signals;

use anyhow::{anyhow, Context, Result};
use bridge::StdioBridge;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use signals::Hangups;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use warden_core::{
    AssetInstaller, GitHubReleaseClient, HttpAssetDownloader, InstallSpec, InstallStateStore,
    ServerKind, Settings, TracingProgress, TransportConfig,
};
use warden_launcher::{ControllerState, LifecycleController, Sinks};

#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(about = "Keeps the Kotlin language servers installed and running")]
struct Args {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the install root from the settings
    #[arg(long, global = true)]
    install_root: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Install or update a server
    Install {
        #[arg(long, default_value = "language-server")]
        kind: ServerKind,

        /// Ask the registry even if it was asked recently
        #[arg(long)]
        force: bool,
    },
    /// Print the install records as JSON
    Status,
    /// Run a server with its channel bridged to stdin/stdout
    Run {
        #[arg(long, default_value = "language-server")]
        kind: ServerKind,

        /// Transport, overriding the settings
        #[arg(long, value_enum)]
        transport: Option<TransportArg>,

        /// Port for the TCP transport (0 = any free port)
        #[arg(long)]
        port: Option<u16>,

        /// Workspace root, used as the server's working directory
        #[arg(long)]
        workspace: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum TransportArg {
    Stdio,
    Tcp,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let settings = load_settings(&args)?;
    match args.command {
        Command::Install { kind, force } => install(&settings, kind, force).await,
        Command::Status => status(&settings),
        Command::Run {
            kind,
            transport,
            port,
            workspace,
        } => {
            let settings = with_transport(settings, kind, transport, port);
            run(&settings, kind, workspace).await
        }
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = match args.config.clone().or_else(Settings::default_path) {
        Some(path) => Settings::load(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => Settings::default(),
    };
    if let Some(root) = &args.install_root {
        settings.install_root = Some(root.clone());
    }
    Ok(settings)
}

fn with_transport(
    mut settings: Settings,
    kind: ServerKind,
    transport: Option<TransportArg>,
    port: Option<u16>,
) -> Settings {
    let server = settings.server_mut(kind);
    match (transport, port) {
        (Some(TransportArg::Stdio), _) => server.transport = TransportConfig::Stdio,
        (Some(TransportArg::Tcp), port) | (None, port @ Some(_)) => {
            server.transport = TransportConfig::Tcp {
                port: port.unwrap_or(0),
            }
        }
        (None, None) => {}
    }
    settings
}

async fn install(settings: &Settings, kind: ServerKind, force: bool) -> Result<()> {
    if let Some(path) = &settings.server(kind).path {
        warn!(
            "{} uses the custom executable {}, nothing to install",
            kind.display_name(),
            path.display()
        );
        return Ok(());
    }

    let installer = AssetInstaller::new(
        InstallSpec::for_kind(kind, settings)?,
        Arc::new(GitHubReleaseClient::new(&settings.registry)?),
        Arc::new(HttpAssetDownloader::new(&settings.registry.user_agent)?),
    )
    .with_check_interval(settings.check_interval());

    let outcome = if force {
        installer.check_now(&TracingProgress).await?
    } else {
        installer.download_server_if_needed(&TracingProgress).await?
    };
    info!("{} {:?}", kind.display_name(), outcome);

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "kind": kind.as_str(),
            "version": outcome.version(),
            "downloaded": outcome.downloaded(),
            "executable": installer.executable_path(),
        }))?
    );
    Ok(())
}

fn status(settings: &Settings) -> Result<()> {
    let mut report = serde_json::Map::new();
    for kind in ServerKind::all() {
        let install_dir = settings.install_dir(kind)?;
        let record = InstallStateStore::new(&install_dir).read();
        report.insert(
            kind.as_str().to_string(),
            json!({
                "installDir": install_dir,
                "installed": !record.is_sentinel(),
                "record": record,
            }),
        );
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run(settings: &Settings, kind: ServerKind, workspace: Option<PathBuf>) -> Result<()> {
    let working_dir = match workspace {
        Some(dir) => Some(dir),
        None => Some(std::env::current_dir().context("Failed to read the current directory")?),
    };

    let bridge = Arc::new(StdioBridge::spawn());
    let controller =
        LifecycleController::from_settings(kind, settings, working_dir, bridge.clone(), Sinks::default())?;
    controller.start().await?;

    let mut hangups = Hangups::new().context("Failed to listen for SIGHUP")?;
    let mut state = controller.subscribe();
    let outcome = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping {}", kind.display_name());
                break Ok(());
            }
            _ = hangups.recv() => {
                info!("SIGHUP received, restarting {}", kind.display_name());
                if let Err(e) = controller.restart().await {
                    break Err(anyhow::Error::from(e));
                }
            }
            _ = bridge.input_closed() => {
                info!("Client closed the input, stopping {}", kind.display_name());
                break Ok(());
            }
            _ = state.wait_for(|s| *s == ControllerState::Crashed) => {
                break Err(anyhow!("{} crashed", kind.display_name()));
            }
        }
    };

    controller.stop().await?;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_run_arguments() {
        let args = Args::try_parse_from([
            "warden",
            "--debug",
            "run",
            "--kind",
            "debug-adapter",
            "--transport",
            "tcp",
            "--port",
            "4000",
        ])
        .unwrap();

        assert!(args.debug);
        match args.command {
            Command::Run {
                kind,
                transport,
                port,
                workspace,
            } => {
                assert_eq!(kind, ServerKind::DebugAdapter);
                assert_eq!(transport, Some(TransportArg::Tcp));
                assert_eq!(port, Some(4000));
                assert!(workspace.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        assert!(Args::try_parse_from(["warden", "install", "--kind", "compiler"]).is_err());
    }

    #[test]
    fn test_transport_override() {
        let settings = with_transport(
            Settings::default(),
            ServerKind::LanguageServer,
            None,
            Some(7000),
        );
        assert_eq!(
            settings.language_server.transport,
            TransportConfig::Tcp { port: 7000 }
        );

        let settings = with_transport(
            settings,
            ServerKind::LanguageServer,
            Some(TransportArg::Stdio),
            Some(7000),
        );
        assert_eq!(settings.language_server.transport, TransportConfig::Stdio);

        let settings = with_transport(
            settings,
            ServerKind::DebugAdapter,
            Some(TransportArg::Tcp),
            None,
        );
        assert_eq!(
            settings.debug_adapter.transport,
            TransportConfig::Tcp { port: 0 }
        );
    }

    #[test]
    fn test_load_settings_with_overrides() {
        let temp_dir = TempDir::new().unwrap();
        let config = temp_dir.path().join("settings.json");
        std::fs::write(&config, r#"{"checkIntervalSecs": 60}"#).unwrap();

        let args = Args::try_parse_from([
            "warden",
            "status",
            "--config",
            config.to_str().unwrap(),
            "--install-root",
            "/tmp/warden-root",
        ])
        .unwrap();
        let settings = load_settings(&args).unwrap();

        assert_eq!(settings.check_interval_secs, 60);
        assert_eq!(settings.install_root, Some(PathBuf::from("/tmp/warden-root")));
    }
}
