//! Top-level orchestration of one server kind.
//!
//! ```text
//! Uninstalled -> Installing -> Idle -> Launching -> Running
//!                                                   |-> Stopping -> Idle
//!                                                   '-> Crashed
//! ```
//!
//! `start`, `stop` and `restart` hold one async mutex for their whole
//! duration, so overlapping calls run one after another in arrival order.

use crate::supervisor::{LaunchRequest, ProcessState, ProcessSupervisor, ServerProcessHandle};
use crate::transport::DuplexChannel;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use warden_core::config::LaunchConfig;
use warden_core::platform::{is_executable, set_executable};
use warden_core::{
    AssetInstaller, GitHubReleaseClient, HttpAssetDownloader, InstallSpec, JavaLocator,
    JavaRuntime, NotificationSink, OutputSink, ProgressSink, Result, ServerKind, Settings, TracingNotifier,
    TracingOutput, TracingProgress, TransportConfig, WardenError,
};

/// The protocol side of a server connection.
///
/// The wire protocol itself is not this crate's business; the client only
/// has to take the channel and say when the server is ready.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Take over `channel` and complete the ready handshake.
    async fn attach(&self, channel: DuplexChannel) -> Result<()>;

    /// Release everything tied to the current channel.
    async fn detach(&self);
}

/// Where the server executable comes from.
pub enum ExecutableSource {
    /// Installed and updated from the release registry.
    Managed(Arc<AssetInstaller>),
    /// A user-supplied executable; never installed or updated.
    Custom(PathBuf),
}

/// Controller state, see the module docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerState {
    Uninstalled,
    Installing,
    Idle,
    Launching,
    Running,
    Stopping,
    Crashed,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControllerState::Uninstalled => "uninstalled",
            ControllerState::Installing => "installing",
            ControllerState::Idle => "idle",
            ControllerState::Launching => "launching",
            ControllerState::Running => "running",
            ControllerState::Stopping => "stopping",
            ControllerState::Crashed => "crashed",
        };
        f.write_str(name)
    }
}

/// Launch parameters shared by every start and restart.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub display_name: String,
    pub transport: TransportConfig,
    pub env: Vec<(String, String)>,
    pub working_dir: Option<PathBuf>,
    /// Checked before every launch; `None` skips the Java check.
    pub java: Option<JavaLocator>,
    pub rendezvous_timeout: Duration,
    pub stop_timeout: Duration,
}

impl ControllerConfig {
    pub fn new(display_name: impl Into<String>, transport: TransportConfig) -> Self {
        Self {
            display_name: display_name.into(),
            transport,
            env: Vec::new(),
            working_dir: None,
            java: None,
            rendezvous_timeout: LaunchConfig::RENDEZVOUS_TIMEOUT,
            stop_timeout: LaunchConfig::STOP_TIMEOUT,
        }
    }

    /// Configuration for `kind` from user settings.
    ///
    /// Exports the debug-attach agent flag through the kind's JVM options
    /// variable. `javaHome` only seeds the Java search; the home actually
    /// located is exported at launch.
    pub fn from_settings(kind: ServerKind, settings: &Settings, working_dir: Option<PathBuf>) -> Self {
        let server = settings.server(kind);
        let mut env = Vec::new();
        if let Some(flag) = server.debug_attach.jvm_agent_flag() {
            env.push((kind.jvm_options_env().to_string(), flag));
        }

        Self {
            display_name: kind.display_name().to_string(),
            transport: server.transport,
            env,
            working_dir,
            java: Some(JavaLocator::from_env(settings.java_home.as_deref())),
            rendezvous_timeout: settings.rendezvous_timeout(),
            stop_timeout: settings.stop_timeout(),
        }
    }

    /// Request for `executable`; a runtime found under a home exports that
    /// home as `JAVA_HOME`, replacing any configured entry.
    fn launch_request(&self, executable: PathBuf, java: Option<&JavaRuntime>) -> LaunchRequest {
        let mut request = LaunchRequest::new(executable, self.transport)
            .label(self.display_name.clone())
            .rendezvous_timeout(self.rendezvous_timeout)
            .stop_timeout(self.stop_timeout);
        request.env = self.env.clone();
        if let Some(home) = java.and_then(|runtime| runtime.home.as_ref()) {
            request.env.retain(|(key, _)| key != "JAVA_HOME");
            request
                .env
                .push(("JAVA_HOME".to_string(), home.display().to_string()));
        }
        request.working_dir = self.working_dir.clone();
        request
    }
}

/// Reporting sinks of a controller.
#[derive(Clone)]
pub struct Sinks {
    pub progress: Arc<dyn ProgressSink>,
    pub output: Arc<dyn OutputSink>,
    pub notifier: Arc<dyn NotificationSink>,
}

impl Default for Sinks {
    fn default() -> Self {
        Self {
            progress: Arc::new(TracingProgress),
            output: Arc::new(TracingOutput),
            notifier: Arc::new(TracingNotifier),
        }
    }
}

struct CurrentServer {
    handle: ServerProcessHandle,
    crash_watch: JoinHandle<()>,
}

/// Installs, launches and supervises one server.
pub struct LifecycleController {
    source: ExecutableSource,
    config: ControllerConfig,
    supervisor: ProcessSupervisor,
    client: Arc<dyn ProtocolClient>,
    sinks: Sinks,
    state: Arc<watch::Sender<ControllerState>>,
    current: Mutex<Option<CurrentServer>>,
}

impl LifecycleController {
    pub fn new(
        source: ExecutableSource,
        config: ControllerConfig,
        client: Arc<dyn ProtocolClient>,
        sinks: Sinks,
    ) -> Self {
        let initial = match &source {
            ExecutableSource::Managed(installer) => {
                if installer.has_install(&installer.installed_record()) {
                    ControllerState::Idle
                } else {
                    ControllerState::Uninstalled
                }
            }
            ExecutableSource::Custom(_) => ControllerState::Idle,
        };
        let (state, _) = watch::channel(initial);

        Self {
            source,
            config,
            supervisor: ProcessSupervisor::new(sinks.output.clone()),
            client,
            sinks,
            state: Arc::new(state),
            current: Mutex::new(None),
        }
    }

    /// Controller for `kind` as configured in `settings`.
    pub fn from_settings(
        kind: ServerKind,
        settings: &Settings,
        working_dir: Option<PathBuf>,
        client: Arc<dyn ProtocolClient>,
        sinks: Sinks,
    ) -> Result<Self> {
        let server = settings.server(kind);
        if !server.enabled {
            return Err(WardenError::Config {
                message: format!("{} is disabled in the settings", kind.display_name()),
            });
        }

        let source = match &server.path {
            Some(path) => ExecutableSource::Custom(path.clone()),
            None => {
                let installer = AssetInstaller::new(
                    InstallSpec::for_kind(kind, settings)?,
                    Arc::new(GitHubReleaseClient::new(&settings.registry)?),
                    Arc::new(HttpAssetDownloader::new(&settings.registry.user_agent)?),
                )
                .with_check_interval(settings.check_interval());
                ExecutableSource::Managed(Arc::new(installer))
            }
        };

        Ok(Self::new(
            source,
            ControllerConfig::from_settings(kind, settings, working_dir),
            client,
            sinks,
        ))
    }

    pub fn state(&self) -> ControllerState {
        *self.state.borrow()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<ControllerState> {
        self.state.subscribe()
    }

    /// Process id of the current server, if one is running.
    pub async fn server_pid(&self) -> Option<u32> {
        self.current.lock().await.as_ref().and_then(|c| c.handle.pid())
    }

    /// Transport of the current server, with the resolved port.
    pub async fn server_transport(&self) -> Option<TransportConfig> {
        self.current.lock().await.as_ref().map(|c| c.handle.transport())
    }

    /// Install if needed, launch, and wait for the protocol client.
    ///
    /// Valid from `Uninstalled`, `Idle` and `Crashed`. A failure is reported
    /// to the notification sink once and returned.
    pub async fn start(&self) -> Result<()> {
        let mut current = self.current.lock().await;

        let state = self.state();
        if !matches!(
            state,
            ControllerState::Uninstalled | ControllerState::Idle | ControllerState::Crashed
        ) {
            return Err(invalid_state("start", state));
        }

        if state == ControllerState::Crashed {
            self.release(&mut current).await;
            self.set_state(ControllerState::Idle);
        }
        let result = self.launch(&mut current).await;
        if let Err(e) = &result {
            self.report_failure("start", e);
        }
        result
    }

    /// Stop the current server. A no-op when nothing runs.
    pub async fn stop(&self) -> Result<()> {
        let mut current = self.current.lock().await;

        if matches!(
            self.state(),
            ControllerState::Uninstalled | ControllerState::Idle
        ) {
            debug!("{} is not running", self.config.display_name);
            return Ok(());
        }

        self.set_state(ControllerState::Stopping);
        self.release(&mut current).await;
        self.set_state(ControllerState::Idle);
        info!("{} stopped", self.config.display_name);
        Ok(())
    }

    /// Stop the current server and launch a new one with the same parameters.
    ///
    /// Valid from `Running` and `Crashed`.
    pub async fn restart(&self) -> Result<()> {
        let mut current = self.current.lock().await;

        let state = self.state();
        if !matches!(state, ControllerState::Running | ControllerState::Crashed) {
            return Err(invalid_state("restart", state));
        }

        self.set_state(ControllerState::Stopping);
        self.release(&mut current).await;
        self.set_state(ControllerState::Idle);

        self.sinks.output.append_line("");
        self.sinks
            .output
            .append_line(&format!(" === {} Restart ===", self.config.display_name));
        self.sinks.output.append_line("");

        let result = self.launch(&mut current).await;
        if let Err(e) = &result {
            self.report_failure("restart", e);
        }
        result
    }

    async fn launch(&self, current: &mut Option<CurrentServer>) -> Result<()> {
        let name = &self.config.display_name;

        self.set_state(ControllerState::Installing);
        let executable = self.resolve_executable().await?;
        self.set_state(ControllerState::Idle);

        self.set_state(ControllerState::Launching);
        let java = self
            .config
            .java
            .as_ref()
            .map(JavaLocator::require)
            .transpose()?;

        self.sinks.progress.report(&format!(
            "Starting {}{}...",
            name,
            self.config.transport.status_suffix()
        ));
        let request = self.config.launch_request(executable, java.as_ref());
        let mut handle = self.supervisor.launch(&request).await?;

        let channel = handle.take_channel().ok_or_else(|| {
            WardenError::Other(format!("{} channel was already taken", name))
        })?;
        if let Err(e) = self.client.attach(channel).await {
            warn!("{} handshake failed: {}", name, e);
            self.client.detach().await;
            handle.stop().await;
            return Err(e);
        }

        handle.mark_running();
        self.set_state(ControllerState::Running);
        let crash_watch = self.watch_for_crash(handle.subscribe());
        *current = Some(CurrentServer {
            handle,
            crash_watch,
        });

        info!("{} is running", name);
        Ok(())
    }

    async fn resolve_executable(&self) -> Result<PathBuf> {
        match &self.source {
            ExecutableSource::Custom(path) => {
                debug!("Using custom executable {}", path.display());
                Ok(path.clone())
            }
            ExecutableSource::Managed(installer) => {
                let outcome = installer
                    .download_server_if_needed(self.sinks.progress.as_ref())
                    .await?;
                debug!("{} install: {:?}", self.config.display_name, outcome);

                let executable = installer.executable_path();
                if !executable.is_file() {
                    return Err(WardenError::ProcessSpawn {
                        program: executable,
                        message: "launcher script is missing from the install".to_string(),
                        source: None,
                    });
                }
                if !is_executable(&executable) {
                    set_executable(&executable)?;
                }
                Ok(executable)
            }
        }
    }

    /// Tear down the current server and everything tied to it.
    async fn release(&self, current: &mut Option<CurrentServer>) {
        if let Some(mut server) = current.take() {
            server.crash_watch.abort();
            self.client.detach().await;
            let summary = server.handle.stop().await;
            debug!("{} released ({})", self.config.display_name, summary);
        }
    }

    fn watch_for_crash(&self, mut process: watch::Receiver<ProcessState>) -> JoinHandle<()> {
        let state = self.state.clone();
        let name = self.config.display_name.clone();
        tokio::spawn(async move {
            let crashed = match process.wait_for(ProcessState::is_terminal).await {
                Ok(process_state) => matches!(*process_state, ProcessState::Crashed(_)),
                Err(_) => false,
            };
            if crashed {
                let changed = state.send_if_modified(|s| {
                    if *s == ControllerState::Running {
                        *s = ControllerState::Crashed;
                        true
                    } else {
                        false
                    }
                });
                if changed {
                    warn!("{} crashed", name);
                }
            }
        })
    }

    fn report_failure(&self, operation: &str, error: &WardenError) {
        let fallback = match &self.source {
            ExecutableSource::Managed(installer)
                if !installer.has_install(&installer.installed_record()) =>
            {
                ControllerState::Uninstalled
            }
            _ => ControllerState::Idle,
        };
        self.set_state(fallback);
        self.sinks.notifier.notify_error(&format!(
            "Failed to {} {}: {}",
            operation, self.config.display_name, error
        ));
    }

    fn set_state(&self, next: ControllerState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!("{}: {} -> {}", self.config.display_name, previous, next);
        }
    }
}

fn invalid_state(operation: &str, state: ControllerState) -> WardenError {
    WardenError::InvalidState {
        operation: operation.to_string(),
        state: state.to_string(),
    }
}
