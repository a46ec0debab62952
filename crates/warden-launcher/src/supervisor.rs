//! Server process supervision.
//!
//! [`ProcessSupervisor::launch`] spawns the server, establishes the duplex
//! channel for the requested transport and hands back a
//! [`ServerProcessHandle`]. A background task owns the child process: it
//! forwards output lines, waits for the exit and publishes the final state.
//!
//! Handle states: `Spawning -> Connected -> Running -> {Stopped | Crashed}`.
//! `Stopped` is reached through [`ServerProcessHandle::stop`]; any other exit
//! is `Crashed`. Nothing is restarted automatically.

use crate::rendezvous::TcpRendezvous;
use crate::transport::DuplexChannel;
use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use warden_core::config::LaunchConfig;
use warden_core::{OutputSink, Result, TransportConfig, WardenError};

/// How long output forwarding may lag behind the exit before the summary is written.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Everything needed to spawn one server process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    /// Name used in output and log lines.
    pub label: String,
    pub executable: PathBuf,
    /// Arguments before the transport arguments.
    pub args: Vec<String>,
    pub transport: TransportConfig,
    pub env: Vec<(String, String)>,
    pub working_dir: Option<PathBuf>,
    pub rendezvous_timeout: Duration,
    pub stop_timeout: Duration,
}

impl LaunchRequest {
    pub fn new(executable: impl Into<PathBuf>, transport: TransportConfig) -> Self {
        Self {
            label: "server".to_string(),
            executable: executable.into(),
            args: Vec::new(),
            transport,
            env: Vec::new(),
            working_dir: None,
            rendezvous_timeout: LaunchConfig::RENDEZVOUS_TIMEOUT,
            stop_timeout: LaunchConfig::STOP_TIMEOUT,
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn rendezvous_timeout(mut self, timeout: Duration) -> Self {
        self.rendezvous_timeout = timeout;
        self
    }

    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }
}

/// Exit code and terminating signal of a finished process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitSummary {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitSummary {
    pub fn from_status(status: &ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for ExitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |value: Option<i32>| value.map_or_else(|| "none".to_string(), |v| v.to_string());
        write!(
            f,
            "exited, code: {}, signal: {}",
            show(self.code),
            show(self.signal)
        )
    }
}

/// Lifecycle state of one server process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessState {
    /// Process created, channel not yet established.
    Spawning,
    /// Channel established, protocol client not yet ready.
    Connected,
    Running,
    /// Exited after a stop request.
    Stopped(ExitSummary),
    /// Exited on its own.
    Crashed(ExitSummary),
}

impl ProcessState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessState::Stopped(_) | ProcessState::Crashed(_))
    }

    pub fn exit(&self) -> Option<&ExitSummary> {
        match self {
            ProcessState::Stopped(summary) | ProcessState::Crashed(summary) => Some(summary),
            _ => None,
        }
    }
}

enum PendingChannel {
    Ready(DuplexChannel),
    DialBack(TcpRendezvous),
}

/// Spawns server processes and connects to them.
#[derive(Clone)]
pub struct ProcessSupervisor {
    output: Arc<dyn OutputSink>,
}

impl ProcessSupervisor {
    pub fn new(output: Arc<dyn OutputSink>) -> Self {
        Self { output }
    }

    /// Spawn the server described by `request` and connect to it.
    ///
    /// For TCP the listener is opened first and the resolved port is passed
    /// as `--tcpClientPort <port>`. The returned handle is `Connected` and
    /// owns the channel until [`ServerProcessHandle::take_channel`].
    pub async fn launch(&self, request: &LaunchRequest) -> Result<ServerProcessHandle> {
        let rendezvous = match request.transport {
            TransportConfig::Tcp { port } => Some(TcpRendezvous::bind(port).await?),
            TransportConfig::Stdio => None,
        };

        let mut command = Command::new(&request.executable);
        command
            .args(&request.args)
            .envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &request.working_dir {
            command.current_dir(dir);
        }

        let transport = match &rendezvous {
            Some(rendezvous) => {
                command
                    .arg(LaunchConfig::TCP_PORT_ARG)
                    .arg(rendezvous.port().to_string())
                    .stdin(Stdio::null());
                TransportConfig::Tcp {
                    port: rendezvous.port(),
                }
            }
            None => {
                command.stdin(Stdio::piped());
                TransportConfig::Stdio
            }
        };

        let mut child = command.spawn().map_err(|e| WardenError::ProcessSpawn {
            program: request.executable.clone(),
            message: e.to_string(),
            source: Some(e),
        })?;
        let pid = child.id();
        info!(
            "Spawned {} (pid {:?}) at {}{}",
            request.label,
            pid,
            request.executable.display(),
            transport.status_suffix()
        );

        let mut forwarders = Vec::new();
        if let Some(stderr) = child.stderr.take() {
            forwarders.push(forward_lines(stderr, self.output.clone()));
        }
        let pending = match rendezvous {
            Some(rendezvous) => {
                if let Some(stdout) = child.stdout.take() {
                    forwarders.push(forward_lines(stdout, self.output.clone()));
                }
                PendingChannel::DialBack(rendezvous)
            }
            None => match (child.stdout.take(), child.stdin.take()) {
                (Some(stdout), Some(stdin)) => {
                    PendingChannel::Ready(DuplexChannel::from_stdio(stdout, stdin))
                }
                _ => {
                    return Err(WardenError::ProcessSpawn {
                        program: request.executable.clone(),
                        message: "standard streams were not captured".to_string(),
                        source: None,
                    })
                }
            },
        };

        let (state_tx, state_rx) = watch::channel(ProcessState::Spawning);
        let state_tx = Arc::new(state_tx);
        let stopping = Arc::new(AtomicBool::new(false));
        let (kill_tx, kill_rx) = mpsc::channel(1);

        tokio::spawn(monitor_exit(
            child,
            kill_rx,
            forwarders,
            state_tx.clone(),
            stopping.clone(),
            self.output.clone(),
            request.label.clone(),
        ));

        let mut handle = ServerProcessHandle {
            label: request.label.clone(),
            pid,
            transport,
            channel: None,
            state_rx,
            state_tx,
            stopping,
            kill_tx,
            stop_timeout: request.stop_timeout,
        };

        let channel = match pending {
            PendingChannel::Ready(channel) => channel,
            PendingChannel::DialBack(rendezvous) => {
                match handle
                    .await_dial_back(rendezvous, request.rendezvous_timeout, &request.executable)
                    .await
                {
                    Ok(channel) => channel,
                    Err(e) => {
                        warn!("{} did not connect back: {}", request.label, e);
                        handle.kill().await;
                        return Err(e);
                    }
                }
            }
        };

        handle.channel = Some(channel);
        handle.state_tx.send_if_modified(|state| {
            if *state == ProcessState::Spawning {
                *state = ProcessState::Connected;
                true
            } else {
                false
            }
        });
        Ok(handle)
    }
}

/// Owns one spawned server: its channel and its termination.
///
/// Dropping the handle kills the process.
pub struct ServerProcessHandle {
    label: String,
    pid: Option<u32>,
    transport: TransportConfig,
    channel: Option<DuplexChannel>,
    state_rx: watch::Receiver<ProcessState>,
    state_tx: Arc<watch::Sender<ProcessState>>,
    stopping: Arc<AtomicBool>,
    kill_tx: mpsc::Sender<()>,
    stop_timeout: Duration,
}

impl ServerProcessHandle {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Transport with the resolved port.
    pub fn transport(&self) -> TransportConfig {
        self.transport
    }

    pub fn state(&self) -> ProcessState {
        self.state_rx.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<ProcessState> {
        self.state_rx.clone()
    }

    /// Hand the channel to the protocol client.
    pub fn take_channel(&mut self) -> Option<DuplexChannel> {
        self.channel.take()
    }

    /// Record that the protocol client finished its handshake.
    pub fn mark_running(&self) -> bool {
        self.state_tx.send_if_modified(|state| {
            if *state == ProcessState::Connected {
                *state = ProcessState::Running;
                true
            } else {
                false
            }
        })
    }

    /// Wait for the process to exit.
    pub async fn wait(&self) -> ExitSummary {
        let mut rx = self.state_rx.clone();
        let exit = match rx.wait_for(ProcessState::is_terminal).await {
            Ok(state) => state.exit().copied(),
            Err(_) => None,
        };
        exit.unwrap_or_default()
    }

    /// Terminate the channel and the process.
    ///
    /// Asks the process to terminate, then kills it after the stop timeout.
    /// Calling this on an exited process returns its summary again.
    pub async fn stop(&mut self) -> ExitSummary {
        if let Some(summary) = self.state().exit() {
            return *summary;
        }

        info!("Stopping {}", self.label);
        self.stopping.store(true, Ordering::SeqCst);
        self.channel.take();

        if !self.request_termination() {
            return self.kill().await;
        }

        match tokio::time::timeout(self.stop_timeout, self.wait()).await {
            Ok(summary) => summary,
            Err(_) => {
                warn!(
                    "{} did not exit within {:?}, killing it",
                    self.label, self.stop_timeout
                );
                self.kill().await
            }
        }
    }

    async fn kill(&self) -> ExitSummary {
        self.stopping.store(true, Ordering::SeqCst);
        let _ = self.kill_tx.try_send(());
        self.wait().await
    }

    #[cfg(unix)]
    fn request_termination(&self) -> bool {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.pid.and_then(|pid| i32::try_from(pid).ok()) else {
            return false;
        };
        debug!("Sending SIGTERM to process {}", pid);
        match kill(Pid::from_raw(pid), Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => true,
            Err(e) => {
                warn!("Failed to send SIGTERM to {}: {}", pid, e);
                false
            }
        }
    }

    #[cfg(not(unix))]
    fn request_termination(&self) -> bool {
        false
    }

    async fn await_dial_back(
        &self,
        rendezvous: TcpRendezvous,
        timeout: Duration,
        executable: &std::path::Path,
    ) -> Result<DuplexChannel> {
        let mut exited = self.state_rx.clone();
        tokio::select! {
            accepted = rendezvous.accept_once(timeout) => {
                let (stream, peer) = accepted?;
                Ok(DuplexChannel::from_tcp(stream, peer))
            }
            _ = exited.wait_for(ProcessState::is_terminal) => Err(WardenError::ProcessSpawn {
                program: executable.to_path_buf(),
                message: "exited before connecting back".to_string(),
                source: None,
            }),
        }
    }
}

impl fmt::Debug for ServerProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerProcessHandle")
            .field("label", &self.label)
            .field("pid", &self.pid)
            .field("transport", &self.transport)
            .field("state", &*self.state_rx.borrow())
            .finish()
    }
}

fn forward_lines<R>(stream: R, output: Arc<dyn OutputSink>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => output.append_line(&line),
                Ok(None) => break,
                Err(e) => {
                    debug!("Stopped forwarding server output: {}", e);
                    break;
                }
            }
        }
    })
}

async fn monitor_exit(
    mut child: Child,
    mut kill_rx: mpsc::Receiver<()>,
    forwarders: Vec<JoinHandle<()>>,
    state_tx: Arc<watch::Sender<ProcessState>>,
    stopping: Arc<AtomicBool>,
    output: Arc<dyn OutputSink>,
    label: String,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        // Kill request, or the handle was dropped
        _ = kill_rx.recv() => {
            if let Err(e) = child.start_kill() {
                debug!("Kill of {} failed: {}", label, e);
            }
            child.wait().await
        }
    };

    for forwarder in forwarders {
        let _ = tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, forwarder).await;
    }

    let summary = match status {
        Ok(status) => ExitSummary::from_status(&status),
        Err(e) => {
            warn!("Failed to wait for {}: {}", label, e);
            ExitSummary::default()
        }
    };
    output.append_line(&format!("The {} {}", label, summary));

    let state = if stopping.load(Ordering::SeqCst) {
        info!("{} {}", label, summary);
        ProcessState::Stopped(summary)
    } else {
        warn!("{} {} unexpectedly", label, summary);
        ProcessState::Crashed(summary)
    };
    state_tx.send_replace(state);
}
