//! Warden Launcher - running and supervising language servers.
//!
//! Builds on `warden-core`: the [`LifecycleController`] installs the server
//! if needed, checks for a Java runtime, spawns the launcher script over the
//! configured transport and hands the resulting [`DuplexChannel`] to a
//! [`ProtocolClient`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use warden_core::{ServerKind, Settings};
//! use warden_launcher::{LifecycleController, Sinks};
//!
//! # async fn run(client: Arc<dyn warden_launcher::ProtocolClient>) -> warden_core::Result<()> {
//! let settings = Settings::default();
//! let controller = LifecycleController::from_settings(
//!     ServerKind::LanguageServer,
//!     &settings,
//!     None,
//!     client,
//!     Sinks::default(),
//! )?;
//! controller.start().await?;
//! controller.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod lifecycle;
pub mod rendezvous;
pub mod supervisor;
pub mod transport;

pub use lifecycle::{
    ControllerConfig, ControllerState, ExecutableSource, LifecycleController, ProtocolClient,
    Sinks,
};
pub use rendezvous::TcpRendezvous;
pub use supervisor::{
    ExitSummary, LaunchRequest, ProcessState, ProcessSupervisor, ServerProcessHandle,
};
pub use transport::{ChannelKind, ChannelReader, ChannelWriter, DuplexChannel};
