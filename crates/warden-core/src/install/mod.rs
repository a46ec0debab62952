//! Server installation: archive handling, damage detection and the installer.

pub mod archive;
pub mod corruption;
mod installer;
pub mod lock;

pub use corruption::{CorruptionDetector, CorruptionReason};
pub use installer::{AssetInstaller, InstallOutcome, InstallReason, InstallSpec};
pub use lock::InstallLock;
