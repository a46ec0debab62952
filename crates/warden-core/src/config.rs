//! Centralized configuration constants for server-warden.
//!
//! User-tunable options live in [`crate::settings`]; this module holds the
//! fixed names and limits the rest of the crate agrees on.

use crate::{Result, WardenError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Application-level configuration.
pub struct AppConfig;

impl AppConfig {
    pub const APP_NAME: &'static str = "server-warden";
    pub const DATA_DIR_NAME: &'static str = "server-warden";
    pub const SETTINGS_FILE_NAME: &'static str = "settings.json";
}

/// Configuration for the install process.
pub struct InstallConfig;

impl InstallConfig {
    /// Minimum time between two registry checks for the same install directory.
    pub const CHECK_INTERVAL: Duration = Duration::from_secs(480);
    pub const STATE_FILE_NAME: &'static str = "SERVER-INFO";
    pub const DOWNLOAD_PREFIX: &'static str = "download-";
    pub const LOCK_FILE_NAME: &'static str = ".install.lock";
    pub const LIB_DIR_NAME: &'static str = "lib";
    pub const BIN_DIR_NAME: &'static str = "bin";
    /// Version recorded when nothing valid is installed.
    pub const SENTINEL_VERSION: &'static str = "0.0.0";
}

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const GITHUB_API_BASE: &'static str = "https://api.github.com";
    pub const DEFAULT_ORGANIZATION: &'static str = "fwcd";
    pub const USER_AGENT: &'static str = "server-warden";
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
    /// Minimum percent delta between two download progress reports.
    pub const PROGRESS_STEP_PERCENT: u8 = 1;
}

/// Process launch configuration.
pub struct LaunchConfig;

impl LaunchConfig {
    pub const TCP_PORT_ARG: &'static str = "--tcpClientPort";
    pub const RENDEZVOUS_TIMEOUT: Duration = Duration::from_secs(30);
    pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);
    pub const DEFAULT_DEBUG_PORT: u16 = 5005;
}

/// The server kinds managed by server-warden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ServerKind {
    #[default]
    LanguageServer,
    DebugAdapter,
}

impl ServerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerKind::LanguageServer => "language-server",
            ServerKind::DebugAdapter => "debug-adapter",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ServerKind::LanguageServer => "Kotlin Language Server",
            ServerKind::DebugAdapter => "Kotlin Debug Adapter",
        }
    }

    /// Registry project the releases are published under.
    pub fn github_project(&self) -> &'static str {
        match self {
            ServerKind::LanguageServer => "kotlin-language-server",
            ServerKind::DebugAdapter => "kotlin-debug-adapter",
        }
    }

    pub fn asset_name(&self) -> &'static str {
        match self {
            ServerKind::LanguageServer => "server.zip",
            ServerKind::DebugAdapter => "adapter.zip",
        }
    }

    pub fn install_dir_name(&self) -> &'static str {
        match self {
            ServerKind::LanguageServer => "langServerInstall",
            ServerKind::DebugAdapter => "debugAdapterInstall",
        }
    }

    /// Name of the top-level directory inside the release archive.
    pub fn extracted_dir_name(&self) -> &'static str {
        match self {
            ServerKind::LanguageServer => "server",
            ServerKind::DebugAdapter => "adapter",
        }
    }

    /// Launcher script name without the platform suffix.
    pub fn script_name(&self) -> &'static str {
        self.github_project()
    }

    /// Environment variable the launcher script reads extra JVM options from.
    pub fn jvm_options_env(&self) -> &'static str {
        match self {
            ServerKind::LanguageServer => "KOTLIN_LANGUAGE_SERVER_OPTS",
            ServerKind::DebugAdapter => "KOTLIN_DEBUG_ADAPTER_OPTS",
        }
    }

    pub fn all() -> [ServerKind; 2] {
        [ServerKind::LanguageServer, ServerKind::DebugAdapter]
    }
}

impl std::str::FromStr for ServerKind {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "language-server" | "languageserver" | "server" => Ok(ServerKind::LanguageServer),
            "debug-adapter" | "debugadapter" | "adapter" => Ok(ServerKind::DebugAdapter),
            _ => Err(WardenError::Config {
                message: format!("unknown server kind '{}' (language-server, debug-adapter)", s),
            }),
        }
    }
}

impl std::fmt::Display for ServerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
