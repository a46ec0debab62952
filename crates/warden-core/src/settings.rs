//! User settings.
//!
//! Every option server-warden recognizes is a field of [`Settings`]; nothing
//! is looked up dynamically by key. Settings are stored as camelCase JSON and
//! every field has a default, so an empty object is a valid settings file.

use crate::config::{AppConfig, InstallConfig, LaunchConfig, NetworkConfig, ServerKind};
use crate::models::TransportConfig;
use crate::{Result, WardenError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// JVM debug-attach options for a launched server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DebugAttach {
    pub enabled: bool,
    /// Suspend the JVM until a debugger attaches.
    pub auto_suspend: bool,
    pub port: u16,
}

impl Default for DebugAttach {
    fn default() -> Self {
        Self {
            enabled: false,
            auto_suspend: false,
            port: LaunchConfig::DEFAULT_DEBUG_PORT,
        }
    }
}

impl DebugAttach {
    /// The JDWP agent flag, or `None` when debugging is disabled.
    pub fn jvm_agent_flag(&self) -> Option<String> {
        if !self.enabled {
            return None;
        }
        let suspend = if self.auto_suspend { "y" } else { "n" };
        Some(format!(
            "-agentlib:jdwp=transport=dt_socket,address={},server=y,quiet=y,suspend={}",
            self.port, suspend
        ))
    }
}

/// Per-server-kind settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    pub enabled: bool,
    /// Use this executable instead of the managed install.
    pub path: Option<PathBuf>,
    pub transport: TransportConfig,
    pub debug_attach: DebugAttach,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            transport: TransportConfig::Stdio,
            debug_attach: DebugAttach::default(),
        }
    }
}

/// Where releases are looked up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistrySettings {
    pub api_base: String,
    pub organization: String,
    pub user_agent: String,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            api_base: NetworkConfig::GITHUB_API_BASE.to_string(),
            organization: NetworkConfig::DEFAULT_ORGANIZATION.to_string(),
            user_agent: NetworkConfig::USER_AGENT.to_string(),
        }
    }
}

/// All recognized options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Root under which each server kind gets its install directory.
    pub install_root: Option<PathBuf>,
    /// Java installation(s) to prefer, separated like `PATH` entries.
    pub java_home: Option<PathBuf>,
    pub check_interval_secs: u64,
    pub rendezvous_timeout_secs: u64,
    pub stop_timeout_secs: u64,
    pub registry: RegistrySettings,
    pub language_server: ServerSettings,
    pub debug_adapter: ServerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            install_root: None,
            java_home: None,
            check_interval_secs: InstallConfig::CHECK_INTERVAL.as_secs(),
            rendezvous_timeout_secs: LaunchConfig::RENDEZVOUS_TIMEOUT.as_secs(),
            stop_timeout_secs: LaunchConfig::STOP_TIMEOUT.as_secs(),
            registry: RegistrySettings::default(),
            language_server: ServerSettings::default(),
            debug_adapter: ServerSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file.
    ///
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| WardenError::Config {
            message: format!("Failed to read {}: {}", path.display(), e),
        })?;
        let settings: Settings =
            serde_json::from_str(&contents).map_err(|e| WardenError::Config {
                message: format!("Failed to parse {}: {}", path.display(), e),
            })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Default location of the settings file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| {
            dir.join(AppConfig::DATA_DIR_NAME)
                .join(AppConfig::SETTINGS_FILE_NAME)
        })
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.registry.api_base).map_err(|e| WardenError::Config {
            message: format!("Invalid registry apiBase '{}': {}", self.registry.api_base, e),
        })?;
        if self.registry.organization.trim().is_empty() {
            return Err(WardenError::Config {
                message: "Registry organization must not be empty".to_string(),
            });
        }
        if self.rendezvous_timeout_secs == 0 {
            return Err(WardenError::Config {
                message: "rendezvousTimeoutSecs must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Settings for one server kind.
    pub fn server(&self, kind: ServerKind) -> &ServerSettings {
        match kind {
            ServerKind::LanguageServer => &self.language_server,
            ServerKind::DebugAdapter => &self.debug_adapter,
        }
    }

    pub fn server_mut(&mut self, kind: ServerKind) -> &mut ServerSettings {
        match kind {
            ServerKind::LanguageServer => &mut self.language_server,
            ServerKind::DebugAdapter => &mut self.debug_adapter,
        }
    }

    /// Resolve the install root, falling back to the platform data directory.
    pub fn install_root(&self) -> Result<PathBuf> {
        if let Some(root) = &self.install_root {
            return Ok(root.clone());
        }
        dirs::data_dir()
            .map(|dir| dir.join(AppConfig::DATA_DIR_NAME))
            .ok_or_else(|| WardenError::Config {
                message: "Could not determine a data directory; set installRoot".to_string(),
            })
    }

    /// Install directory of one server kind.
    pub fn install_dir(&self, kind: ServerKind) -> Result<PathBuf> {
        Ok(self.install_root()?.join(kind.install_dir_name()))
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn rendezvous_timeout(&self) -> Duration {
        Duration::from_secs(self.rendezvous_timeout_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}
