//! Transport selection for the server's duplex channel.

use serde::{Deserialize, Serialize};

/// How the client and the spawned server process are connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportConfig {
    /// The child's stdin/stdout are the channel.
    #[default]
    Stdio,
    /// The child dials back to a listener opened before it was spawned.
    /// Port 0 binds an ephemeral port.
    Tcp {
        #[serde(default)]
        port: u16,
    },
}

impl TransportConfig {
    pub fn is_tcp(&self) -> bool {
        matches!(self, TransportConfig::Tcp { .. })
    }

    /// Human-readable suffix for status messages.
    pub fn status_suffix(&self) -> String {
        match self {
            TransportConfig::Stdio => String::new(),
            TransportConfig::Tcp { port: 0 } => " via TCP".to_string(),
            TransportConfig::Tcp { port } => format!(" via TCP port {}", port),
        }
    }
}
