//! Error types for server-warden.
//!
//! Every failure that can abort an install or a launch is a variant of
//! [`WardenError`]. Callers that need to decide on a policy (tolerate, report,
//! abort) should match on [`WardenError::kind`] instead of on variants.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for server-warden.
#[derive(Debug, Error)]
pub enum WardenError {
    // Registry / network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    #[error("Request to {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Rate limited by {service}, retry after {retry_after_secs:?} seconds")]
    RateLimited {
        service: String,
        retry_after_secs: Option<u64>,
    },

    // Parse errors
    #[error("Failed to parse {what}: {message}")]
    Parse { what: String, message: String },

    #[error("Invalid version: {version}")]
    InvalidVersion { version: String },

    // Release errors
    #[error("Latest release of {project} does not contain the asset '{asset}'")]
    MissingAsset { project: String, asset: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Failed to extract {archive}: {message}")]
    Extraction { archive: PathBuf, message: String },

    // Process errors
    #[error("Failed to spawn {program}: {message}")]
    ProcessSpawn {
        program: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Could not locate a Java runtime (searched {searched} locations)")]
    JavaNotFound { searched: usize },

    #[error("Socket error: {message}")]
    Socket {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Server did not connect back within {0:?}")]
    RendezvousTimeout(Duration),

    // Lifecycle errors
    #[error("Cannot {operation} while {state}")]
    InvalidState { operation: String, state: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for server-warden operations.
pub type Result<T> = std::result::Result<T, WardenError>;

/// Coarse classification of a [`WardenError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Parse,
    MissingAsset,
    FileSystem,
    ProcessSpawn,
    Socket,
    InvalidState,
    Config,
    Other,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Network => "network",
            ErrorKind::Parse => "parse",
            ErrorKind::MissingAsset => "missing-asset",
            ErrorKind::FileSystem => "file-system",
            ErrorKind::ProcessSpawn => "process-spawn",
            ErrorKind::Socket => "socket",
            ErrorKind::InvalidState => "invalid-state",
            ErrorKind::Config => "config",
            ErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

// Conversion implementations for common error types

impl From<std::io::Error> for WardenError {
    fn from(err: std::io::Error) -> Self {
        WardenError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for WardenError {
    fn from(err: serde_json::Error) -> Self {
        WardenError::Parse {
            what: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for WardenError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            WardenError::Parse {
                what: "response body".to_string(),
                message: err.to_string(),
            }
        } else {
            WardenError::Network {
                message: err.to_string(),
                cause: std::error::Error::source(&err).map(|s| s.to_string()),
            }
        }
    }
}

impl WardenError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        WardenError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a socket error from an IO error.
    pub fn socket(message: impl Into<String>, err: std::io::Error) -> Self {
        WardenError::Socket {
            message: format!("{}: {}", message.into(), err),
            source: Some(err),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            WardenError::Network { .. }
            | WardenError::HttpStatus { .. }
            | WardenError::RateLimited { .. } => ErrorKind::Network,

            WardenError::Parse { .. } | WardenError::InvalidVersion { .. } => ErrorKind::Parse,

            WardenError::MissingAsset { .. } => ErrorKind::MissingAsset,

            WardenError::Io { .. } | WardenError::Extraction { .. } => ErrorKind::FileSystem,

            WardenError::ProcessSpawn { .. } | WardenError::JavaNotFound { .. } => {
                ErrorKind::ProcessSpawn
            }

            WardenError::Socket { .. } | WardenError::RendezvousTimeout(_) => ErrorKind::Socket,

            WardenError::InvalidState { .. } => ErrorKind::InvalidState,

            WardenError::Config { .. } => ErrorKind::Config,

            WardenError::Other(_) => ErrorKind::Other,
        }
    }

    /// Check if this error may be ignored when a working install already exists.
    ///
    /// A registry that is down or returns garbage must never block a setup
    /// that already has a usable server.
    pub fn is_offline_tolerable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Network | ErrorKind::Parse)
    }
}
