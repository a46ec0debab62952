//! Java runtime discovery.
//!
//! The server launchers are shell/batch scripts around a JVM, so a `java`
//! binary must be reachable before anything is spawned. Candidates are
//! searched in order: the configured Java home(s), `JAVA_HOME`, then every
//! `PATH` entry.

use crate::platform::paths::binary_name;
use crate::{Result, WardenError};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A located Java runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JavaRuntime {
    /// The `java` executable.
    pub java: PathBuf,
    /// The home directory `java` lives under (`{home}/bin/java`); `None`
    /// when it was found on `PATH`.
    pub home: Option<PathBuf>,
}

/// Locates the `java` executable.
#[derive(Debug, Clone, Default)]
pub struct JavaLocator {
    configured_home: Option<OsString>,
    env_java_home: Option<OsString>,
    path_var: Option<OsString>,
}

impl JavaLocator {
    /// Locator using `configured_home` plus the current process environment.
    pub fn from_env(configured_home: Option<&Path>) -> Self {
        Self {
            configured_home: configured_home.map(|p| p.as_os_str().to_owned()),
            env_java_home: std::env::var_os("JAVA_HOME"),
            path_var: std::env::var_os("PATH"),
        }
    }

    /// Locator with an explicit environment.
    pub fn new(
        configured_home: Option<OsString>,
        env_java_home: Option<OsString>,
        path_var: Option<OsString>,
    ) -> Self {
        Self {
            configured_home,
            env_java_home,
            path_var,
        }
    }

    /// Every candidate runtime, in search order.
    pub fn candidates(&self) -> Vec<JavaRuntime> {
        let binary = binary_name("java");
        let mut candidates = Vec::new();

        for (label, homes) in [
            ("configured javaHome", &self.configured_home),
            ("JAVA_HOME", &self.env_java_home),
        ] {
            if let Some(homes) = homes {
                debug!("Looking for Java in {}: {:?}", label, homes);
                candidates.extend(
                    std::env::split_paths(homes)
                        .filter(|home| !home.as_os_str().is_empty())
                        .map(|home| JavaRuntime {
                            java: home.join("bin").join(&binary),
                            home: Some(home),
                        }),
                );
            }
        }

        if let Some(path) = &self.path_var {
            candidates.extend(
                std::env::split_paths(path)
                    .filter(|dir| !dir.as_os_str().is_empty())
                    .map(|dir| JavaRuntime {
                        java: dir.join(&binary),
                        home: None,
                    }),
            );
        }

        candidates
    }

    /// First candidate whose `java` exists, or `None`.
    pub fn find(&self) -> Option<JavaRuntime> {
        self.candidates()
            .into_iter()
            .find(|candidate| candidate.java.is_file())
    }

    /// Like [`JavaLocator::find`], failing with [`WardenError::JavaNotFound`].
    pub fn require(&self) -> Result<JavaRuntime> {
        let runtime = self.find().ok_or_else(|| WardenError::JavaNotFound {
            searched: self.candidates().len(),
        })?;
        debug!("Using Java at {}", runtime.java.display());
        Ok(runtime)
    }
}
