//! Structural checks on an extracted server tree.
//!
//! Two copies of the same library with different versions in `lib/` end up
//! together on the classpath and break the server at runtime, so they are
//! treated as damage, just like a missing `lib/` directory.

use crate::config::InstallConfig;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

/// Everything up to the first `-<digit>` is the library name.
static LIBRARY_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<prefix>.+?)-\d").expect("library prefix regex is valid")
});

/// Why an extracted tree is considered corrupt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorruptionReason {
    MissingLibDirectory(PathBuf),
    DuplicateLibrary {
        prefix: String,
        first: String,
        second: String,
    },
}

impl std::fmt::Display for CorruptionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CorruptionReason::MissingLibDirectory(path) => {
                write!(f, "missing library directory {}", path.display())
            }
            CorruptionReason::DuplicateLibrary {
                prefix,
                first,
                second,
            } => write!(
                f,
                "duplicate library '{}' ({} and {})",
                prefix, first, second
            ),
        }
    }
}

/// Inspects extracted trees for damage.
pub struct CorruptionDetector;

impl CorruptionDetector {
    /// Inspect the extracted tree rooted at `dir`.
    ///
    /// Returns the first problem found, or `None` for a healthy tree.
    /// Unreadable entries are skipped; only regular files in `lib/` count.
    pub fn inspect(dir: &Path) -> Option<CorruptionReason> {
        let lib_dir = dir.join(InstallConfig::LIB_DIR_NAME);
        if !lib_dir.is_dir() {
            return Some(CorruptionReason::MissingLibDirectory(lib_dir));
        }

        let mut names: Vec<String> = match std::fs::read_dir(&lib_dir) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(e) => {
                debug!("Cannot list {}: {}", lib_dir.display(), e);
                return Some(CorruptionReason::MissingLibDirectory(lib_dir));
            }
        };
        names.sort();

        let mut seen: HashMap<String, String> = HashMap::new();
        for name in names {
            let prefix = library_prefix(&name);
            if let Some(first) = seen.get(&prefix) {
                return Some(CorruptionReason::DuplicateLibrary {
                    prefix,
                    first: first.clone(),
                    second: name,
                });
            }
            seen.insert(prefix, name);
        }

        None
    }
}

/// Library name of a `lib/` file: the name without its version segment.
pub fn library_prefix(file_name: &str) -> String {
    if let Some(captures) = LIBRARY_PREFIX.captures(file_name) {
        if let Some(prefix) = captures.name("prefix") {
            return prefix.as_str().to_string();
        }
    }
    Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tree_with_libs(libs: &[&str]) -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let lib = temp_dir.path().join("lib");
        std::fs::create_dir_all(&lib).unwrap();
        for name in libs {
            std::fs::write(lib.join(name), b"jar").unwrap();
        }
        temp_dir
    }

    #[test]
    fn test_library_prefix() {
        assert_eq!(library_prefix("guava-31.1-jre.jar"), "guava");
        assert_eq!(library_prefix("kotlin-stdlib-jdk8-1.9.0.jar"), "kotlin-stdlib-jdk8");
        assert_eq!(library_prefix("kotlin-stdlib-1.9.0.jar"), "kotlin-stdlib");
        assert_eq!(library_prefix("server.jar"), "server");
    }

    #[test]
    fn test_healthy_tree() {
        let tree = tree_with_libs(&[
            "kotlin-stdlib-1.9.0.jar",
            "kotlin-stdlib-jdk8-1.9.0.jar",
            "guava-31.1-jre.jar",
            "server.jar",
        ]);
        assert_eq!(CorruptionDetector::inspect(tree.path()), None);
    }

    #[test]
    fn test_missing_lib_directory() {
        let temp_dir = TempDir::new().unwrap();
        let reason = CorruptionDetector::inspect(temp_dir.path()).unwrap();
        assert!(matches!(reason, CorruptionReason::MissingLibDirectory(_)));
    }

    #[test]
    fn test_duplicate_prefix() {
        let tree = tree_with_libs(&["guava-30.0-jre.jar", "guava-31.1-jre.jar", "gson-2.10.jar"]);
        let reason = CorruptionDetector::inspect(tree.path()).unwrap();
        assert_eq!(
            reason,
            CorruptionReason::DuplicateLibrary {
                prefix: "guava".into(),
                first: "guava-30.0-jre.jar".into(),
                second: "guava-31.1-jre.jar".into(),
            }
        );
        assert!(reason.to_string().contains("guava"));
    }

    #[test]
    fn test_subdirectories_are_ignored() {
        let tree = tree_with_libs(&["guava-31.1-jre.jar"]);
        std::fs::create_dir(tree.path().join("lib").join("guava-30.0")).unwrap();
        assert_eq!(CorruptionDetector::inspect(tree.path()), None);
    }
}
