//! Platform-specific path utilities.

/// Name of a launcher script on this platform.
///
/// # Platform Behavior
/// - **Linux/macOS**: `{name}`
/// - **Windows**: `{name}.bat`
pub fn script_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{}.bat", name)
    } else {
        name.to_string()
    }
}

/// Name of a native binary on this platform (`.exe` suffix on Windows).
pub fn binary_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", name)
    } else {
        name.to_string()
    }
}
