//! Platform abstraction layer.
//!
//! All `#[cfg]` blocks for OS-specific behavior live here:
//! - `paths` - launcher script and binary names
//! - `permissions` - executable bits
//! - `java` - Java runtime discovery

pub mod java;
pub mod paths;
pub mod permissions;

pub use java::{JavaLocator, JavaRuntime};
pub use paths::{binary_name, script_name};
pub use permissions::{is_executable, set_executable};
