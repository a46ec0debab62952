//! Local install state.

pub mod atomic;
mod state_store;

pub use atomic::{atomic_read_json, atomic_write_json};
pub use state_store::InstallStateStore;
