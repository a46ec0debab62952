//! Data types shared across server-warden.

mod install_record;
mod release;
mod transport;

pub use install_record::{now_millis, InstallRecord};
pub use release::{parse_version, ReleaseAsset, ReleaseDescriptor};
pub use transport::TransportConfig;
