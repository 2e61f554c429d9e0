pub mod activation;
pub mod autoload;
pub mod config;
pub mod host;
pub mod lifecycle;
pub mod policy;
pub mod registry;
pub mod stubs;

pub use lifecycle::{ActivatedBy, PackageManager, PackageState};
pub use parcel_sdk::PackageManifest;
pub use registry::{Failure, PackageRegistry};

/// Returns the crate version baked in at compile time.
pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
