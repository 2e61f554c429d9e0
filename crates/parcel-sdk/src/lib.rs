pub mod manifest;

pub use manifest::PackageManifest;

/// Capability implemented by named enablement handlers registered with the host.
pub trait ActivationHandler {
    /// Ids of the non-forced packages that should be active.
    fn enabled(&self) -> Vec<String>;
}

impl<F> ActivationHandler for F
where
    F: Fn() -> Vec<String>,
{
    fn enabled(&self) -> Vec<String> {
        self()
    }
}
