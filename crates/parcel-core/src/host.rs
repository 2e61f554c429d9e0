use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::Result;

/// Evaluates a package's schedule file against the host's task scheduler.
pub trait Scheduler {
    fn load_schedule_file(&mut self, path: &Path) -> Result<()>;
}

/// Deferred work the host runs once its own startup has finished.
pub type StartupHook = Box<dyn FnOnce(&mut dyn Scheduler) -> Result<()>>;

/// Extension points the package manager consumes from the embedding host.
pub trait Host {
    /// Called once per entry in an activated package's `service_registrars`.
    fn register_service(&mut self, registrar: &str) -> Result<()>;

    /// `true` for console / worker processes, `false` while serving requests.
    fn is_operational_context(&self) -> bool;

    fn after_startup(&mut self, hook: StartupHook);

    /// Copies `source -> destination` pairs into the host project under `tag`.
    fn publish_assets(&mut self, assets: &BTreeMap<PathBuf, PathBuf>, tag: &str) -> Result<()>;
}

/// Host that keeps everything in memory. Startup hooks are queued until
/// [`MemoryHost::finish_startup`] is called.
#[derive(Default)]
pub struct MemoryHost {
    operational: bool,
    services: Vec<String>,
    hooks: Vec<StartupHook>,
    published: Vec<(String, BTreeMap<PathBuf, PathBuf>)>,
}

impl MemoryHost {
    pub fn new(operational: bool) -> Self {
        Self {
            operational,
            ..Self::default()
        }
    }

    pub fn services(&self) -> &[String] {
        &self.services
    }

    pub fn pending_hooks(&self) -> usize {
        self.hooks.len()
    }

    pub fn published(&self) -> &[(String, BTreeMap<PathBuf, PathBuf>)] {
        &self.published
    }

    /// Runs every queued hook in order. A failing hook is logged and the
    /// remaining hooks still run; the number of failures is returned.
    pub fn finish_startup(&mut self, scheduler: &mut dyn Scheduler) -> usize {
        let mut failed = 0;
        for hook in self.hooks.drain(..) {
            if let Err(err) = hook(&mut *scheduler) {
                tracing::warn!(error = %format!("{err:#}"), "startup hook failed");
                failed += 1;
            }
        }
        failed
    }
}

impl Host for MemoryHost {
    fn register_service(&mut self, registrar: &str) -> Result<()> {
        self.services.push(registrar.to_string());
        Ok(())
    }

    fn is_operational_context(&self) -> bool {
        self.operational
    }

    fn after_startup(&mut self, hook: StartupHook) {
        self.hooks.push(hook);
    }

    fn publish_assets(&mut self, assets: &BTreeMap<PathBuf, PathBuf>, tag: &str) -> Result<()> {
        self.published.push((tag.to_string(), assets.clone()));
        Ok(())
    }
}

/// Scheduler that only remembers which files it was handed.
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    pub files: Vec<PathBuf>,
}

impl Scheduler for RecordingScheduler {
    fn load_schedule_file(&mut self, path: &Path) -> Result<()> {
        self.files.push(path.to_path_buf());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hooks_run_only_when_startup_finishes() {
        let mut host = MemoryHost::new(true);
        host.after_startup(Box::new(|scheduler: &mut dyn Scheduler| {
            scheduler.load_schedule_file(Path::new("/pkgs/a/schedule.toml"))
        }));
        host.after_startup(Box::new(|_: &mut dyn Scheduler| -> Result<()> {
            anyhow::bail!("boom")
        }));
        assert_eq!(host.pending_hooks(), 2);

        let mut scheduler = RecordingScheduler::default();
        assert_eq!(host.finish_startup(&mut scheduler), 1);
        assert_eq!(scheduler.files, vec![PathBuf::from("/pkgs/a/schedule.toml")]);
        assert_eq!(host.pending_hooks(), 0);
    }
}
