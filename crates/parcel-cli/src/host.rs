use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use parcel_core::host::{Host, MemoryHost, Scheduler, StartupHook};
use serde::Deserialize;

/// Host used when the manager runs outside an embedding application.
/// Registrations are logged and kept in memory; published assets are only
/// recorded until `parcel publish` copies them.
pub struct StandaloneHost {
    inner: MemoryHost,
}

impl StandaloneHost {
    pub fn new(operational: bool) -> Self {
        Self {
            inner: MemoryHost::new(operational),
        }
    }

    pub fn services(&self) -> &[String] {
        self.inner.services()
    }

    pub fn publishable(&self) -> &[(String, BTreeMap<PathBuf, PathBuf>)] {
        self.inner.published()
    }

    pub fn finish_startup(&mut self, scheduler: &mut dyn Scheduler) -> usize {
        self.inner.finish_startup(scheduler)
    }
}

impl Host for StandaloneHost {
    fn register_service(&mut self, registrar: &str) -> Result<()> {
        tracing::info!(registrar, "service registered");
        self.inner.register_service(registrar)
    }

    fn is_operational_context(&self) -> bool {
        self.inner.is_operational_context()
    }

    fn after_startup(&mut self, hook: StartupHook) {
        self.inner.after_startup(hook);
    }

    fn publish_assets(&mut self, assets: &BTreeMap<PathBuf, PathBuf>, tag: &str) -> Result<()> {
        tracing::debug!(tag, count = assets.len(), "assets publishable");
        self.inner.publish_assets(assets, tag)
    }
}

/// Copies each `source -> destination` pair, recursing into directories.
/// Existing files are left alone unless `force` is set. Returns the number
/// of files written.
pub fn copy_assets(assets: &BTreeMap<PathBuf, PathBuf>, force: bool) -> Result<usize> {
    let mut copied = 0;
    for (source, destination) in assets {
        copied += copy_path(source, destination, force)?;
    }
    Ok(copied)
}

fn copy_path(source: &Path, destination: &Path, force: bool) -> Result<usize> {
    if source.is_dir() {
        let mut copied = 0;
        let entries = fs::read_dir(source)
            .with_context(|| format!("failed to read {}", source.display()))?;
        for entry in entries {
            let entry = entry?;
            copied += copy_path(&entry.path(), &destination.join(entry.file_name()), force)?;
        }
        return Ok(copied);
    }

    if destination.exists() && !force {
        tracing::debug!(path = %destination.display(), "exists; skipping");
        return Ok(0);
    }
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::copy(source, destination).with_context(|| {
        format!(
            "failed to copy {} to {}",
            source.display(),
            destination.display()
        )
    })?;
    Ok(1)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduledTask {
    pub name: String,
    pub cron: String,
    pub command: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ScheduleFile {
    task: Vec<ScheduledTask>,
}

/// Scheduler that parses TOML schedule files and logs their tasks.
#[derive(Debug, Default)]
pub struct LogScheduler {
    tasks: Vec<ScheduledTask>,
}

impl LogScheduler {
    pub fn tasks(&self) -> &[ScheduledTask] {
        &self.tasks
    }
}

impl Scheduler for LogScheduler {
    fn load_schedule_file(&mut self, path: &Path) -> Result<()> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read schedule {}", path.display()))?;
        let file: ScheduleFile = toml::from_str(&raw)
            .with_context(|| format!("failed to parse schedule {}", path.display()))?;
        for task in file.task {
            tracing::info!(task = %task.name, cron = %task.cron, "task scheduled");
            self.tasks.push(task);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_skips_existing_files_unless_forced() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("a.txt"), "new").unwrap();
        fs::write(src.join("nested/b.txt"), "new").unwrap();
        let dst = tmp.path().join("dst");
        fs::create_dir_all(&dst).unwrap();
        fs::write(dst.join("a.txt"), "old").unwrap();

        let assets = BTreeMap::from([(src.clone(), dst.clone())]);
        assert_eq!(copy_assets(&assets, false).unwrap(), 1);
        assert_eq!(fs::read_to_string(dst.join("a.txt")).unwrap(), "old");
        assert_eq!(fs::read_to_string(dst.join("nested/b.txt")).unwrap(), "new");

        assert_eq!(copy_assets(&assets, true).unwrap(), 2);
        assert_eq!(fs::read_to_string(dst.join("a.txt")).unwrap(), "new");
    }

    #[test]
    fn scheduler_reads_bundled_sample_schedule() {
        let path = Path::new(parcel_core::stubs::STUB_DIR).join("packages/sample/schedule.toml");
        let mut scheduler = LogScheduler::default();
        scheduler.load_schedule_file(&path).unwrap();
        assert_eq!(scheduler.tasks().len(), 1);
        assert_eq!(scheduler.tasks()[0].name, "sample:cleanup");
    }

    #[test]
    fn scheduler_reports_unreadable_files() {
        let mut scheduler = LogScheduler::default();
        assert!(scheduler
            .load_schedule_file(Path::new("/definitely/missing/schedule.toml"))
            .is_err());
    }
}
