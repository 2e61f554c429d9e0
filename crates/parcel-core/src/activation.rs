use std::{
    collections::{BTreeMap, BTreeSet},
    path::PathBuf,
};

use anyhow::Context;

use crate::{
    config::Root,
    host::{Host, Scheduler},
    registry::PackageRegistry,
};

pub use crate::policy::resolve_policy;

/// Every package discovered under a root marked `forced`.
pub fn compute_forced(
    roots: &BTreeMap<String, Root>,
    registry: &PackageRegistry,
) -> BTreeSet<String> {
    let forced = categories(roots, true);
    ids_in(registry, &forced)
}

/// Packages in non-forced roots that the policy names.
pub fn compute_enabled(
    roots: &BTreeMap<String, Root>,
    enabled: &BTreeSet<String>,
    registry: &PackageRegistry,
) -> BTreeSet<String> {
    let non_forced = categories(roots, false);
    ids_in(registry, &non_forced)
        .into_iter()
        .filter(|id| enabled.contains(id))
        .collect()
}

fn categories(roots: &BTreeMap<String, Root>, forced: bool) -> BTreeSet<String> {
    roots
        .iter()
        .filter(|(_, root)| root.forced == forced)
        .map(|(name, _)| name.clone())
        .collect()
}

fn ids_in(registry: &PackageRegistry, categories: &BTreeSet<String>) -> BTreeSet<String> {
    registry
        .filter_by_category(categories)
        .into_keys()
        .map(str::to_string)
        .collect()
}

/// Loads `ids`, then hands each package's registrars to the host and, in an
/// operational context, queues its schedule files for after startup.
///
/// Returns the ids that were known to the registry.
pub fn activate(
    ids: &BTreeSet<String>,
    registry: &mut PackageRegistry,
    host: &mut dyn Host,
) -> BTreeSet<String> {
    registry.load(ids);

    let mut activated = BTreeSet::new();
    for id in ids {
        let Some(manifest) = registry.get(id) else {
            tracing::debug!(id = %id, "activation requested for unknown package");
            continue;
        };

        for registrar in &manifest.service_registrars {
            if let Err(err) = host.register_service(registrar) {
                tracing::warn!(
                    id = %id,
                    registrar = %registrar,
                    error = %format!("{err:#}"),
                    "service registration failed"
                );
            }
        }

        if host.is_operational_context() && !manifest.scheduled_task_files.is_empty() {
            let files: Vec<PathBuf> = manifest
                .scheduled_task_files
                .iter()
                .map(|file| manifest.location.join(file))
                .collect();
            let package = id.clone();
            host.after_startup(Box::new(move |scheduler: &mut dyn Scheduler| {
                for file in &files {
                    scheduler.load_schedule_file(file).with_context(|| {
                        format!("package `{package}` schedule {}", file.display())
                    })?;
                }
                Ok(())
            }));
        }

        tracing::info!(id = %id, category = %manifest.category, "package activated");
        activated.insert(id.clone());
    }
    activated
}
