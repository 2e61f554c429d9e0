use std::{collections::BTreeMap, path::PathBuf};

use anyhow::{bail, Result};
use parcel_sdk::ActivationHandler;

use crate::{
    activation::{activate, compute_enabled, compute_forced},
    config::Config,
    host::Host,
    policy::{resolve_policy, HandlerRegistry, PolicySource},
    registry::PackageRegistry,
    stubs,
};

/// Tag under which default config and the sample package are published.
pub const PUBLISH_TAG: &str = "parcel-packages";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Created,
    Registered,
    Booted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivatedBy {
    Forced,
    Policy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageState {
    Discovered,
    Active(ActivatedBy),
    Inactive,
}

impl PackageState {
    pub fn is_active(self) -> bool {
        matches!(self, PackageState::Active(_))
    }
}

/// Drives discovery and activation through the host's register and boot
/// phases. Each phase runs once, in order.
#[derive(Debug)]
pub struct PackageManager {
    config: Config,
    registry: PackageRegistry,
    policy: Option<PolicySource>,
    handlers: HandlerRegistry,
    phase: Phase,
    states: BTreeMap<String, PackageState>,
}

impl PackageManager {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let policy = config.policy();
        let registry = PackageRegistry::with_source_extension(config.source_extension.clone());
        Ok(Self {
            config,
            registry,
            policy,
            handlers: HandlerRegistry::new(),
            phase: Phase::Created,
            states: BTreeMap::new(),
        })
    }

    /// Replaces whatever policy the config file declared.
    pub fn with_policy(mut self, policy: PolicySource) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_handler(
        mut self,
        name: impl Into<String>,
        handler: impl ActivationHandler + 'static,
    ) -> Self {
        self.handlers.insert(name, handler);
        self
    }

    /// Discovers every root and activates the forced packages.
    pub fn register(&mut self, host: &mut dyn Host) -> Result<()> {
        if self.phase != Phase::Created {
            bail!("register phase already ran (current phase: {:?})", self.phase);
        }

        self.registry.discover(&self.config.root_globs());
        self.states = self
            .registry
            .all()
            .keys()
            .map(|id| (id.clone(), PackageState::Discovered))
            .collect();

        let forced = compute_forced(&self.config.roots, &self.registry);
        let activated = activate(&forced, &mut self.registry, host);
        self.mark_active(&activated, ActivatedBy::Forced);

        self.phase = Phase::Registered;
        Ok(())
    }

    /// Publishes stubs in an operational context, then activates the
    /// non-forced packages the policy enables. Everything else ends Inactive.
    pub fn boot(&mut self, host: &mut dyn Host) -> Result<()> {
        match self.phase {
            Phase::Registered => {}
            Phase::Created => bail!("boot phase requires the register phase to run first"),
            Phase::Booted => bail!("boot phase already ran"),
        }
        self.phase = Phase::Booted;

        if host.is_operational_context() {
            let assets = stubs::publishables(&self.config.base_path);
            if let Err(err) = host.publish_assets(&assets, PUBLISH_TAG) {
                tracing::warn!(error = %format!("{err:#}"), "publishing package stubs failed");
            }
        }

        let enabled = resolve_policy(self.policy.as_ref(), &self.handlers);
        if enabled.is_empty() {
            tracing::debug!("no packages enabled by policy");
        } else {
            let ids = compute_enabled(&self.config.roots, &enabled, &self.registry);
            let activated = activate(&ids, &mut self.registry, host);
            self.mark_active(&activated, ActivatedBy::Policy);
        }

        for state in self.states.values_mut() {
            if *state == PackageState::Discovered {
                *state = PackageState::Inactive;
            }
        }
        Ok(())
    }

    fn mark_active<'a>(&mut self, ids: impl IntoIterator<Item = &'a String>, by: ActivatedBy) {
        for id in ids {
            self.states.insert(id.clone(), PackageState::Active(by));
            metrics::counter!(
                "parcel_packages_activated_total",
                "via" => match by {
                    ActivatedBy::Forced => "forced",
                    ActivatedBy::Policy => "policy",
                }
            )
            .increment(1);
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &PackageRegistry {
        &self.registry
    }

    pub fn state(&self, id: &str) -> Option<PackageState> {
        self.states.get(id).copied()
    }

    pub fn states(&self) -> &BTreeMap<String, PackageState> {
        &self.states
    }

    pub fn active(&self) -> impl Iterator<Item = &str> {
        self.states
            .iter()
            .filter(|(_, state)| state.is_active())
            .map(|(id, _)| id.as_str())
    }

    /// Path of the file that defines `symbol`, if any active package maps it.
    pub fn resolve_symbol(&self, symbol: &str) -> Option<PathBuf> {
        self.registry.resolve(symbol)
    }
}
