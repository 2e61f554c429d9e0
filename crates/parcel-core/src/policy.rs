use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use parcel_sdk::ActivationHandler;

/// The three ways a host can name its enabled packages. Exactly one is in
/// effect for a given configuration.
pub enum PolicySource {
    Explicit(BTreeSet<String>),
    Computed(Box<dyn Fn() -> Vec<String>>),
    /// Name of a handler registered in the [`HandlerRegistry`].
    Delegated(String),
}

impl PolicySource {
    pub fn explicit<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Explicit(ids.into_iter().map(Into::into).collect())
    }

    pub fn computed(f: impl Fn() -> Vec<String> + 'static) -> Self {
        Self::Computed(Box::new(f))
    }
}

impl fmt::Debug for PolicySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicySource::Explicit(ids) => f.debug_tuple("Explicit").field(ids).finish(),
            PolicySource::Computed(_) => f.write_str("Computed(..)"),
            PolicySource::Delegated(name) => f.debug_tuple("Delegated").field(name).finish(),
        }
    }
}

/// Named [`ActivationHandler`]s a `Delegated` policy can refer to.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Box<dyn ActivationHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, handler: impl ActivationHandler + 'static) {
        self.handlers.insert(name.into(), Box::new(handler));
    }

    pub fn get(&self, name: &str) -> Option<&dyn ActivationHandler> {
        self.handlers.get(name).map(|handler| handler.as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

/// Resolves a policy to a set of ids. A missing policy or an unknown
/// handler name yields the empty set.
pub fn resolve_policy(
    policy: Option<&PolicySource>,
    handlers: &HandlerRegistry,
) -> BTreeSet<String> {
    match policy {
        None => BTreeSet::new(),
        Some(PolicySource::Explicit(ids)) => ids.clone(),
        Some(PolicySource::Computed(f)) => f().into_iter().collect(),
        Some(PolicySource::Delegated(name)) => match handlers.get(name) {
            Some(handler) => handler.enabled().into_iter().collect(),
            None => {
                tracing::warn!(handler = %name, "activation handler not registered; no packages enabled");
                BTreeSet::new()
            }
        },
    }
}
