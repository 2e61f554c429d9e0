use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use crate::config::DEFAULT_SOURCE_EXTENSION;

/// Separator between segments of a qualified symbol name.
pub const NAMESPACE_SEPARATOR: char = '\\';

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolverEntry {
    pub prefix: String,
    pub base: PathBuf,
}

/// Ordered `(namespace prefix, base directory)` table, consulted on first use
/// of a qualified symbol. Each pair is registered at most once.
#[derive(Debug, Clone)]
pub struct ResolverTable {
    entries: Vec<ResolverEntry>,
    seen: HashSet<ResolverEntry>,
    extension: String,
}

impl Default for ResolverTable {
    fn default() -> Self {
        Self::new(DEFAULT_SOURCE_EXTENSION)
    }
}

impl ResolverTable {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            entries: Vec::new(),
            seen: HashSet::new(),
            extension: extension.into(),
        }
    }

    /// Returns `false` when the pair was already present.
    pub fn register(&mut self, prefix: impl Into<String>, base: impl Into<PathBuf>) -> bool {
        let entry = ResolverEntry {
            prefix: prefix.into(),
            base: base.into(),
        };
        if !self.seen.insert(entry.clone()) {
            return false;
        }
        tracing::trace!(prefix = %entry.prefix, base = %entry.base.display(), "resolver registered");
        self.entries.push(entry);
        true
    }

    pub fn entries(&self) -> &[ResolverEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Every path resolution would try for `symbol`, in registration order.
    pub fn candidates(&self, symbol: &str) -> Vec<PathBuf> {
        self.entries
            .iter()
            .filter_map(|entry| self.candidate(entry, symbol))
            .collect()
    }

    /// First candidate that exists as a file. `None` leaves the symbol
    /// unresolved for the host to report when it is actually used.
    pub fn resolve(&self, symbol: &str) -> Option<PathBuf> {
        self.entries
            .iter()
            .filter_map(|entry| self.candidate(entry, symbol))
            .find(|path| path.is_file())
    }

    fn candidate(&self, entry: &ResolverEntry, symbol: &str) -> Option<PathBuf> {
        let rest = symbol.strip_prefix(entry.prefix.as_str())?;
        if rest.is_empty() {
            return None;
        }
        Some(symbol_path(&entry.base, rest, &self.extension))
    }
}

fn symbol_path(base: &Path, rest: &str, extension: &str) -> PathBuf {
    let mut path = base.to_path_buf();
    let mut segments = rest.split(NAMESPACE_SEPARATOR).peekable();
    while let Some(segment) = segments.next() {
        if segments.peek().is_some() {
            path.push(segment);
        } else {
            path.push(format!("{segment}.{extension}"));
        }
    }
    path
}
