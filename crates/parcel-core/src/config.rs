use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::policy::PolicySource;

pub const DEFAULT_MANIFEST_FILE: &str = "package.json";
pub const DEFAULT_SOURCE_EXTENSION: &str = "rs";

/// Root configuration structure deserialized from TOML/JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory every root `location` is resolved against.
    pub base_path: PathBuf,
    /// File name looked up in each immediate child of a root.
    pub manifest_file: String,
    /// Extension appended to resolved symbol paths.
    pub source_extension: String,
    pub enabled: Option<EnabledSpec>,
    pub roots: BTreeMap<String, Root>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("."),
            manifest_file: DEFAULT_MANIFEST_FILE.into(),
            source_extension: DEFAULT_SOURCE_EXTENSION.into(),
            enabled: None,
            roots: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Root {
    pub location: String,
    pub forced: bool,
}

/// Config-file form of the enablement policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum EnabledSpec {
    Ids(Vec<String>),
    Handler { handler: String },
}

impl From<EnabledSpec> for PolicySource {
    fn from(spec: EnabledSpec) -> Self {
        match spec {
            EnabledSpec::Ids(ids) => PolicySource::Explicit(ids.into_iter().collect()),
            EnabledSpec::Handler { handler } => PolicySource::Delegated(handler),
        }
    }
}

impl Config {
    /// Reads a config file, expanding `${VAR}` and `${VAR:default}` first.
    /// `.json` files are parsed as JSON, everything else as TOML.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let expanded = interpolate_env(&raw);
        let cfg = if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
            serde_json::from_str::<Config>(&expanded)
                .with_context(|| format!("failed to parse {}", path.display()))?
        } else {
            toml::from_str::<Config>(&expanded)
                .with_context(|| format!("failed to parse {}", path.display()))?
        };
        Ok(cfg)
    }

    /// Validates structural invariants and provides actionable error messages.
    pub fn validate(&self) -> Result<()> {
        if self.manifest_file.trim().is_empty() {
            bail!("manifest_file must not be empty");
        }
        if self.manifest_file.contains(['/', '\\']) {
            bail!(
                "manifest_file `{}` must be a bare file name",
                self.manifest_file
            );
        }
        if self.source_extension.trim().is_empty() || self.source_extension.starts_with('.') {
            bail!(
                "source_extension `{}` must be a non-empty extension without a leading dot",
                self.source_extension
            );
        }
        for (name, root) in &self.roots {
            if name.trim().is_empty() {
                bail!("root names must not be empty");
            }
            if root.location.trim().is_empty() {
                bail!("root `{name}` must declare a location");
            }
        }
        Ok(())
    }

    /// One glob per root: `base_path/location/*/manifest_file`.
    ///
    /// `location` is always taken relative to `base_path`, even when it starts
    /// with `/`.
    pub fn root_globs(&self) -> BTreeMap<String, String> {
        self.roots
            .iter()
            .map(|(name, root)| (name.clone(), self.root_glob(root)))
            .collect()
    }

    fn root_glob(&self, root: &Root) -> String {
        let dir = self.root_dir(root);
        let escaped = glob::Pattern::escape(&dir.to_string_lossy());
        format!(
            "{}/*/{}",
            escaped.trim_end_matches('/'),
            glob::Pattern::escape(&self.manifest_file)
        )
    }

    pub fn root_dir(&self, root: &Root) -> PathBuf {
        self.base_path.join(root.location.trim_start_matches('/'))
    }

    pub fn policy(&self) -> Option<PolicySource> {
        self.enabled.clone().map(PolicySource::from)
    }
}

pub fn interpolate_env(input: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let regex = RE.get_or_init(|| {
        Regex::new(r"\$\{([A-Z0-9_]+)(?::([^}]+))?\}").expect("interpolation pattern is valid")
    });
    regex
        .replace_all(input, |caps: &regex::Captures| {
            let key = &caps[1];
            let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            std::env::var(key).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
base_path = "/srv/app"
enabled = ["acme.blog"]

[roots.default]
location = "/packages"

[roots.core]
location = "modules"
forced = true
"#;

    #[test]
    fn parses_roots_and_literal_policy() {
        let cfg: Config = toml::from_str(SAMPLE).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.manifest_file, DEFAULT_MANIFEST_FILE);
        assert!(!cfg.roots["default"].forced);
        assert!(cfg.roots["core"].forced);
        assert_eq!(
            cfg.enabled,
            Some(EnabledSpec::Ids(vec!["acme.blog".to_string()]))
        );
    }

    #[test]
    fn handler_policy_form_is_recognised() {
        let cfg: Config = toml::from_str(
            r#"
enabled = { handler = "settings" }
"#,
        )
        .unwrap();
        assert_eq!(
            cfg.enabled,
            Some(EnabledSpec::Handler {
                handler: "settings".into()
            })
        );
    }

    #[test]
    fn root_location_is_relative_to_base_path() {
        let cfg: Config = toml::from_str(SAMPLE).unwrap();
        let globs = cfg.root_globs();
        assert_eq!(globs["default"], "/srv/app/packages/*/package.json");
        assert_eq!(globs["core"], "/srv/app/modules/*/package.json");
    }

    #[test]
    fn rejects_nested_manifest_file() {
        let cfg = Config {
            manifest_file: "meta/package.json".into(),
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_root_without_location() {
        let mut cfg = Config::default();
        cfg.roots.insert("default".into(), Root::default());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn interpolation_falls_back_to_default() {
        let out = interpolate_env("location = \"${PARCEL_TEST_UNSET_VAR:/fallback}\"");
        assert_eq!(out, "location = \"/fallback\"");
    }
}
