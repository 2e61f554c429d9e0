use std::{collections::BTreeMap, path::PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Self-describing package metadata, one file per package directory.
///
/// `category` and `location` are never read from the file; discovery fills
/// them in from the root that matched and the directory the file lives in.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(from = "RawManifest")]
pub struct PackageManifest {
    pub id: String,
    pub category: String,
    pub location: PathBuf,
    pub name: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub icon: Option<String>,
    pub developer: Option<String>,
    pub developer_url: Option<String>,
    pub support_url: Option<String>,
    pub support_email: Option<String>,
    pub docs_url: Option<String>,
    /// Informational only; activation is decided by roots and policy.
    pub is_active: Option<bool>,
    /// Read from `provider`, `providers` and `service_registrars`, in that order.
    #[serde(rename = "provider")]
    pub service_registrars: Vec<String>,
    #[serde(rename = "require")]
    pub dependencies: Vec<String>,
    #[serde(rename = "files")]
    pub asset_files: Vec<String>,
    #[serde(rename = "autoload")]
    pub autoload_map: BTreeMap<String, String>,
    #[serde(rename = "schedules")]
    pub scheduled_task_files: Vec<String>,
    pub config: BTreeMap<String, Value>,
    /// Keys the manager does not recognise, kept verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// On-disk shape, with each registrar key spelling kept apart.
#[derive(Deserialize, Default)]
#[serde(default)]
struct RawManifest {
    id: String,
    name: Option<String>,
    description: Option<String>,
    version: Option<String>,
    icon: Option<String>,
    developer: Option<String>,
    developer_url: Option<String>,
    support_url: Option<String>,
    support_email: Option<String>,
    docs_url: Option<String>,
    is_active: Option<bool>,
    #[serde(deserialize_with = "one_or_many")]
    provider: Vec<String>,
    #[serde(deserialize_with = "one_or_many")]
    providers: Vec<String>,
    #[serde(deserialize_with = "one_or_many")]
    service_registrars: Vec<String>,
    #[serde(deserialize_with = "one_or_many")]
    require: Vec<String>,
    #[serde(deserialize_with = "one_or_many")]
    files: Vec<String>,
    autoload: BTreeMap<String, String>,
    #[serde(deserialize_with = "one_or_many")]
    schedules: Vec<String>,
    config: BTreeMap<String, Value>,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

impl From<RawManifest> for PackageManifest {
    fn from(raw: RawManifest) -> Self {
        let mut service_registrars: Vec<String> = Vec::new();
        for registrar in raw
            .provider
            .into_iter()
            .chain(raw.providers)
            .chain(raw.service_registrars)
        {
            if !service_registrars.contains(&registrar) {
                service_registrars.push(registrar);
            }
        }

        Self {
            id: raw.id,
            category: String::new(),
            location: PathBuf::new(),
            name: raw.name,
            description: raw.description,
            version: raw.version,
            icon: raw.icon,
            developer: raw.developer,
            developer_url: raw.developer_url,
            support_url: raw.support_url,
            support_email: raw.support_email,
            docs_url: raw.docs_url,
            is_active: raw.is_active,
            service_registrars,
            dependencies: raw.require,
            asset_files: raw.files,
            autoload_map: raw.autoload,
            scheduled_task_files: raw.schedules,
            config: raw.config,
            extra: raw.extra,
        }
    }
}

impl PackageManifest {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Parses `version` as a semantic version, if it is one.
    pub fn semver(&self) -> Option<semver::Version> {
        self.version
            .as_deref()
            .and_then(|v| semver::Version::parse(v.trim_start_matches('v')).ok())
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn has_autoload(&self) -> bool {
        !self.autoload_map.is_empty()
    }
}

/// Accepts either a single string or a list of strings; `null` means empty.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(
        match Option::<OneOrMany>::deserialize(deserializer)? {
            None => Vec::new(),
            Some(OneOrMany::One(item)) => vec![item],
            Some(OneOrMany::Many(items)) => items,
        },
    )
}
