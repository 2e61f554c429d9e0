use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use parcel_sdk::PackageManifest;
use serde::Serialize;
use serde_json::Value;

use crate::autoload::ResolverTable;

pub const INVALID_PACKAGE_FILE: &str = "Invalid package file.";

/// A manifest source that could not be registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub category: String,
    pub source_location: PathBuf,
    pub error: String,
}

/// Index of discovered manifests keyed by id.
///
/// Discovery evaluates every glob match as a structured value; a bad
/// candidate only produces a [`Failure`] and the rest of the batch continues.
#[derive(Debug, Default)]
pub struct PackageRegistry {
    packages: BTreeMap<String, PackageManifest>,
    failures: Vec<Failure>,
    resolver: ResolverTable,
}

impl PackageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose resolvers append `extension` to symbol paths.
    pub fn with_source_extension(extension: impl Into<String>) -> Self {
        Self {
            resolver: ResolverTable::new(extension),
            ..Self::default()
        }
    }

    /// Expands each category's glob and indexes every valid manifest.
    ///
    /// A later manifest with an id already in the index replaces it.
    pub fn discover(&mut self, roots: &BTreeMap<String, String>) {
        for (category, pattern) in roots {
            let paths = match glob::glob(pattern) {
                Ok(paths) => paths,
                Err(err) => {
                    self.record_failure(category, PathBuf::from(pattern), err.to_string());
                    continue;
                }
            };

            for entry in paths {
                match entry {
                    Ok(path) => self.discover_one(category, &path),
                    Err(err) => {
                        let path = err.path().to_path_buf();
                        self.record_failure(category, path, err.to_string());
                    }
                }
            }
        }

        tracing::info!(
            packages = self.packages.len(),
            failures = self.failures.len(),
            "package discovery finished"
        );
    }

    fn discover_one(&mut self, category: &str, path: &Path) {
        match evaluate(path) {
            Ok(Some(mut manifest)) => {
                manifest.location = path.parent().map(Path::to_path_buf).unwrap_or_default();
                manifest.category = category.to_string();
                tracing::debug!(
                    id = %manifest.id,
                    category,
                    path = %path.display(),
                    "package discovered"
                );
                metrics::counter!("parcel_manifests_total", "outcome" => "valid").increment(1);
                if let Some(previous) = self.packages.insert(manifest.id.clone(), manifest) {
                    tracing::warn!(
                        id = %previous.id,
                        replaced = %previous.location.display(),
                        by = %path.display(),
                        "duplicate package id; last discovered manifest wins"
                    );
                }
            }
            Ok(None) => {
                metrics::counter!("parcel_manifests_total", "outcome" => "invalid").increment(1);
                self.record_failure(category, path.to_path_buf(), INVALID_PACKAGE_FILE.into());
            }
            Err(err) => {
                metrics::counter!("parcel_manifests_total", "outcome" => "error").increment(1);
                self.record_failure(category, path.to_path_buf(), format!("{err:#}"));
            }
        }
    }

    fn record_failure(&mut self, category: &str, source_location: PathBuf, error: String) {
        tracing::warn!(
            category,
            path = %source_location.display(),
            error = %error,
            "package manifest rejected"
        );
        self.failures.push(Failure {
            category: category.to_string(),
            source_location,
            error,
        });
    }

    pub fn get(&self, id: &str) -> Option<&PackageManifest> {
        self.packages.get(id)
    }

    pub fn all(&self) -> &BTreeMap<String, PackageManifest> {
        &self.packages
    }

    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    pub fn filter_by_category(
        &self,
        categories: &BTreeSet<String>,
    ) -> BTreeMap<&str, &PackageManifest> {
        self.packages
            .iter()
            .filter(|(_, manifest)| categories.contains(&manifest.category))
            .map(|(id, manifest)| (id.as_str(), manifest))
            .collect()
    }

    /// Registers namespace resolvers for every known id that declares an
    /// autoload map. Unknown ids are skipped; repeated calls add nothing new.
    pub fn load<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for id in ids {
            let Some(manifest) = self.packages.get(id.as_ref()) else {
                continue;
            };
            for (namespace, relative) in &manifest.autoload_map {
                let base = autoload_base(&manifest.location, relative);
                if self.resolver.register(namespace.clone(), base) {
                    tracing::debug!(
                        id = %manifest.id,
                        namespace = %namespace,
                        "autoload namespace registered"
                    );
                }
            }
        }
    }

    pub fn resolver(&self) -> &ResolverTable {
        &self.resolver
    }

    pub fn resolve(&self, symbol: &str) -> Option<PathBuf> {
        self.resolver.resolve(symbol)
    }
}

fn autoload_base(location: &Path, relative: &str) -> PathBuf {
    let relative = relative.trim_matches('/');
    if relative.is_empty() {
        location.to_path_buf()
    } else {
        location.join(relative)
    }
}

/// `Ok(None)` when the source parses but is not a mapping with a usable `id`:
/// missing, `null` or a blank string. Any other non-string id is left to
/// deserialization so the type error is reported.
fn evaluate(path: &Path) -> Result<Option<PackageManifest>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let value: Value = if path.extension().and_then(|ext| ext.to_str()) == Some("toml") {
        toml::from_str(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?
    } else {
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?
    };

    let has_id = match value.as_object().and_then(|map| map.get("id")) {
        None | Some(Value::Null) => false,
        Some(Value::String(id)) => !id.trim().is_empty(),
        Some(_) => true,
    };
    if !has_id {
        return Ok(None);
    }

    let manifest = serde_json::from_value::<PackageManifest>(value)
        .with_context(|| format!("malformed package manifest {}", path.display()))?;
    Ok(Some(manifest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_manifest(root: &Path, dir: &str, body: &str) -> PathBuf {
        let pkg = root.join(dir);
        fs::create_dir_all(&pkg).unwrap();
        let file = pkg.join("package.json");
        fs::write(&file, body).unwrap();
        file
    }

    fn roots(entries: &[(&str, &Path)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(category, dir)| {
                (
                    category.to_string(),
                    format!("{}/*/package.json", dir.display()),
                )
            })
            .collect()
    }

    #[test]
    fn valid_manifests_are_indexed_with_location_and_category() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(tmp.path(), "blog", r#"{ "id": "acme.blog", "name": "Blog" }"#);

        let mut registry = PackageRegistry::new();
        registry.discover(&roots(&[("default", tmp.path())]));

        let blog = registry.get("acme.blog").unwrap();
        assert_eq!(blog.category, "default");
        assert_eq!(blog.location, tmp.path().join("blog"));
        assert_eq!(blog.name.as_deref(), Some("Blog"));
        assert!(registry.failures().is_empty());
    }

    #[test]
    fn invalid_sources_are_recorded_and_do_not_stop_the_batch() {
        let tmp = tempfile::tempdir().unwrap();
        let list = write_manifest(tmp.path(), "a-list", r#"["not", "a", "map"]"#);
        write_manifest(tmp.path(), "b-no-id", r#"{ "name": "anonymous" }"#);
        write_manifest(tmp.path(), "c-null-id", r#"{ "id": null }"#);
        let broken = write_manifest(tmp.path(), "d-broken", "{ not json");
        write_manifest(tmp.path(), "e-good", r#"{ "id": "acme.good" }"#);

        let mut registry = PackageRegistry::new();
        registry.discover(&roots(&[("default", tmp.path())]));

        assert_eq!(registry.all().len(), 1);
        assert!(registry.get("acme.good").is_some());

        let failures = registry.failures();
        assert_eq!(failures.len(), 4);
        let invalid = failures
            .iter()
            .filter(|f| f.error == INVALID_PACKAGE_FILE)
            .count();
        assert_eq!(invalid, 3);
        assert!(failures
            .iter()
            .any(|f| f.source_location == list && f.error == INVALID_PACKAGE_FILE));
        let parse = failures
            .iter()
            .find(|f| f.source_location == broken)
            .unwrap();
        assert_ne!(parse.error, INVALID_PACKAGE_FILE);
        assert_eq!(parse.category, "default");
    }

    #[test]
    fn blank_ids_are_invalid_package_files() {
        let tmp = tempfile::tempdir().unwrap();
        let empty = write_manifest(tmp.path(), "empty", r#"{ "id": "" }"#);
        let spaces = write_manifest(tmp.path(), "spaces", r#"{ "id": "   " }"#);

        let mut registry = PackageRegistry::new();
        registry.discover(&roots(&[("default", tmp.path())]));

        assert!(registry.all().is_empty());
        let failures = registry.failures();
        assert_eq!(failures.len(), 2);
        for path in [&empty, &spaces] {
            assert!(failures
                .iter()
                .any(|f| &f.source_location == path && f.error == INVALID_PACKAGE_FILE));
        }
    }

    #[test]
    fn non_string_id_is_a_type_error() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(tmp.path(), "numeric", r#"{ "id": 42 }"#);

        let mut registry = PackageRegistry::new();
        registry.discover(&roots(&[("default", tmp.path())]));

        assert!(registry.all().is_empty());
        assert_eq!(registry.failures().len(), 1);
        assert!(registry.failures()[0].error.contains("malformed package manifest"));
    }

    #[test]
    fn type_errors_are_recorded_with_their_message() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(tmp.path(), "bad", r#"{ "id": "acme.bad", "autoload": ["src/"] }"#);

        let mut registry = PackageRegistry::new();
        registry.discover(&roots(&[("default", tmp.path())]));

        assert!(registry.all().is_empty());
        assert_eq!(registry.failures().len(), 1);
        assert!(registry.failures()[0].error.contains("malformed package manifest"));
    }

    #[test]
    fn duplicate_ids_keep_the_last_discovered_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let first = tmp.path().join("first");
        let second = tmp.path().join("second");
        write_manifest(&first, "blog", r#"{ "id": "acme.blog", "version": "1.0.0" }"#);
        write_manifest(&second, "blog", r#"{ "id": "acme.blog", "version": "2.0.0" }"#);

        let mut registry = PackageRegistry::new();
        registry.discover(&roots(&[("alpha", first.as_path())]));
        registry.discover(&roots(&[("beta", second.as_path())]));

        assert_eq!(registry.all().len(), 1);
        let blog = registry.get("acme.blog").unwrap();
        assert_eq!(blog.category, "beta");
        assert_eq!(blog.version.as_deref(), Some("2.0.0"));
    }

    #[test]
    fn duplicate_ids_across_roots_in_one_pass_keep_the_later_category() {
        let tmp = tempfile::tempdir().unwrap();
        let alpha = tmp.path().join("alpha");
        let zeta = tmp.path().join("zeta");
        write_manifest(&alpha, "blog", r#"{ "id": "acme.blog", "version": "1.0.0" }"#);
        write_manifest(&zeta, "blog", r#"{ "id": "acme.blog", "version": "2.0.0" }"#);

        let mut registry = PackageRegistry::new();
        registry.discover(&roots(&[("zeta", zeta.as_path()), ("alpha", alpha.as_path())]));

        assert_eq!(registry.all().len(), 1);
        assert!(registry.failures().is_empty());
        let blog = registry.get("acme.blog").unwrap();
        assert_eq!(blog.category, "zeta");
        assert_eq!(blog.location, zeta.join("blog"));
        assert_eq!(blog.version.as_deref(), Some("2.0.0"));
    }

    #[test]
    fn manifest_may_mix_registrar_key_spellings() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(
            tmp.path(),
            "blog",
            r#"{ "id": "acme.blog", "provider": "A", "providers": ["B"] }"#,
        );

        let mut registry = PackageRegistry::new();
        registry.discover(&roots(&[("default", tmp.path())]));

        assert!(registry.failures().is_empty());
        let blog = registry.get("acme.blog").unwrap();
        assert_eq!(blog.service_registrars, vec!["A", "B"]);
    }

    #[test]
    fn toml_manifests_are_supported() {
        let tmp = tempfile::tempdir().unwrap();
        let pkg = tmp.path().join("shop");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(
            pkg.join("package.toml"),
            "id = \"acme.shop\"\nprovider = \"Acme\\\\Shop\\\\Services\"\n",
        )
        .unwrap();

        let mut registry = PackageRegistry::new();
        let globs = BTreeMap::from([(
            "default".to_string(),
            format!("{}/*/package.toml", tmp.path().display()),
        )]);
        registry.discover(&globs);

        let shop = registry.get("acme.shop").unwrap();
        assert_eq!(shop.service_registrars, vec!["Acme\\Shop\\Services"]);
    }

    #[test]
    fn invalid_glob_is_recorded_as_failure() {
        let mut registry = PackageRegistry::new();
        let globs = BTreeMap::from([("default".to_string(), "/tmp/[".to_string())]);
        registry.discover(&globs);
        assert_eq!(registry.failures().len(), 1);
        assert_eq!(registry.failures()[0].category, "default");
    }

    #[test]
    fn filter_by_category_restricts_to_given_set() {
        let tmp = tempfile::tempdir().unwrap();
        let core = tmp.path().join("core");
        let extra = tmp.path().join("extra");
        write_manifest(&core, "auth", r#"{ "id": "core.auth" }"#);
        write_manifest(&extra, "blog", r#"{ "id": "extra.blog" }"#);

        let mut registry = PackageRegistry::new();
        registry.discover(&roots(&[("core", core.as_path()), ("extra", extra.as_path())]));

        let filtered = registry.filter_by_category(&BTreeSet::from(["core".to_string()]));
        assert_eq!(filtered.keys().copied().collect::<Vec<_>>(), vec!["core.auth"]);
        assert!(registry.filter_by_category(&BTreeSet::new()).is_empty());
    }

    #[test]
    fn load_is_idempotent_and_ignores_unknown_ids() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(
            tmp.path(),
            "blog",
            r#"{ "id": "acme.blog", "autoload": { "Acme\\Blog\\": "src/", "Acme\\Blog\\Seeders\\": "seeders" } }"#,
        );
        let src = tmp.path().join("blog/src/Models");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("Post.rs"), "").unwrap();

        let mut registry = PackageRegistry::with_source_extension("rs");
        registry.discover(&roots(&[("default", tmp.path())]));

        registry.load(["acme.blog", "acme.missing"]);
        assert_eq!(registry.resolver().len(), 2);
        let resolved = registry.resolve("Acme\\Blog\\Models\\Post");

        registry.load(["acme.blog"]);
        assert_eq!(registry.resolver().len(), 2);
        assert_eq!(registry.resolve("Acme\\Blog\\Models\\Post"), resolved);
        assert_eq!(resolved, Some(tmp.path().join("blog/src/Models/Post.rs")));
    }

    #[test]
    fn load_skips_packages_without_autoload() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(tmp.path(), "plain", r#"{ "id": "acme.plain" }"#);

        let mut registry = PackageRegistry::new();
        registry.discover(&roots(&[("default", tmp.path())]));
        registry.load(["acme.plain"]);

        assert!(registry.resolver().is_empty());
    }
}
