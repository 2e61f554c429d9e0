use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

/// Default config and sample package, published into host projects.
pub const STUB_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/stubs");

pub const SAMPLE_CONFIG: &str = include_str!("../stubs/config/packages.toml");
pub const SAMPLE_MANIFEST: &str = include_str!("../stubs/packages/sample/package.json");

/// `source -> destination` pairs for publishing into a project rooted at
/// `base_path`. Directory sources are meant to be copied recursively.
pub fn publishables(base_path: &Path) -> BTreeMap<PathBuf, PathBuf> {
    let stubs = Path::new(STUB_DIR);
    BTreeMap::from([
        (
            stubs.join("config/packages.toml"),
            base_path.join("config/packages.toml"),
        ),
        (
            stubs.join("packages/sample"),
            base_path.join("packages/sample"),
        ),
    ])
}
