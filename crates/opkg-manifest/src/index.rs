//! Installed-package index stored at `.openpackage/openpackage.index.yml`.

use std::collections::BTreeMap;
use std::path::Path;

use opkg_fs::{ConfigStore, NormalizedPath};
use serde::{Deserialize, Serialize};

use crate::STATE_DIR;
use crate::error::Result;

/// File name of the index inside [`STATE_DIR`].
pub const INDEX_FILENAME: &str = "openpackage.index.yml";

/// One installed package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct InstalledPackage {
    /// Installed version, if the package is versioned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Human-readable description of where it came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Platforms the package was installed for.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub platforms: Vec<String>,
}

/// Which packages are installed in a workspace, keyed by package name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct InstalledIndex {
    #[serde(default)]
    packages: BTreeMap<String, InstalledPackage>,
}

impl InstalledIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn path(workspace_root: &Path) -> NormalizedPath {
        NormalizedPath::new(workspace_root.join(STATE_DIR).join(INDEX_FILENAME))
    }

    /// Load the index for a workspace. A missing file is an empty index.
    pub fn load(workspace_root: &Path) -> Result<Self> {
        Ok(ConfigStore::new().load_or_default(&Self::path(workspace_root))?)
    }

    /// Persist the index atomically.
    pub fn save(&self, workspace_root: &Path) -> Result<()> {
        Ok(ConfigStore::new().save(&Self::path(workspace_root), self)?)
    }

    pub fn get(&self, name: &str) -> Option<&InstalledPackage> {
        self.packages.get(name)
    }

    /// Record (or replace) an installed package.
    pub fn record(&mut self, name: impl Into<String>, package: InstalledPackage) {
        self.packages.insert(name.into(), package);
    }

    /// Whether `name` is installed at exactly `version`.
    ///
    /// An unversioned request matches any installed entry for the name.
    pub fn is_installed(&self, name: &str, version: Option<&semver::Version>) -> bool {
        match (self.packages.get(name), version) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(installed), Some(wanted)) => installed
                .version
                .as_deref()
                .and_then(|v| semver::Version::parse(v).ok())
                .is_some_and(|v| &v == wanted),
        }
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }
}
