//! [`TestWorkspace`] builder for resolver scenarios.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::ManifestBuilder;
use crate::git;

/// Manifest file name written by the fixtures.
pub const MANIFEST: &str = "openpackage.yml";

/// A scratch directory holding a workspace, a local registry, a cache and
/// any git remotes a test creates.
///
/// ```text
/// <tmp>/
///   workspace/openpackage.yml
///   registry/<name>/<version>/openpackage.yml
///   cache/
///   remotes/<name>/
/// ```
///
/// # Example
///
/// ```rust,no_run
/// use opkg_test_utils::{ManifestBuilder, TestWorkspace};
///
/// let ws = TestWorkspace::new();
/// ws.registry_package(ManifestBuilder::new("core").version("1.0.0"));
/// ws.root_manifest(ManifestBuilder::new("app").registry_dep("core", "^1.0.0"));
/// ```
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorkspace {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        for dir in ["workspace", "registry", "cache", "remotes"] {
            fs::create_dir_all(temp_dir.path().join(dir)).unwrap();
        }
        Self { temp_dir }
    }

    /// Workspace root (holds the root manifest).
    pub fn root(&self) -> PathBuf {
        self.temp_dir.path().join("workspace")
    }

    pub fn registry_dir(&self) -> PathBuf {
        self.temp_dir.path().join("registry")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.temp_dir.path().join("cache")
    }

    /// Write the workspace's root manifest.
    pub fn root_manifest(&self, manifest: ManifestBuilder) -> PathBuf {
        write_manifest(&self.root(), &manifest.to_yaml())
    }

    /// Write a raw root manifest (for malformed-input tests).
    pub fn raw_root_manifest(&self, yaml: &str) -> PathBuf {
        write_manifest(&self.root(), yaml)
    }

    /// Publish a package version into the local registry.
    ///
    /// The builder must carry a version; it names the version directory.
    pub fn registry_package(&self, manifest: ManifestBuilder) -> PathBuf {
        let yaml = manifest.to_yaml();
        let (name, version) = name_and_version(&yaml);
        let dir = self.registry_dir().join(&name).join(&version);
        write_manifest(&dir, &yaml);
        fs::write(dir.join("README.md"), format!("# {name}\n")).unwrap();
        dir
    }

    /// Create a package directory at `relative` under the workspace root.
    pub fn path_package(&self, relative: &str, manifest: ManifestBuilder) -> PathBuf {
        let dir = self.root().join(relative);
        write_manifest(&dir, &manifest.to_yaml());
        dir
    }

    /// Create a git remote named `name` whose root holds `manifest`.
    ///
    /// Returns the remote's path, usable as a clone URL.
    pub fn git_package(&self, name: &str, manifest: ManifestBuilder) -> (PathBuf, git2::Repository) {
        let path = self.temp_dir.path().join("remotes").join(name);
        let yaml = manifest.to_yaml();
        let repo = git::package_repo(&path, &[(MANIFEST, yaml.as_str())]);
        (path, repo)
    }

    /// Assert that `relative` exists under the workspace root.
    pub fn assert_file_exists(&self, relative: &str) {
        let full_path = self.root().join(relative);
        assert!(
            full_path.exists(),
            "Expected file to exist: {}",
            full_path.display()
        );
    }
}

fn write_manifest(dir: &Path, yaml: &str) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(MANIFEST);
    fs::write(&path, yaml).unwrap();
    path
}

fn name_and_version(yaml: &str) -> (String, String) {
    let field = |key: &str| {
        yaml.lines()
            .find_map(|line| line.strip_prefix(key))
            .map(|v| v.trim().trim_matches('"').to_string())
    };
    let name = field("name: ").unwrap_or_else(|| panic!("registry_package: manifest has no name"));
    let version =
        field("version: ").unwrap_or_else(|| panic!("registry_package: manifest has no version"));
    (name, version)
}
