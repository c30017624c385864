//! Loader for the local package registry.
//!
//! Layout: `<root>/<name>/<version>/openpackage.yml`. Every directory under
//! `<root>/<name>` whose name parses as a semver version is an available
//! version of that package.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use semver::Version;

use super::{FetchedSource, LoadRequest, SourceLoader};
use crate::error::{Error, Result};
use crate::source::ResolvedSource;

/// Reads packages from a registry directory.
#[derive(Debug, Clone)]
pub struct RegistryLoader {
    root: PathBuf,
}

impl RegistryLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All versions of `package`, ascending.
    pub async fn available_versions(&self, package: &str) -> Result<Vec<Version>> {
        let dir = self.root.join(package);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(opkg_fs::Error::io(&dir, e).into()),
        };

        let mut versions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| opkg_fs::Error::io(&dir, e))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if !is_dir {
                continue;
            }
            if let Some(version) = entry
                .file_name()
                .to_str()
                .and_then(|name| Version::parse(name.trim_start_matches('v')).ok())
            {
                versions.push(version);
            }
        }

        versions.sort();
        versions.dedup();
        Ok(versions)
    }
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

/// Pick the version to load.
///
/// A pinned version must exist. Otherwise the highest version satisfying the
/// first constraint wins, falling back to the highest stable and then the
/// highest overall so the solver still sees the package.
fn select_version(
    available: &[Version],
    pinned: Option<&Version>,
    request: &LoadRequest,
) -> Option<Version> {
    if let Some(pinned) = pinned {
        return available.iter().find(|v| *v == pinned).cloned();
    }

    let matching = request.constraints.first().and_then(|c| {
        available
            .iter()
            .rev()
            .find(|v| c.matches(v, request.allow_prerelease))
    });

    matching
        .or_else(|| available.iter().rev().find(|v| v.pre.is_empty()))
        .or_else(|| available.last())
        .cloned()
}

#[async_trait]
impl SourceLoader for RegistryLoader {
    async fn load(&self, source: &ResolvedSource, request: &LoadRequest) -> Result<FetchedSource> {
        let package = source.registry_package().ok_or_else(|| Error::Load {
            name: source.describe(),
            reason: "not a registry source".to_string(),
        })?;

        let available = self.available_versions(package).await?;
        if available.is_empty() {
            return Err(Error::Load {
                name: package.to_string(),
                reason: format!("not found in registry {}", self.root.display()),
            });
        }

        let version = select_version(&available, source.registry_version(), request)
            .ok_or_else(|| Error::Load {
                name: package.to_string(),
                reason: format!(
                    "version {} is not in the registry",
                    source
                        .registry_version()
                        .map_or_else(String::new, Version::to_string)
                ),
            })?;

        let mut content_root = self.root.join(package).join(version.to_string());
        if !is_dir(&content_root).await {
            content_root = self.root.join(package).join(format!("v{version}"));
        }
        tracing::debug!(package, version = %version, "Selected registry version");

        Ok(FetchedSource {
            package_name: package.to_string(),
            version: Some(version),
            content_root,
            available_versions: available,
            commit_sha: None,
            repo_path: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::VersionConstraint;
    use pretty_assertions::assert_eq;

    fn versions(list: &[&str]) -> Vec<Version> {
        list.iter().map(|v| Version::parse(v).unwrap()).collect()
    }

    fn request(range: Option<&str>) -> LoadRequest {
        LoadRequest {
            constraints: range
                .and_then(|r| VersionConstraint::parse(r).unwrap())
                .into_iter()
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn highest_matching_constraint() {
        let available = versions(&["1.0.0", "1.2.0", "1.3.0", "2.0.0"]);
        let selected = select_version(&available, None, &request(Some("^1.0.0")));
        assert_eq!(selected, Some(Version::new(1, 3, 0)));
    }

    #[test]
    fn unconstrained_prefers_stable() {
        let available = versions(&["1.0.0", "2.0.0-beta.1"]);
        let selected = select_version(&available, None, &request(None));
        assert_eq!(selected, Some(Version::new(1, 0, 0)));
    }

    #[test]
    fn unsatisfiable_falls_back_to_highest_stable() {
        let available = versions(&["1.0.0", "1.5.0"]);
        let selected = select_version(&available, None, &request(Some("^3.0.0")));
        assert_eq!(selected, Some(Version::new(1, 5, 0)));
    }

    #[test]
    fn pinned_version_must_exist() {
        let available = versions(&["1.0.0"]);
        assert_eq!(
            select_version(&available, Some(&Version::new(1, 0, 0)), &request(None)),
            Some(Version::new(1, 0, 0))
        );
        assert_eq!(
            select_version(&available, Some(&Version::new(9, 0, 0)), &request(None)),
            None
        );
    }

    #[tokio::test]
    async fn lists_semver_directories_only() {
        let temp = tempfile::TempDir::new().unwrap();
        for dir in ["1.0.0", "v1.1.0", "notes", "2.0.0"] {
            std::fs::create_dir_all(temp.path().join("core").join(dir)).unwrap();
        }
        std::fs::write(temp.path().join("core").join("3.0.0"), "file, not dir").unwrap();

        let loader = RegistryLoader::new(temp.path());
        let found = loader.available_versions("core").await.unwrap();
        assert_eq!(found, versions(&["1.0.0", "1.1.0", "2.0.0"]));
        assert!(loader.available_versions("missing").await.unwrap().is_empty());
    }
}
