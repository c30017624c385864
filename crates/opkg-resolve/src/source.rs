//! Source resolution: turning a declaration into an unambiguous source.
//!
//! Resolution never fetches anything. It only decides *which* registry
//! package, directory or git checkout a declaration refers to, so the
//! graph builder can compute identities before loading.

use std::path::{Path, PathBuf};

use opkg_git::{normalize_url, parse_shorthand};
use semver::Version;
use serde::Serialize;

use crate::declaration::DependencyDeclaration;
use crate::error::{Error, Result};
use crate::id::{DependencyId, SourceType};

/// Exactly one concrete location for a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceLocation {
    /// A package in the registry. `version` is filled once a concrete
    /// version is selected (by the loader, later possibly by the solver).
    Registry {
        package: String,
        version: Option<Version>,
    },
    /// An absolute directory on disk.
    Path { path: PathBuf },
    /// A git repository at a ref, optionally narrowed to a subdirectory.
    Git {
        url: String,
        reference: Option<String>,
        subpath: Option<String>,
    },
}

/// A declaration with all ambiguity removed, plus the on-disk location of
/// its content once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedSource {
    pub location: SourceLocation,
    /// Absolute path to the fetched or extracted content.
    pub content_root: Option<PathBuf>,
    /// Absolute path to the package manifest inside `content_root`.
    pub manifest_path: Option<PathBuf>,
}

impl ResolvedSource {
    pub fn registry(package: impl Into<String>) -> Self {
        Self::unloaded(SourceLocation::Registry {
            package: package.into(),
            version: None,
        })
    }

    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::unloaded(SourceLocation::Path { path: path.into() })
    }

    pub fn git(url: impl Into<String>, reference: Option<String>, subpath: Option<String>) -> Self {
        Self::unloaded(SourceLocation::Git {
            url: url.into(),
            reference,
            subpath,
        })
    }

    fn unloaded(location: SourceLocation) -> Self {
        Self {
            location,
            content_root: None,
            manifest_path: None,
        }
    }

    pub fn source_type(&self) -> SourceType {
        match self.location {
            SourceLocation::Registry { .. } => SourceType::Registry,
            SourceLocation::Path { .. } => SourceType::Path,
            SourceLocation::Git { .. } => SourceType::Git,
        }
    }

    /// Canonical string the identity key is hashed from.
    ///
    /// Registry identity deliberately ignores the version: every request
    /// for one package name collapses onto one node.
    pub fn canonical(&self) -> String {
        match &self.location {
            SourceLocation::Registry { package, .. } => format!("registry:{package}"),
            SourceLocation::Path { path } => {
                format!("path:{}", opkg_fs::NormalizedPath::new(path))
            }
            SourceLocation::Git {
                url,
                reference,
                subpath,
            } => format!(
                "git:{}#{}#{}",
                normalize_url(url),
                reference.as_deref().unwrap_or("HEAD"),
                subpath.as_deref().unwrap_or("")
            ),
        }
    }

    /// Identity of this source, labelled with `display_name`.
    pub fn id(&self, display_name: &str) -> DependencyId {
        DependencyId::new(&self.canonical(), display_name, self.source_type())
    }

    /// Registry package name, for registry sources.
    pub fn registry_package(&self) -> Option<&str> {
        match &self.location {
            SourceLocation::Registry { package, .. } => Some(package),
            _ => None,
        }
    }

    /// Selected registry version, for registry sources.
    pub fn registry_version(&self) -> Option<&Version> {
        match &self.location {
            SourceLocation::Registry { version, .. } => version.as_ref(),
            _ => None,
        }
    }

    /// Pin the registry version. No-op for other source types.
    pub fn set_registry_version(&mut self, selected: Version) {
        if let SourceLocation::Registry { version, .. } = &mut self.location {
            *version = Some(selected);
        }
    }

    /// Short human-readable description (`core@1.2.0`, `path:/x`, `git:url#ref`).
    pub fn describe(&self) -> String {
        match &self.location {
            SourceLocation::Registry {
                package,
                version: Some(v),
            } => format!("{package}@{v}"),
            SourceLocation::Registry { package, .. } => package.clone(),
            SourceLocation::Path { path } => format!("path:{}", path.display()),
            SourceLocation::Git { url, reference, .. } => {
                format!("git:{url}#{}", reference.as_deref().unwrap_or("HEAD"))
            }
        }
    }
}

/// Resolves declarations relative to the manifest that declared them.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceResolver;

impl SourceResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve `declaration` into a [`ResolvedSource`].
    ///
    /// # Errors
    ///
    /// [`Error::SourceResolution`] when the git URL is unrecognizable or
    /// the registry name is not a valid package name.
    pub fn resolve(&self, declaration: &DependencyDeclaration) -> Result<ResolvedSource> {
        let resolution_error = |reason: String| Error::SourceResolution {
            name: declaration.name.clone(),
            reason,
        };

        if let Some(url) = &declaration.git_url {
            return self.resolve_git(declaration, url).map_err(resolution_error);
        }

        if let Some(path) = &declaration.path {
            let resolved =
                opkg_fs::canonicalize_lenient(declaration.manifest_dir(), Path::new(path));
            return Ok(ResolvedSource::path(resolved));
        }

        if let Some(shorthand) = parse_shorthand(&declaration.name) {
            if declaration.constraint.is_some() {
                return Err(resolution_error(
                    "a version range cannot be combined with a git shorthand name".to_string(),
                ));
            }
            return Ok(ResolvedSource::git(shorthand.url, None, shorthand.subpath));
        }

        opkg_manifest::validate_package_name(&declaration.name)
            .map_err(|e| resolution_error(e.to_string()))?;
        Ok(ResolvedSource::registry(&declaration.name))
    }

    fn resolve_git(
        &self,
        declaration: &DependencyDeclaration,
        url: &str,
    ) -> std::result::Result<ResolvedSource, String> {
        if let Some(shorthand) = parse_shorthand(url) {
            let subpath = join_subpaths(shorthand.subpath, declaration.git_subpath.clone());
            return Ok(ResolvedSource::git(
                shorthand.url,
                declaration.git_ref.clone(),
                subpath,
            ));
        }

        let url = if looks_like_remote(url) {
            url.to_string()
        } else {
            // Local repositories resolve like path sources
            let local = opkg_fs::canonicalize_lenient(declaration.manifest_dir(), Path::new(url));
            if !local.join(".git").exists() && !url.ends_with(".git") {
                return Err(format!("'{url}' is not a recognizable git URL"));
            }
            local.to_string_lossy().into_owned()
        };

        Ok(ResolvedSource::git(
            url,
            declaration.git_ref.clone(),
            declaration.git_subpath.clone(),
        ))
    }
}

fn looks_like_remote(url: &str) -> bool {
    url.contains("://") || url.starts_with("git@")
}

fn join_subpaths(a: Option<String>, b: Option<String>) -> Option<String> {
    match (a, b) {
        (Some(a), Some(b)) => Some(format!("{a}/{b}")),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opkg_manifest::DependencyEntry;
    use pretty_assertions::assert_eq;

    fn declare(entry: DependencyEntry) -> DependencyDeclaration {
        DependencyDeclaration::from_entry(&entry, false, Path::new("/work/openpackage.yml"), 1)
            .unwrap()
    }

    #[test]
    fn registry_declaration() {
        let decl = declare(DependencyEntry {
            name: "core".into(),
            version: Some("^1.0.0".into()),
            ..Default::default()
        });
        let source = SourceResolver.resolve(&decl).unwrap();
        assert_eq!(source.registry_package(), Some("core"));
        assert_eq!(source.canonical(), "registry:core");
    }

    #[test]
    fn path_is_resolved_against_manifest_dir() {
        let decl = declare(DependencyEntry {
            name: "local".into(),
            path: Some("./packages/../packages/local".into()),
            ..Default::default()
        });
        let source = SourceResolver.resolve(&decl).unwrap();
        assert_eq!(source.canonical(), "path:/work/packages/local");
    }

    #[test]
    fn shorthand_name_becomes_git_source() {
        let decl = declare(DependencyEntry {
            name: "gh@acme/rules/packages/core".into(),
            ..Default::default()
        });
        let source = SourceResolver.resolve(&decl).unwrap();
        assert_eq!(
            source.location,
            SourceLocation::Git {
                url: "https://github.com/acme/rules.git".into(),
                reference: None,
                subpath: Some("packages/core".into()),
            }
        );
    }

    #[test]
    fn shorthand_name_tracks_default_branch() {
        let mut decl = declare(DependencyEntry {
            name: "gh@acme/rules".into(),
            ..Default::default()
        });
        decl.git_ref = Some("v2".into());
        let source = SourceResolver.resolve(&decl).unwrap();
        assert_eq!(
            source.location,
            SourceLocation::Git {
                url: "https://github.com/acme/rules.git".into(),
                reference: None,
                subpath: None,
            }
        );
    }

    #[test]
    fn equivalent_git_urls_share_identity() {
        let a = ResolvedSource::git("https://github.com/acme/rules.git", None, None);
        let b = ResolvedSource::git("https://GitHub.com/acme/rules/", None, None);
        assert_eq!(a.id("rules"), b.id("rules"));

        let tagged = ResolvedSource::git("https://github.com/acme/rules", Some("v1".into()), None);
        assert_ne!(a.id("rules"), tagged.id("rules"));
    }

    #[test]
    fn unrecognized_git_url_is_resolution_error() {
        let decl = declare(DependencyEntry {
            name: "weird".into(),
            url: Some("not-a-repo".into()),
            ..Default::default()
        });
        assert!(matches!(
            SourceResolver.resolve(&decl),
            Err(Error::SourceResolution { .. })
        ));
    }

    #[test]
    fn invalid_registry_name_is_resolution_error() {
        let decl = declare(DependencyEntry {
            name: "Not Valid".into(),
            ..Default::default()
        });
        assert!(matches!(
            SourceResolver.resolve(&decl),
            Err(Error::SourceResolution { .. })
        ));
    }
}
