//! Manifest schema for `openpackage.yml` files.
//!
//! # Example YAML
//!
//! ```yaml
//! name: agent-rules
//! version: 1.2.0
//! description: Shared rules for coding agents
//! dependencies:
//!   - name: core-prompts
//!     version: ^1.0.0
//!   - name: local-skills
//!     path: ./packages/skills
//!   - name: remote-commands
//!     url: https://github.com/acme/commands.git
//!     ref: v2
//!     subpath: packages/commands
//! dev-dependencies:
//!   - name: lint-rules
//! ```

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

static PACKAGE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(@[a-z0-9][a-z0-9._-]*/)?[a-z0-9][a-z0-9._-]*$")
        .expect("Invalid package name regex")
});

/// A parsed `openpackage.yml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PackageManifest {
    /// Package name.
    pub name: String,
    /// Semver version of this package, if declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Runtime dependencies.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<DependencyEntry>,
    /// Dependencies only needed while developing this package.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dev_dependencies: Vec<DependencyEntry>,
}

impl PackageManifest {
    /// Parse manifest YAML.
    ///
    /// Validates the package name and version. Individual dependency
    /// entries are not validated here: a bad entry is reported by whoever
    /// consumes it, so one malformed edge does not hide the rest.
    pub fn from_yaml(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Check name and version fields.
    pub fn validate(&self) -> Result<()> {
        validate_package_name(&self.name)?;
        self.parsed_version()?;
        Ok(())
    }

    /// The manifest's own version, parsed.
    pub fn parsed_version(&self) -> Result<Option<semver::Version>> {
        self.version
            .as_deref()
            .map(|v| {
                semver::Version::parse(v.trim()).map_err(|source| Error::InvalidVersion {
                    version: v.to_string(),
                    source,
                })
            })
            .transpose()
    }

    /// Runtime dependencies followed by dev dependencies when `include_dev`.
    ///
    /// Each entry is paired with its dev flag.
    pub fn entries(&self, include_dev: bool) -> impl Iterator<Item = (&DependencyEntry, bool)> {
        let dev: &[DependencyEntry] = if include_dev {
            &self.dev_dependencies
        } else {
            &[]
        };
        self.dependencies
            .iter()
            .map(|d| (d, false))
            .chain(dev.iter().map(|d| (d, true)))
    }
}

/// One dependency entry as written in a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DependencyEntry {
    pub name: String,
    /// Version range (registry sources only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Local filesystem path, relative to the declaring manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Git clone URL or `gh@owner/repo` shorthand.
    #[serde(default, alias = "git", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Branch, tag or commit. Serialized as `ref`.
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Directory inside the git repository holding the package.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subpath: Option<String>,
}

impl DependencyEntry {
    /// Reject entries that name more than one source or carry git-only
    /// fields without a git source.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| Error::InvalidDependency {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name is empty"));
        }
        if self.path.is_some() && self.url.is_some() {
            return Err(invalid("both 'path' and 'url' are set"));
        }
        if self.url.is_none() {
            if self.reference.is_some() {
                return Err(invalid("'ref' requires a git 'url'"));
            }
            if self.subpath.is_some() {
                return Err(invalid("'subpath' requires a git 'url'"));
            }
        }
        if self.path.is_some() && self.version.is_some() {
            return Err(invalid("'version' cannot be combined with 'path'"));
        }
        Ok(())
    }
}

/// Validate a package name.
///
/// Names are lowercase alphanumerics joined by `-`, `_` or `.`, optionally
/// scoped as `@scope/name`.
pub fn validate_package_name(name: &str) -> Result<()> {
    if PACKAGE_NAME.is_match(name) {
        Ok(())
    } else {
        Err(Error::InvalidName {
            name: name.to_string(),
            reason: "must be lowercase alphanumerics, '-', '_' or '.', optionally '@scope/'"
                .to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_all_source_kinds() {
        let yaml = r#"
name: agent-rules
version: 1.2.0
dependencies:
  - name: core
    version: ^1.0.0
  - name: local
    path: ./packages/local
  - name: remote
    git: https://github.com/acme/remote.git
    ref: v2
    subpath: pkg
dev-dependencies:
  - name: lint
"#;
        let manifest = PackageManifest::from_yaml(yaml).unwrap();
        assert_eq!(manifest.name, "agent-rules");
        assert_eq!(manifest.dependencies.len(), 3);
        assert_eq!(manifest.dev_dependencies.len(), 1);

        let remote = &manifest.dependencies[2];
        assert_eq!(remote.url.as_deref(), Some("https://github.com/acme/remote.git"));
        assert_eq!(remote.reference.as_deref(), Some("v2"));
        assert_eq!(remote.subpath.as_deref(), Some("pkg"));
    }

    #[test]
    fn entries_respect_include_dev() {
        let manifest = PackageManifest::from_yaml(
            "name: a\ndependencies:\n  - name: b\ndev-dependencies:\n  - name: c\n",
        )
        .unwrap();

        let runtime: Vec<_> = manifest.entries(false).map(|(d, _)| d.name.as_str()).collect();
        assert_eq!(runtime, vec!["b"]);

        let all: Vec<_> = manifest
            .entries(true)
            .map(|(d, dev)| (d.name.as_str(), dev))
            .collect();
        assert_eq!(all, vec![("b", false), ("c", true)]);
    }

    #[test]
    fn path_and_url_together_is_invalid() {
        let entry = DependencyEntry {
            name: "x".into(),
            path: Some("./x".into()),
            url: Some("https://example.com/x.git".into()),
            ..Default::default()
        };
        assert!(matches!(entry.validate(), Err(Error::InvalidDependency { .. })));
    }

    #[test]
    fn ref_without_url_is_invalid() {
        let entry = DependencyEntry {
            name: "x".into(),
            reference: Some("main".into()),
            ..Default::default()
        };
        let err = entry.validate().unwrap_err();
        assert!(err.to_string().contains("'ref' requires"));
    }

    #[test]
    fn registry_entry_is_valid() {
        let entry = DependencyEntry {
            name: "core".into(),
            version: Some("^1.0.0".into()),
            ..Default::default()
        };
        entry.validate().unwrap();
    }

    #[test]
    fn package_names() {
        validate_package_name("core-rules").unwrap();
        validate_package_name("@acme/core.rules_v2").unwrap();
        assert!(validate_package_name("Core").is_err());
        assert!(validate_package_name("-core").is_err());
        assert!(validate_package_name("").is_err());
    }

    #[test]
    fn invalid_manifest_version_is_reported() {
        let manifest = PackageManifest::from_yaml("name: a\nversion: one\n").unwrap();
        assert!(matches!(manifest.validate(), Err(Error::InvalidVersion { .. })));
    }
}
