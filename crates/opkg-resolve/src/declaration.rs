//! Raw dependency declarations extracted from manifests.

use std::path::{Path, PathBuf};

use opkg_manifest::DependencyEntry;

use crate::error::{Error, Result};
use crate::version::VersionConstraint;

/// One dependency edge as written in a manifest, before resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyDeclaration {
    pub name: String,
    /// Parsed version range; `None` for trivial or absent ranges.
    pub constraint: Option<VersionConstraint>,
    pub path: Option<String>,
    pub git_url: Option<String>,
    pub git_ref: Option<String>,
    pub git_subpath: Option<String>,
    /// Declared under `dev-dependencies`.
    pub dev: bool,
    /// Manifest file that declared this edge.
    pub declared_in: PathBuf,
    /// Distance from the root manifest (its direct dependencies are depth 1).
    pub depth: usize,
}

impl DependencyDeclaration {
    /// Build a declaration from a manifest entry, rejecting malformed entries.
    pub fn from_entry(
        entry: &DependencyEntry,
        dev: bool,
        declared_in: &Path,
        depth: usize,
    ) -> Result<Self> {
        let declaration_error = |reason: String| Error::Declaration {
            name: entry.name.clone(),
            manifest: declared_in.to_path_buf(),
            reason,
        };

        entry.validate().map_err(|e| declaration_error(e.to_string()))?;

        let constraint = entry
            .version
            .as_deref()
            .map(VersionConstraint::parse)
            .transpose()
            .map_err(|e| declaration_error(e.to_string()))?
            .flatten();

        Ok(Self {
            name: entry.name.trim().to_string(),
            constraint,
            path: non_empty(&entry.path),
            git_url: non_empty(&entry.url),
            git_ref: non_empty(&entry.reference),
            git_subpath: non_empty(&entry.subpath)
                .map(|s| s.trim_matches('/').to_string()),
            dev,
            declared_in: declared_in.to_path_buf(),
            depth,
        })
    }

    /// Directory of the declaring manifest; relative paths resolve against it.
    pub fn manifest_dir(&self) -> &Path {
        self.declared_in.parent().unwrap_or_else(|| Path::new("."))
    }

    /// The version range as written, or `*` when unconstrained.
    pub fn range_display(&self) -> &str {
        self.constraint.as_ref().map_or("*", |c| c.as_str())
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
