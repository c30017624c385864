//! Canonical dependency identity.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Where a dependency's content comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Registry,
    Path,
    Git,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registry => "registry",
            Self::Path => "path",
            Self::Git => "git",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one dependency graph node.
///
/// The `key` is a short SHA-256 digest of the canonical source string
/// (`registry:<name>`, `path:<absolute path>`,
/// `git:<url>#<ref>#<subpath>`). Two declarations that resolve to the same
/// key are the same node. Equality and hashing use the key alone.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyId {
    key: String,
    display_name: String,
    source_type: SourceType,
}

impl DependencyId {
    /// Number of hex digits kept from the digest.
    pub const KEY_LEN: usize = 16;

    pub fn new(canonical: &str, display_name: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            key: opkg_fs::checksum::short_digest(canonical, Self::KEY_LEN),
            display_name: display_name.into(),
            source_type,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn source_type(&self) -> SourceType {
        self.source_type
    }
}

impl PartialEq for DependencyId {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for DependencyId {}

impl Hash for DependencyId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl std::fmt::Display for DependencyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.display_name, self.source_type)
    }
}
