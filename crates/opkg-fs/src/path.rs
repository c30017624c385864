//! Normalized path handling for cross-platform compatibility

use std::path::{Path, PathBuf};

/// A path normalized to use forward slashes internally.
///
/// Backslashes become forward slashes, `.` segments and repeated separators
/// are dropped, and `..` pops the previous segment. A `..` that would climb
/// above the start of the path is discarded, so a normalized path never
/// escapes its base. A leading `//` (network share) is preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedPath {
    /// Internal representation always uses forward slashes
    inner: String,
}

impl NormalizedPath {
    /// Create a new NormalizedPath from any path-like input.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let raw = path.as_ref().to_string_lossy().replace('\\', "/");
        Self { inner: clean(&raw) }
    }

    /// Get the internal normalized string representation.
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Convert to a platform-native PathBuf for I/O operations.
    pub fn to_native(&self) -> PathBuf {
        PathBuf::from(&self.inner)
    }

    /// Join this path with a segment.
    pub fn join(&self, segment: &str) -> Self {
        let segment = segment.replace('\\', "/");
        let joined = if self.inner.is_empty() {
            segment
        } else if self.inner.ends_with('/') {
            format!("{}{}", self.inner, segment)
        } else {
            format!("{}/{}", self.inner, segment)
        };
        Self {
            inner: clean(&joined),
        }
    }

    /// Get the parent directory.
    pub fn parent(&self) -> Option<Self> {
        let trimmed = self.inner.trim_end_matches('/');
        match trimmed.rfind('/') {
            Some(0) => Some(Self {
                inner: "/".to_string(),
            }),
            Some(idx) => Some(Self {
                inner: trimmed[..idx].to_string(),
            }),
            None => None,
        }
    }

    /// Get the file name component.
    pub fn file_name(&self) -> Option<&str> {
        let trimmed = self.inner.trim_end_matches('/');
        trimmed.rsplit('/').next().filter(|name| !name.is_empty())
    }

    /// Get the extension if present.
    pub fn extension(&self) -> Option<&str> {
        self.file_name().and_then(|name| {
            let idx = name.rfind('.')?;
            if idx == 0 { None } else { Some(&name[idx + 1..]) }
        })
    }

    /// Check if this path exists on the filesystem.
    pub fn exists(&self) -> bool {
        self.to_native().exists()
    }

    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.to_native().is_dir()
    }

    /// Check if this is a file.
    pub fn is_file(&self) -> bool {
        self.to_native().is_file()
    }
}

fn clean(raw: &str) -> String {
    let network = raw.starts_with("//") && !raw.starts_with("///");
    let rooted = raw.starts_with('/');

    let mut segments: Vec<&str> = Vec::new();
    for part in raw.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    let body = segments.join("/");
    if network {
        format!("//{body}")
    } else if rooted {
        format!("/{body}")
    } else {
        body
    }
}

/// Resolve `path` against `base` and canonicalize it.
///
/// Symlinks are resolved when the path exists. A path that does not exist
/// yet is still returned in absolute, normalized form so it can serve as a
/// stable identity.
pub fn canonicalize_lenient(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    match dunce::canonicalize(&joined) {
        Ok(resolved) => resolved,
        Err(e) => {
            tracing::debug!(path = %joined.display(), error = %e, "Path not canonicalizable, normalizing lexically");
            NormalizedPath::new(&joined).to_native()
        }
    }
}

impl AsRef<Path> for NormalizedPath {
    fn as_ref(&self) -> &Path {
        Path::new(&self.inner)
    }
}

impl std::fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl From<&str> for NormalizedPath {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for NormalizedPath {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<PathBuf> for NormalizedPath {
    fn from(p: PathBuf) -> Self {
        Self::new(p)
    }
}

impl From<&Path> for NormalizedPath {
    fn from(p: &Path) -> Self {
        Self::new(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_of_root_child_is_root() {
        let p = NormalizedPath::new("/registry");
        assert_eq!(p.parent().unwrap().as_str(), "/");
    }

    #[test]
    fn relative_path_without_separator_has_no_parent() {
        assert!(NormalizedPath::new("pkg").parent().is_none());
    }

    #[test]
    fn canonicalize_lenient_keeps_missing_paths_absolute() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = canonicalize_lenient(dir.path(), Path::new("missing/../pkg"));
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("pkg"));
    }
}
