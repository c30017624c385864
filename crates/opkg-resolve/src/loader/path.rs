//! Loader for local directory sources.

use async_trait::async_trait;

use super::{FetchedSource, LoadRequest, SourceLoader};
use crate::error::{Error, Result};
use crate::source::{ResolvedSource, SourceLocation};

/// Uses a directory in place as package content.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathLoader;

#[async_trait]
impl SourceLoader for PathLoader {
    async fn load(&self, source: &ResolvedSource, _request: &LoadRequest) -> Result<FetchedSource> {
        let SourceLocation::Path { path } = &source.location else {
            return Err(Error::Load {
                name: source.describe(),
                reason: "not a path source".to_string(),
            });
        };

        let metadata = tokio::fs::metadata(path).await.map_err(|e| Error::Load {
            name: source.describe(),
            reason: format!("cannot read {}: {e}", path.display()),
        })?;
        if !metadata.is_dir() {
            return Err(Error::Load {
                name: source.describe(),
                reason: format!("{} is not a directory", path.display()),
            });
        }

        // Replaced by the manifest name once the manifest is read
        let package_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(FetchedSource {
            package_name,
            version: None,
            content_root: path.clone(),
            available_versions: Vec::new(),
            commit_sha: None,
            repo_path: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn directory_is_its_own_content_root() {
        let temp = tempfile::TempDir::new().unwrap();
        let dir = temp.path().join("skills");
        std::fs::create_dir(&dir).unwrap();

        let fetched = PathLoader
            .load(&ResolvedSource::path(&dir), &LoadRequest::default())
            .await
            .unwrap();
        assert_eq!(fetched.content_root, dir);
        assert_eq!(fetched.package_name, "skills");
    }

    #[tokio::test]
    async fn missing_directory_is_load_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let err = PathLoader
            .load(
                &ResolvedSource::path(temp.path().join("absent")),
                &LoadRequest::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Load { .. }));
    }
}
