//! Loader for git sources.
//!
//! Repositories are checked out under `<cache>/git/<url digest>/<ref digest>`
//! so every `url#ref` pair gets its own working tree. Fetches into the same
//! directory are serialized; different directories fetch concurrently.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use opkg_fs::checksum::short_digest;
use opkg_git::{GitFetcher, normalize_url};

use super::{FetchedSource, LoadRequest, SourceLoader};
use crate::error::{Error, Result};
use crate::source::{ResolvedSource, SourceLocation};

/// Clones and checks out git package sources.
#[derive(Debug)]
pub struct GitLoader {
    cache_dir: PathBuf,
    fetcher: GitFetcher,
    checkout_locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl GitLoader {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self::with_fetcher(cache_dir, GitFetcher::new())
    }

    pub fn with_fetcher(cache_dir: impl Into<PathBuf>, fetcher: GitFetcher) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            fetcher,
            checkout_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Working-tree directory for `url` at `reference`.
    pub fn checkout_dir(&self, url: &str, reference: Option<&str>) -> PathBuf {
        self.cache_dir
            .join("git")
            .join(short_digest(&normalize_url(url), 16))
            .join(short_digest(reference.unwrap_or("HEAD"), 12))
    }

    fn checkout_lock(&self, dest: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .checkout_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.entry(dest.to_path_buf()).or_default().clone()
    }
}

/// Last path segment of a git URL without `.git`.
fn repo_name(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    let last = trimmed
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(trimmed);
    last.trim_end_matches(".git").to_string()
}

#[async_trait]
impl SourceLoader for GitLoader {
    async fn load(&self, source: &ResolvedSource, _request: &LoadRequest) -> Result<FetchedSource> {
        let SourceLocation::Git {
            url,
            reference,
            subpath,
        } = &source.location
        else {
            return Err(Error::Load {
                name: source.describe(),
                reason: "not a git source".to_string(),
            });
        };

        let dest = self.checkout_dir(url, reference.as_deref());
        let lock = self.checkout_lock(&dest);
        let _guard = lock.lock().await;

        let fetcher = self.fetcher.clone();
        let (task_url, task_ref, task_sub, task_dest) =
            (url.clone(), reference.clone(), subpath.clone(), dest.clone());
        let checkout = tokio::task::spawn_blocking(move || {
            fetcher.fetch(
                &task_url,
                task_ref.as_deref(),
                task_sub.as_deref(),
                &task_dest,
            )
        })
        .await
        .map_err(|e| Error::Load {
            name: source.describe(),
            reason: format!("git task failed: {e}"),
        })?
        .map_err(|e| Error::Load {
            name: source.describe(),
            reason: e.to_string(),
        })?;

        let package_name = subpath
            .as_deref()
            .and_then(|s| s.rsplit('/').next())
            .map(str::to_string)
            .unwrap_or_else(|| repo_name(url));

        tracing::debug!(url = %url, commit = %checkout.commit, "Loaded git source");

        Ok(FetchedSource {
            package_name,
            version: None,
            content_root: checkout.content_root,
            available_versions: Vec::new(),
            commit_sha: Some(checkout.commit),
            repo_path: Some(checkout.repo_path),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://github.com/acme/rules.git", "rules")]
    #[case("https://github.com/acme/rules/", "rules")]
    #[case("git@github.com:acme/rules.git", "rules")]
    #[case("/srv/repos/rules", "rules")]
    fn repo_names(#[case] url: &str, #[case] expected: &str) {
        assert_eq!(repo_name(url), expected);
    }

    #[test]
    fn checkout_dirs_differ_per_ref() {
        let loader = GitLoader::new("/cache");
        let head = loader.checkout_dir("https://x/y.git", None);
        let tag = loader.checkout_dir("https://x/y.git", Some("v1"));
        assert_ne!(head, tag);
        assert_eq!(head, loader.checkout_dir("https://x/y/", None));
        assert!(head.starts_with("/cache/git"));
    }
}
