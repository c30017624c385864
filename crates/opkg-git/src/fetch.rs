//! Clone/refresh and checkout of git package sources
//!
//! All operations are blocking `git2` calls. Async callers are expected to
//! run them on a blocking thread.

use std::path::{Path, PathBuf};
use std::time::Duration;

use backoff::ExponentialBackoff;
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{FetchOptions, Object, Repository};

use crate::{Error, Result};

/// A checked-out working tree at a specific commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkout {
    /// Root of the repository working tree.
    pub repo_path: PathBuf,
    /// Directory holding the package content (`repo_path` joined with the subpath).
    pub content_root: PathBuf,
    /// Full hex SHA of the checked-out commit.
    pub commit: String,
}

/// Fetches git sources into caller-chosen directories.
#[derive(Debug, Clone)]
pub struct GitFetcher {
    /// Upper bound on the total time spent retrying transient network errors.
    max_retry_elapsed: Duration,
}

impl Default for GitFetcher {
    fn default() -> Self {
        Self {
            max_retry_elapsed: Duration::from_secs(30),
        }
    }
}

impl GitFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override how long transient failures are retried.
    pub fn with_retry_budget(mut self, budget: Duration) -> Self {
        self.max_retry_elapsed = budget;
        self
    }

    /// Make `dest` a checkout of `url` at `reference` and return it.
    ///
    /// An existing repository at `dest` is fetched and reused; otherwise the
    /// repository is cloned. `reference` may name a branch, tag or commit;
    /// `None` selects the remote's default branch. `subpath` must exist
    /// inside the checkout.
    pub fn fetch(
        &self,
        url: &str,
        reference: Option<&str>,
        subpath: Option<&str>,
        dest: &Path,
    ) -> Result<Checkout> {
        let repo = self.with_retry(|| open_or_clone(url, dest))?;
        let commit = checkout_reference(&repo, url, reference)?;

        let content_root = match subpath.filter(|s| !s.is_empty()) {
            Some(sub) => {
                let root = dest.join(sub);
                if !root.is_dir() {
                    return Err(Error::SubpathNotFound {
                        subpath: sub.to_string(),
                        checkout: dest.to_path_buf(),
                    });
                }
                root
            }
            None => dest.to_path_buf(),
        };

        tracing::debug!(url, reference = ?reference, commit = %commit, "Checked out git source");

        Ok(Checkout {
            repo_path: dest.to_path_buf(),
            content_root,
            commit,
        })
    }

    fn with_retry<T>(&self, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let policy = ExponentialBackoff {
            max_elapsed_time: Some(self.max_retry_elapsed),
            ..ExponentialBackoff::default()
        };

        backoff::retry(policy, || {
            op().map_err(|e| {
                if e.is_transient() {
                    tracing::warn!(error = %e, "Transient git failure, retrying");
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        })
        .map_err(|e| match e {
            backoff::Error::Permanent(err) => err,
            backoff::Error::Transient { err, .. } => err,
        })
    }
}

fn open_or_clone(url: &str, dest: &Path) -> Result<Repository> {
    if dest.join(".git").exists() {
        let repo = Repository::open(dest)?;
        {
            let mut remote = repo.find_remote("origin")?;
            let mut opts = FetchOptions::new();
            remote.fetch(
                &[
                    "+refs/heads/*:refs/remotes/origin/*",
                    "+refs/tags/*:refs/tags/*",
                ],
                Some(&mut opts),
                None,
            )?;
        }
        return Ok(repo);
    }

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| opkg_fs::Error::io(parent, e))?;
    }
    Ok(RepoBuilder::new().clone(url, dest)?)
}

fn checkout_reference(repo: &Repository, url: &str, reference: Option<&str>) -> Result<String> {
    let object = resolve_reference(repo, url, reference)?;
    let commit = object.peel_to_commit()?;

    repo.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force()))?;
    repo.set_head_detached(commit.id())?;

    Ok(commit.id().to_string())
}

fn resolve_reference<'r>(
    repo: &'r Repository,
    url: &str,
    reference: Option<&str>,
) -> Result<Object<'r>> {
    let candidates: Vec<String> = match reference {
        None => vec!["refs/remotes/origin/HEAD".to_string(), "HEAD".to_string()],
        Some(r) => vec![
            format!("refs/remotes/origin/{r}"),
            format!("refs/tags/{r}"),
            r.to_string(),
        ],
    };

    candidates
        .iter()
        .find_map(|spec| repo.revparse_single(spec).ok())
        .ok_or_else(|| Error::RefNotFound {
            url: url.to_string(),
            reference: reference.unwrap_or("HEAD").to_string(),
        })
}
