//! Process-local caches shared by concurrent loader tasks.
//!
//! Both caches are plain key -> result maps populated at most once per key:
//! the first writer wins and later readers observe the cached result,
//! cached failures included. Callers that want a fresh fetch use
//! [`ContentRootCache::replace`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use opkg_manifest::PackageManifest;

use super::FetchedSource;

/// Result of fetching one git source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentEntry {
    Available(FetchedSource),
    /// The fetch failed; the reason is kept for diagnostics.
    Unavailable(String),
}

/// Git content cache keyed by `url#ref#subpath`.
#[derive(Debug, Default)]
pub struct ContentRootCache {
    entries: Mutex<HashMap<String, ContentEntry>>,
}

impl ContentRootCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache key for a git source.
    pub fn key(url: &str, reference: Option<&str>, subpath: Option<&str>) -> String {
        format!(
            "{}#{}#{}",
            opkg_git::normalize_url(url),
            reference.unwrap_or("HEAD"),
            subpath.unwrap_or("")
        )
    }

    pub fn get(&self, key: &str) -> Option<ContentEntry> {
        lock(&self.entries).get(key).cloned()
    }

    /// Content root for `key`, or `None` when missing or cached as unavailable.
    pub fn content_root(&self, key: &str) -> Option<PathBuf> {
        match self.get(key)? {
            ContentEntry::Available(fetched) => Some(fetched.content_root),
            ContentEntry::Unavailable(_) => None,
        }
    }

    /// Store `entry` unless the key is already populated. Returns the entry
    /// that ended up in the cache.
    pub fn insert_if_absent(&self, key: String, entry: ContentEntry) -> ContentEntry {
        lock(&self.entries).entry(key).or_insert(entry).clone()
    }

    /// Overwrite the entry for `key`.
    pub fn replace(&self, key: String, entry: ContentEntry) {
        lock(&self.entries).insert(key, entry);
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parsed manifests keyed by the manifest's absolute path.
///
/// `None` records that the content has no manifest.
#[derive(Debug, Default)]
pub struct PackageCache {
    entries: Mutex<HashMap<PathBuf, Option<Arc<PackageManifest>>>>,
}

impl PackageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, manifest_path: &Path) -> Option<Option<Arc<PackageManifest>>> {
        lock(&self.entries).get(manifest_path).cloned()
    }

    pub fn insert_if_absent(
        &self,
        manifest_path: PathBuf,
        manifest: Option<Arc<PackageManifest>>,
    ) -> Option<Arc<PackageManifest>> {
        lock(&self.entries)
            .entry(manifest_path)
            .or_insert(manifest)
            .clone()
    }

    /// Overwrite the entry for `manifest_path`.
    pub fn replace(&self, manifest_path: PathBuf, manifest: Option<Arc<PackageManifest>>) {
        lock(&self.entries).insert(manifest_path, manifest);
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The caches a [`ContentLoader`](super::ContentLoader) works against.
///
/// Cloning shares the underlying caches. Tests construct a fresh value per
/// run to stay isolated.
#[derive(Debug, Clone, Default)]
pub struct LoaderCaches {
    pub content_roots: Arc<ContentRootCache>,
    pub packages: Arc<PackageCache>,
}

impl LoaderCaches {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
