//! Content loading for resolved sources.
//!
//! [`ContentLoader`] dispatches a [`ResolvedSource`] to the [`SourceLoader`]
//! for its source type, reads the package manifest from the fetched content
//! and returns [`LoadedPackageData`]. Git fetches go through the shared
//! [`ContentRootCache`], so repeated edges to one repository (or to one
//! broken repository) cost a single fetch per run.

mod cache;
mod git;
mod path;
mod registry;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use opkg_manifest::{MANIFEST_FILENAME, ManifestReader, PackageManifest};
use semver::Version;
use tokio::task::JoinSet;

pub use cache::{ContentEntry, ContentRootCache, LoaderCaches, PackageCache};
pub use git::GitLoader;
pub use path::PathLoader;
pub use registry::RegistryLoader;

use crate::error::{Error, Result};
use crate::graph::{DependencyGraph, NodeState};
use crate::solver::VersionSolution;
use crate::source::{ResolvedSource, SourceLocation};
use crate::version::VersionConstraint;

/// What a source loader produced for one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedSource {
    pub package_name: String,
    /// Selected version (registry sources only).
    pub version: Option<Version>,
    /// Absolute path to the package content.
    pub content_root: PathBuf,
    /// Every version the source offers, ascending. Empty for unversioned sources.
    pub available_versions: Vec<Version>,
    /// Checked-out commit (git sources only).
    pub commit_sha: Option<String>,
    /// Repository working tree (git sources only).
    pub repo_path: Option<PathBuf>,
}

/// Per-load inputs a source loader may use.
#[derive(Debug, Clone, Default)]
pub struct LoadRequest {
    /// Every non-trivial range declared for the node, in declaration order.
    pub constraints: Vec<VersionConstraint>,
    /// Bypass (and then repopulate) the git content cache.
    pub skip_cache: bool,
    pub allow_prerelease: bool,
}

/// Fetches the content of one kind of source.
///
/// Implementations are shared across concurrent loader tasks.
#[async_trait]
pub trait SourceLoader: Send + Sync {
    /// Fetch `source` and report where its content lives.
    ///
    /// # Errors
    ///
    /// [`Error::Load`] when the source cannot be fetched.
    async fn load(&self, source: &ResolvedSource, request: &LoadRequest) -> Result<FetchedSource>;
}

/// One loader per source type.
#[derive(Clone)]
pub struct SourceLoaders {
    pub registry: Arc<dyn SourceLoader>,
    pub path: Arc<dyn SourceLoader>,
    pub git: Arc<dyn SourceLoader>,
}

impl SourceLoaders {
    /// Filesystem registry at `registry_dir`, git checkouts under `cache_dir`.
    pub fn local(registry_dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry: Arc::new(RegistryLoader::new(registry_dir)),
            path: Arc::new(PathLoader),
            git: Arc::new(GitLoader::new(cache_dir)),
        }
    }

    fn for_source(&self, source: &ResolvedSource) -> &dyn SourceLoader {
        match source.location {
            SourceLocation::Registry { .. } => self.registry.as_ref(),
            SourceLocation::Path { .. } => self.path.as_ref(),
            SourceLocation::Git { .. } => self.git.as_ref(),
        }
    }
}

/// A loaded package: fetched content plus its parsed manifest.
#[derive(Debug, Clone)]
pub struct LoadedPackageData {
    pub package_name: String,
    pub version: Option<Version>,
    pub content_root: PathBuf,
    /// Set when the content carries a manifest.
    pub manifest_path: Option<PathBuf>,
    /// `None` for content without a manifest; such a package has no dependencies.
    pub manifest: Option<Arc<PackageManifest>>,
    pub available_versions: Vec<Version>,
    pub commit_sha: Option<String>,
    pub repo_path: Option<PathBuf>,
}

impl LoadedPackageData {
    /// Record content location (and the selected registry version) on `source`.
    pub fn apply_to(&self, source: &mut ResolvedSource) {
        source.content_root = Some(self.content_root.clone());
        source.manifest_path = self.manifest_path.clone();
        if let Some(version) = &self.version {
            source.set_registry_version(version.clone());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderOptions {
    /// Load nodes at the same graph depth concurrently.
    pub parallel: bool,
    /// Reuse manifests already parsed earlier in the run.
    pub cache_packages: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            cache_packages: true,
        }
    }
}

/// Loads resolved sources through the configured loaders and caches.
#[derive(Clone)]
pub struct ContentLoader {
    loaders: SourceLoaders,
    reader: Arc<dyn ManifestReader>,
    caches: LoaderCaches,
    options: LoaderOptions,
}

impl ContentLoader {
    pub fn new(loaders: SourceLoaders, reader: Arc<dyn ManifestReader>, caches: LoaderCaches) -> Self {
        Self {
            loaders,
            reader,
            caches,
            options: LoaderOptions::default(),
        }
    }

    pub fn with_options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> LoaderOptions {
        self.options
    }

    pub fn reader(&self) -> &dyn ManifestReader {
        self.reader.as_ref()
    }

    pub fn caches(&self) -> &LoaderCaches {
        &self.caches
    }

    /// Fetch `source` and read its manifest.
    ///
    /// # Errors
    ///
    /// [`Error::Load`] when the content cannot be fetched (including a git
    /// source cached as unavailable) or its manifest cannot be parsed.
    pub async fn load(
        &self,
        source: &ResolvedSource,
        request: &LoadRequest,
    ) -> Result<LoadedPackageData> {
        let fetched = self.fetch(source, request).await?;

        let manifest_path = fetched.content_root.join(MANIFEST_FILENAME);
        let manifest = self
            .read_manifest(&manifest_path, request.skip_cache)
            .map_err(|e| Error::Load {
                name: fetched.package_name.clone(),
                reason: e.to_string(),
            })?;

        let package_name = match (&source.location, &manifest) {
            (SourceLocation::Registry { .. }, _) | (_, None) => fetched.package_name,
            (_, Some(m)) => m.name.clone(),
        };
        let version = fetched.version.or_else(|| {
            manifest
                .as_ref()
                .and_then(|m| m.parsed_version().ok().flatten())
        });

        Ok(LoadedPackageData {
            package_name,
            version,
            content_root: fetched.content_root,
            manifest_path: manifest.is_some().then_some(manifest_path),
            manifest,
            available_versions: fetched.available_versions,
            commit_sha: fetched.commit_sha,
            repo_path: fetched.repo_path,
        })
    }

    /// Load several sources, concurrently when the loader is parallel.
    ///
    /// Results come back in input order regardless of completion order.
    pub async fn load_batch(
        &self,
        requests: Vec<(ResolvedSource, LoadRequest)>,
    ) -> Vec<Result<LoadedPackageData>> {
        if !self.options.parallel || requests.len() < 2 {
            let mut results = Vec::with_capacity(requests.len());
            for (source, request) in &requests {
                results.push(self.load(source, request).await);
            }
            return results;
        }

        let names: Vec<String> = requests.iter().map(|(s, _)| s.describe()).collect();
        let mut tasks = JoinSet::new();
        for (index, (source, request)) in requests.into_iter().enumerate() {
            let loader = self.clone();
            tasks.spawn(async move { (index, loader.load(&source, &request).await) });
        }

        let mut slots: Vec<Option<Result<LoadedPackageData>>> =
            names.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => tracing::error!(error = %e, "Loader task failed"),
            }
        }

        slots
            .into_iter()
            .zip(names)
            .map(|(slot, name)| {
                slot.unwrap_or_else(|| {
                    Err(Error::Load {
                        name,
                        reason: "loader task did not complete".to_string(),
                    })
                })
            })
            .collect()
    }

    /// Re-point registry nodes at their solved versions.
    ///
    /// Nodes whose loaded version already equals the solved version are left
    /// alone. The reloaded manifest does not re-expand the graph. Returns the
    /// number of nodes reloaded.
    pub async fn apply_solution(
        &self,
        graph: &mut DependencyGraph,
        solution: &VersionSolution,
        skip_cache: bool,
    ) -> Result<usize> {
        let targets: Vec<_> = graph
            .nodes()
            .filter(|node| node.state() == NodeState::Loaded)
            .filter_map(|node| {
                let solved = solution.version_for(node.source.registry_package()?)?;
                if node.source.registry_version() == Some(solved) {
                    return None;
                }
                let mut source = node.source.clone();
                source.set_registry_version(solved.clone());
                Some((node.id.clone(), source))
            })
            .collect();

        // Pinned versions bypass range selection in the registry loader
        let request = LoadRequest {
            constraints: Vec::new(),
            skip_cache,
            allow_prerelease: true,
        };

        let mut reloaded = 0;
        for (id, source) in targets {
            if let Some(node) = graph.get_mut(&id) {
                node.transition(NodeState::Loading)?;
            }
            let result = self.load(&source, &request).await;
            let Some(node) = graph.get_mut(&id) else {
                continue;
            };
            match result {
                Ok(data) => {
                    tracing::debug!(
                        package = %data.package_name,
                        version = ?data.version,
                        "Reloaded solved version"
                    );
                    node.source = source;
                    data.apply_to(&mut node.source);
                    node.loaded = Some(data);
                    node.transition(NodeState::Loaded)?;
                    reloaded += 1;
                }
                Err(e) => {
                    let warning = format!("{id}: {e}");
                    node.fail(e.to_string());
                    tracing::warn!(node = %id, error = %e, "Solved version failed to load");
                    graph.add_warning(warning);
                }
            }
        }
        Ok(reloaded)
    }

    async fn fetch(&self, source: &ResolvedSource, request: &LoadRequest) -> Result<FetchedSource> {
        let SourceLocation::Git {
            url,
            reference,
            subpath,
        } = &source.location
        else {
            return self.loaders.for_source(source).load(source, request).await;
        };

        let cache = &self.caches.content_roots;
        let key = ContentRootCache::key(url, reference.as_deref(), subpath.as_deref());

        if !request.skip_cache
            && let Some(entry) = cache.get(&key)
        {
            tracing::trace!(key = %key, "Git content cache hit");
            return entry_into_result(entry, source);
        }

        let entry = match self.loaders.git.load(source, request).await {
            Ok(fetched) => ContentEntry::Available(fetched),
            Err(e) => {
                tracing::warn!(source = %source.describe(), error = %e, "Git source unavailable");
                ContentEntry::Unavailable(e.to_string())
            }
        };

        let entry = if request.skip_cache {
            cache.replace(key, entry.clone());
            entry
        } else {
            cache.insert_if_absent(key, entry)
        };
        entry_into_result(entry, source)
    }

    fn read_manifest(
        &self,
        path: &Path,
        skip_cache: bool,
    ) -> opkg_manifest::Result<Option<Arc<PackageManifest>>> {
        let use_cache = self.options.cache_packages && !skip_cache;
        if use_cache && let Some(cached) = self.caches.packages.get(path) {
            return Ok(cached);
        }

        let manifest = match self.reader.read(path) {
            Ok(manifest) => Some(Arc::new(manifest)),
            Err(opkg_manifest::Error::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        if !self.options.cache_packages {
            return Ok(manifest);
        }
        if skip_cache {
            self.caches
                .packages
                .replace(path.to_path_buf(), manifest.clone());
            Ok(manifest)
        } else {
            Ok(self
                .caches
                .packages
                .insert_if_absent(path.to_path_buf(), manifest))
        }
    }
}

fn entry_into_result(entry: ContentEntry, source: &ResolvedSource) -> Result<FetchedSource> {
    match entry {
        ContentEntry::Available(fetched) => Ok(fetched),
        ContentEntry::Unavailable(reason) => Err(Error::Load {
            name: source.describe(),
            reason,
        }),
    }
}
