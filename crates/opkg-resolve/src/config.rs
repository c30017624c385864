//! Resolver configuration from `.openpackage/config.toml`.
//!
//! # Example
//!
//! ```toml
//! [resolve]
//! include_dev = true
//! max_depth = 8
//! cycle_policy = "error"
//!
//! [install]
//! platforms = ["cursor", "claude"]
//! fail_fast = true
//!
//! [install.settings]
//! line_endings = "lf"
//!
//! [registry]
//! path = "/srv/opkg/registry"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use opkg_fs::{ConfigStore, NormalizedPath};
use opkg_manifest::STATE_DIR;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::executor::ExecutorOptions;
use crate::graph::{CyclePolicy, GraphOptions};
use crate::loader::{LoaderOptions, SourceLoaders};
use crate::planner::{InstallOptions, PlannerOptions};
use crate::solver::SolverOptions;

/// File name of the config inside the state directory.
pub const CONFIG_FILENAME: &str = "config.toml";

/// Directory under the home directory holding the default registry and cache.
const HOME_DIR: &str = ".openpackage";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub resolve: ResolveConfig,
    pub install: InstallConfig,
    pub registry: RegistryConfig,
    pub cache: CacheConfig,
}

/// `[resolve]`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolveConfig {
    pub include_dev: bool,
    pub max_depth: usize,
    pub include_root: bool,
    pub skip_cache: bool,
    pub parallel: bool,
    pub cycle_policy: CyclePolicy,
    pub force: bool,
    pub allow_prerelease: bool,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        let graph = GraphOptions::default();
        Self {
            include_dev: graph.include_dev,
            max_depth: graph.max_depth,
            include_root: graph.include_root,
            skip_cache: graph.skip_cache,
            parallel: LoaderOptions::default().parallel,
            cycle_policy: graph.cycle_policy,
            force: false,
            allow_prerelease: graph.allow_prerelease,
        }
    }
}

/// `[install]`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct InstallConfig {
    pub fail_fast: bool,
    pub dry_run: bool,
    pub platforms: Vec<String>,
    /// Passed to the installer untouched.
    pub settings: BTreeMap<String, toml::Value>,
}

/// `[registry]`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// `[cache]`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl ResolverConfig {
    /// `<workspace_root>/.openpackage/config.toml`
    pub fn path(workspace_root: &Path) -> NormalizedPath {
        NormalizedPath::new(workspace_root.join(STATE_DIR).join(CONFIG_FILENAME))
    }

    /// Load the workspace config. A missing file yields the defaults.
    pub fn load(workspace_root: &Path) -> Result<Self> {
        let path = Self::path(workspace_root);
        let config: Self = ConfigStore::new().load_or_default(&path)?;
        tracing::debug!(path = %path, "Loaded resolver config");
        Ok(config)
    }

    pub fn save(&self, workspace_root: &Path) -> Result<()> {
        Ok(ConfigStore::new().save(&Self::path(workspace_root), self)?)
    }

    /// Registry directory, defaulting to `~/.openpackage/registry`.
    pub fn registry_dir(&self) -> PathBuf {
        self.registry
            .path
            .clone()
            .unwrap_or_else(|| home_state_dir().join("registry"))
    }

    /// Cache directory, defaulting to `~/.openpackage/cache`.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache
            .path
            .clone()
            .unwrap_or_else(|| home_state_dir().join("cache"))
    }

    /// Loaders for the configured registry and cache.
    pub fn source_loaders(&self) -> SourceLoaders {
        SourceLoaders::local(self.registry_dir(), self.cache_dir())
    }

    /// Executor options for a workspace. The installed index starts empty.
    pub fn into_executor_options(self, workspace_root: &Path) -> ExecutorOptions {
        let Self {
            resolve, install, ..
        } = self;

        ExecutorOptions {
            workspace_root: workspace_root.to_path_buf(),
            root_manifest: None,
            graph: GraphOptions {
                include_dev: resolve.include_dev,
                max_depth: resolve.max_depth,
                include_root: resolve.include_root,
                skip_cache: resolve.skip_cache,
                cycle_policy: resolve.cycle_policy,
                allow_prerelease: resolve.allow_prerelease,
            },
            loader: LoaderOptions {
                parallel: resolve.parallel,
                ..LoaderOptions::default()
            },
            solver: SolverOptions {
                force: resolve.force,
                allow_prerelease: resolve.allow_prerelease,
            },
            planner: PlannerOptions {
                platforms: install.platforms,
                install_options: InstallOptions {
                    force: resolve.force,
                    settings: install.settings,
                },
                force: resolve.force,
                installed: Default::default(),
            },
            dry_run: install.dry_run,
            fail_fast: install.fail_fast,
        }
    }
}

fn home_state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(HOME_DIR)
}
