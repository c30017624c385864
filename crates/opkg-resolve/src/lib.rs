//! Dependency resolution and installation planning for opkg.
//!
//! Given a workspace's root manifest, this crate:
//!
//! 1. walks every declared dependency (registry, path or git) into a
//!    [`DependencyGraph`], deduplicating by [`DependencyId`] and breaking
//!    cycles ([`GraphBuilder`]),
//! 2. picks one version per registry package across all requested ranges
//!    ([`VersionSolver`]),
//! 3. orders the survivors dependencies-first into an [`InstallationPlan`]
//!    ([`InstallationPlanner`]),
//! 4. and runs that plan against an external [`Installer`] ([`Executor`]).
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use opkg_manifest::YamlManifestReader;
//! use opkg_resolve::{
//!     Executor, InstallError, InstallReport, InstallationContext, Installer, LoaderCaches,
//!     ResolverConfig,
//! };
//!
//! struct PrintInstaller;
//!
//! #[async_trait]
//! impl Installer for PrintInstaller {
//!     async fn install(&self, ctx: &InstallationContext) -> Result<InstallReport, InstallError> {
//!         println!("install {} from {}", ctx.package_name, ctx.content_root.display());
//!         Ok(InstallReport::default())
//!     }
//! }
//!
//! # async fn run() -> opkg_resolve::Result<()> {
//! let root = std::path::Path::new(".");
//! let config = ResolverConfig::load(root)?;
//! let executor = Executor::new(
//!     config.source_loaders(),
//!     Arc::new(YamlManifestReader),
//!     LoaderCaches::new(),
//!     Arc::new(PrintInstaller),
//! );
//! let result = executor
//!     .execute(config.into_executor_options(root), None, None)
//!     .await;
//! println!("{:?}", result.summary);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod declaration;
pub mod error;
pub mod executor;
pub mod graph;
pub mod id;
pub mod loader;
pub mod logging;
pub mod planner;
pub mod solver;
pub mod source;
pub mod version;

pub use config::ResolverConfig;
pub use declaration::DependencyDeclaration;
pub use error::{Error, Result};
pub use executor::{
    CancellationFlag, ExecutionResult, ExecutionSummary, Executor, ExecutorOptions, FileError,
    InstallError, InstallReport, Installer, PackageResult,
};
pub use graph::{
    CycleHandling, CyclePolicy, DependencyCycle, DependencyGraph, GraphBuilder, GraphOptions,
    NodeState, ResolutionDependencyNode,
};
pub use id::{DependencyId, SourceType};
pub use loader::{
    ContentLoader, LoadRequest, LoadedPackageData, LoaderCaches, LoaderOptions, SourceLoader,
    SourceLoaders,
};
pub use planner::{
    InstallOptions, InstallationContext, InstallationPlan, InstallationPlanner, PlannerOptions,
    SkipReason, SkippedPackage,
};
pub use solver::{
    ConflictResolver, SolverOptions, VersionConflict, VersionSolution, VersionSolver,
};
pub use source::{ResolvedSource, SourceLocation, SourceResolver};
pub use version::VersionConstraint;
