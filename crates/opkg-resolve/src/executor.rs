//! End-to-end pipeline: build, solve, plan, install.
//!
//! Installs run strictly one after another in plan order. A caller-supplied
//! [`CancellationFlag`] is checked before each install; a cancelled run
//! stops cleanly and nodes already installed stay installed.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use opkg_manifest::{InstalledIndex, InstalledPackage, ManifestReader};
use semver::Version;
use serde::Serialize;

use crate::error::Error;
use crate::graph::{DependencyGraph, GraphBuilder, GraphOptions, NodeState};
use crate::id::DependencyId;
use crate::loader::{ContentLoader, LoaderCaches, LoaderOptions, SourceLoaders};
use crate::planner::{InstallationContext, InstallationPlan, InstallationPlanner, PlannerOptions};
use crate::solver::{ConflictResolver, SolverOptions, VersionSolution, VersionSolver};

/// A file the installer could not write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileError {
    pub path: PathBuf,
    pub message: String,
}

/// What the installer did for one package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub installed: Vec<PathBuf>,
    pub updated: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    /// Per-file failures. They are reported but do not fail the package.
    pub errors: Vec<FileError>,
}

pub type InstallError = Box<dyn std::error::Error + Send + Sync>;

/// Performs the file-level work for one planned package.
#[async_trait]
pub trait Installer: Send + Sync {
    /// Install `context`. An `Err` fails that package.
    async fn install(
        &self,
        context: &InstallationContext,
    ) -> std::result::Result<InstallReport, InstallError>;
}

/// Cooperative cancellation shared between a caller and a running execution.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything one execution needs.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    pub workspace_root: PathBuf,
    /// Defaults to `<workspace_root>/openpackage.yml`.
    pub root_manifest: Option<PathBuf>,
    pub graph: GraphOptions,
    pub loader: LoaderOptions,
    pub solver: SolverOptions,
    pub planner: PlannerOptions,
    /// Stop after planning.
    pub dry_run: bool,
    /// Stop at the first installation failure.
    pub fail_fast: bool,
}

impl ExecutorOptions {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            root_manifest: None,
            graph: GraphOptions::default(),
            loader: LoaderOptions::default(),
            solver: SolverOptions::default(),
            planner: PlannerOptions::default(),
            dry_run: false,
            fail_fast: false,
        }
    }
}

/// Outcome of one attempted install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageResult {
    pub id: DependencyId,
    pub package_name: String,
    pub version: Option<Version>,
    pub success: bool,
    pub report: Option<InstallReport>,
    pub error: Option<String>,
    /// Root-to-package path, filled for failures.
    pub chain: Vec<String>,
}

/// `installed + failed + skipped == total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionSummary {
    pub total: usize,
    pub installed: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub success: bool,
    /// Human-readable reason when `success` is false.
    pub error: Option<String>,
    pub results: Vec<PackageResult>,
    pub summary: ExecutionSummary,
    pub warnings: Vec<String>,
    /// Absent when the graph could not be built.
    pub graph: Option<DependencyGraph>,
    pub solution: VersionSolution,
    pub plan: Option<InstallationPlan>,
    /// Starting index plus everything installed by this run.
    pub installed_index: InstalledIndex,
}

impl ExecutionResult {
    fn aborted(error: &Error, installed_index: InstalledIndex) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            results: Vec::new(),
            summary: ExecutionSummary::default(),
            warnings: Vec::new(),
            graph: None,
            solution: VersionSolution::default(),
            plan: None,
            installed_index,
        }
    }
}

/// Runs the full pipeline against an [`Installer`].
#[derive(Clone)]
pub struct Executor {
    loaders: SourceLoaders,
    reader: Arc<dyn ManifestReader>,
    caches: LoaderCaches,
    installer: Arc<dyn Installer>,
}

impl Executor {
    pub fn new(
        loaders: SourceLoaders,
        reader: Arc<dyn ManifestReader>,
        caches: LoaderCaches,
        installer: Arc<dyn Installer>,
    ) -> Self {
        Self {
            loaders,
            reader,
            caches,
            installer,
        }
    }

    /// Build the graph, solve versions, plan and (unless dry-run) install.
    ///
    /// Never returns an error: failures are reported on the result.
    pub async fn execute(
        &self,
        options: ExecutorOptions,
        resolver: Option<&dyn ConflictResolver>,
        cancel: Option<&CancellationFlag>,
    ) -> ExecutionResult {
        let installed_index = options.planner.installed.clone();
        let loader = ContentLoader::new(
            self.loaders.clone(),
            self.reader.clone(),
            self.caches.clone(),
        )
        .with_options(options.loader);

        tracing::info!(workspace = %options.workspace_root.display(), "Resolving dependencies");
        let builder = GraphBuilder::new(loader.clone());
        let mut graph = match builder
            .build(
                &options.workspace_root,
                options.root_manifest.as_deref(),
                &options.graph,
            )
            .await
        {
            Ok(graph) => graph,
            Err(e) => {
                tracing::error!(error = %e, "Dependency resolution failed");
                return ExecutionResult::aborted(&e, installed_index);
            }
        };

        let solution = VersionSolver::new(options.solver)
            .solve(&graph, resolver)
            .await;
        if let Err(e) = loader
            .apply_solution(&mut graph, &solution, options.graph.skip_cache)
            .await
        {
            tracing::error!(error = %e, "Applying version solution failed");
            return ExecutionResult::aborted(&e, installed_index);
        }

        let plan = InstallationPlanner::new(options.planner.clone()).plan(&mut graph, &solution);

        let mut warnings: Vec<String> = graph.warnings().to_vec();
        warnings.extend(solution.conflicts().iter().map(ToString::to_string));

        let mut run = Run {
            summary: ExecutionSummary {
                total: plan.contexts.len() + plan.skipped.len(),
                ..Default::default()
            },
            results: Vec::new(),
            warnings,
            installed_index,
            error: None,
        };

        if options.dry_run {
            tracing::info!(planned = plan.contexts.len(), "Dry run, nothing installed");
        } else {
            self.install_all(&mut graph, &plan, &options, cancel, &mut run)
                .await;
        }

        let summary = ExecutionSummary {
            skipped: run.summary.total - run.summary.installed - run.summary.failed,
            ..run.summary
        };
        let success = summary.failed == 0 && run.error.is_none();

        tracing::info!(
            installed = summary.installed,
            failed = summary.failed,
            skipped = summary.skipped,
            success,
            "Execution finished"
        );

        ExecutionResult {
            success,
            error: run.error,
            results: run.results,
            summary,
            warnings: run.warnings,
            graph: Some(graph),
            solution,
            plan: Some(plan),
            installed_index: run.installed_index,
        }
    }

    async fn install_all(
        &self,
        graph: &mut DependencyGraph,
        plan: &InstallationPlan,
        options: &ExecutorOptions,
        cancel: Option<&CancellationFlag>,
        run: &mut Run,
    ) {
        let mut contexts = plan.contexts.iter();

        for context in contexts.by_ref() {
            if cancel.is_some_and(CancellationFlag::is_cancelled) {
                tracing::warn!(package = %context.package_name, "Cancelled before install");
                run.error = Some(Error::Cancelled.to_string());
                mark_skipped(graph, &context.id);
                break;
            }

            if let Some(node) = graph.get_mut(&context.id)
                && let Err(e) = node.transition(NodeState::Installing)
            {
                tracing::warn!(error = %e, "Unexpected node state before install");
            }

            tracing::info!(
                package = %context.package_name,
                version = ?context.version,
                "Installing package"
            );

            match self.installer.install(context).await {
                Ok(report) => {
                    if let Some(node) = graph.get_mut(&context.id)
                        && let Err(e) = node.transition(NodeState::Installed)
                    {
                        tracing::warn!(error = %e, "Unexpected node state after install");
                    }
                    for file_error in &report.errors {
                        run.warnings.push(format!(
                            "{}: {}: {}",
                            context.package_name,
                            file_error.path.display(),
                            file_error.message
                        ));
                    }
                    run.installed_index.record(
                        context.package_name.clone(),
                        InstalledPackage {
                            version: context.version.as_ref().map(ToString::to_string),
                            source: Some(context.source.describe()),
                            platforms: context.platforms.clone(),
                        },
                    );
                    run.summary.installed += 1;
                    run.results.push(PackageResult {
                        id: context.id.clone(),
                        package_name: context.package_name.clone(),
                        version: context.version.clone(),
                        success: true,
                        report: Some(report),
                        error: None,
                        chain: Vec::new(),
                    });
                }
                Err(e) => {
                    let error = Error::Install {
                        name: context.package_name.clone(),
                        reason: e.to_string(),
                    };
                    tracing::error!(error = %error, "Installation failed");
                    if let Some(node) = graph.get_mut(&context.id) {
                        node.fail(e.to_string());
                    }
                    run.summary.failed += 1;
                    run.results.push(PackageResult {
                        id: context.id.clone(),
                        package_name: context.package_name.clone(),
                        version: context.version.clone(),
                        success: false,
                        report: None,
                        error: Some(e.to_string()),
                        chain: graph.dependency_chain(&context.id),
                    });

                    if options.fail_fast {
                        run.error = Some(error.to_string());
                        break;
                    }
                }
            }
        }

        for remaining in contexts {
            mark_skipped(graph, &remaining.id);
        }

        if run.error.is_none() && run.summary.failed > 0 {
            let failed: Vec<&str> = run
                .results
                .iter()
                .filter(|r| !r.success)
                .map(|r| r.package_name.as_str())
                .collect();
            run.error = Some(format!(
                "{} package(s) failed to install: {}",
                failed.len(),
                failed.join(", ")
            ));
        }
    }
}

/// Accumulated state of one execution.
struct Run {
    summary: ExecutionSummary,
    results: Vec<PackageResult>,
    warnings: Vec<String>,
    installed_index: InstalledIndex,
    error: Option<String>,
}

fn mark_skipped(graph: &mut DependencyGraph, id: &DependencyId) {
    if let Some(node) = graph.get_mut(id) {
        node.skip();
    }
}
