//! Turning a solved graph into an ordered installation plan.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use opkg_manifest::InstalledIndex;
use semver::Version;
use serde::Serialize;
use uuid::Uuid;

use crate::graph::{DependencyGraph, NodeState, ResolutionDependencyNode};
use crate::id::DependencyId;
use crate::solver::VersionSolution;
use crate::source::ResolvedSource;

/// Options handed through to the installer untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InstallOptions {
    /// Overwrite files the installer would otherwise keep.
    pub force: bool,
    /// Installer-specific settings from `[install.settings]`.
    pub settings: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct PlannerOptions {
    /// Platforms every package is installed for.
    pub platforms: Vec<String>,
    pub install_options: InstallOptions,
    /// Reinstall packages the index already records.
    pub force: bool,
    /// What the workspace already has installed.
    pub installed: InstalledIndex,
}

/// Everything the installer needs to install one package.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallationContext {
    pub id: DependencyId,
    pub package_name: String,
    /// Solved version for registry packages, manifest version otherwise.
    pub version: Option<Version>,
    pub source: ResolvedSource,
    pub content_root: PathBuf,
    pub platforms: Vec<String>,
    pub options: InstallOptions,
    /// Only reachable through dev dependencies.
    pub dev: bool,
    /// The workspace's own package.
    pub is_root: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    NotLoaded,
    AlreadyInstalled,
    Cycle,
    Failed,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotLoaded => "not-loaded",
            Self::AlreadyInstalled => "already-installed",
            Self::Cycle => "cycle",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedPackage {
    pub id: DependencyId,
    pub package_name: String,
    pub reason: SkipReason,
    pub detail: Option<String>,
}

/// Ordered contexts to install and the packages left out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallationPlan {
    /// Dependencies always precede their dependents.
    pub contexts: Vec<InstallationContext>,
    pub skipped: Vec<SkippedPackage>,
    /// Run id of the graph this plan was derived from.
    pub graph_run_id: Uuid,
    /// Package-platform pairs the installer will touch.
    pub estimated_operations: Option<usize>,
}

impl InstallationPlan {
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct InstallationPlanner {
    options: PlannerOptions,
}

impl InstallationPlanner {
    pub fn new(options: PlannerOptions) -> Self {
        Self { options }
    }

    /// Walk the graph's installation order and build the plan.
    ///
    /// Solved registry versions are written back onto the nodes. Planned
    /// nodes carry their context; skipped nodes move to `skipped` unless
    /// they already failed.
    pub fn plan(&self, graph: &mut DependencyGraph, solution: &VersionSolution) -> InstallationPlan {
        let mut contexts = Vec::new();
        let mut skipped = Vec::new();

        for id in graph.installation_order().to_vec() {
            let Some(node) = graph.get_mut(&id) else {
                continue;
            };

            match self.plan_node(node, solution) {
                Ok(context) => {
                    tracing::debug!(
                        package = %context.package_name,
                        version = ?context.version,
                        "Planned installation"
                    );
                    node.installation = Some(context.clone());
                    contexts.push(context);
                }
                Err((reason, detail)) => {
                    tracing::debug!(node = %id, %reason, "Skipping package");
                    if reason != SkipReason::Failed {
                        node.skip();
                    }
                    skipped.push(SkippedPackage {
                        package_name: node.package_name().to_string(),
                        id,
                        reason,
                        detail,
                    });
                }
            }
        }

        let platforms = self.options.platforms.len().max(1);
        tracing::info!(
            planned = contexts.len(),
            skipped = skipped.len(),
            "Installation plan ready"
        );

        InstallationPlan {
            estimated_operations: Some(contexts.len() * platforms),
            contexts,
            skipped,
            graph_run_id: graph.run_id(),
        }
    }

    fn plan_node(
        &self,
        node: &mut ResolutionDependencyNode,
        solution: &VersionSolution,
    ) -> Result<InstallationContext, (SkipReason, Option<String>)> {
        match node.state() {
            NodeState::Failed => return Err((SkipReason::Failed, node.error.clone())),
            NodeState::Loaded => {}
            other => {
                return Err((SkipReason::NotLoaded, Some(format!("node is {other}"))));
            }
        }
        let Some(loaded) = &node.loaded else {
            return Err((SkipReason::NotLoaded, None));
        };
        if node.in_cycle {
            return Err((SkipReason::Cycle, None));
        }

        let mut version = loaded.version.clone();
        if let Some(package) = node.source.registry_package() {
            if solution.is_unresolved(package) {
                let detail = solution.conflict_for(package).map(ToString::to_string);
                return Err((SkipReason::NotLoaded, detail));
            }
            if let Some(solved) = solution.version_for(package) {
                version = Some(solved.clone());
            }
        }

        let package_name = loaded.package_name.clone();
        let content_root = loaded.content_root.clone();

        if !self.options.force
            && self
                .options
                .installed
                .is_installed(&package_name, version.as_ref())
        {
            return Err((
                SkipReason::AlreadyInstalled,
                version.as_ref().map(|v| format!("{package_name}@{v}")),
            ));
        }

        if let Some(solved) = &version {
            node.source.set_registry_version(solved.clone());
        }

        Ok(InstallationContext {
            id: node.id.clone(),
            package_name,
            version,
            source: node.source.clone(),
            content_root,
            platforms: self.options.platforms.clone(),
            options: self.options.install_options.clone(),
            dev: node.is_dev_only(),
            is_root: node.is_root,
        })
    }
}
