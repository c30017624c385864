//! Version solving across the whole graph.
//!
//! Registry nodes are grouped by package name. For each group every
//! declared range is collected and the highest available version that
//! satisfies all of them at once wins. When nothing satisfies every range:
//!
//! 1. `force` picks the highest available version and still records the
//!    conflict,
//! 2. otherwise an injected [`ConflictResolver`] may choose a version,
//! 3. otherwise the conflict is recorded and no version is chosen.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use semver::Version;
use serde::Serialize;

use crate::graph::DependencyGraph;
use crate::version::VersionConstraint;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolverOptions {
    /// Override unsatisfiable groups with the highest available version.
    pub force: bool,
    /// Let prerelease versions satisfy ranges that do not name one.
    pub allow_prerelease: bool,
}

/// Chooses a version for a conflict, typically by asking a human.
#[async_trait]
pub trait ConflictResolver: Send + Sync {
    /// Return the version to use, or `None` to leave the conflict unresolved.
    async fn resolve(&self, conflict: &VersionConflict, candidates: &[Version])
    -> Option<Version>;
}

/// One range and the manifest that asked for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestedRange {
    pub range: String,
    pub requested_by: PathBuf,
}

/// Ranges on one package that no available version satisfies together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionConflict {
    pub package_name: String,
    pub requested: Vec<RequestedRange>,
    pub available_versions: Vec<Version>,
    /// Version picked anyway under `force`.
    pub forced: Option<Version>,
}

impl fmt::Display for VersionConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ranges: Vec<String> = self
            .requested
            .iter()
            .map(|r| format!("{} (from {})", r.range, r.requested_by.display()))
            .collect();
        if ranges.is_empty() {
            write!(f, "no usable version of '{}'", self.package_name)
        } else {
            write!(
                f,
                "conflicting ranges for '{}': {}",
                self.package_name,
                ranges.join(", ")
            )
        }
    }
}

/// Chosen versions per registry package, plus the conflicts found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VersionSolution {
    versions: BTreeMap<String, Version>,
    conflicts: Vec<VersionConflict>,
}

impl VersionSolution {
    pub fn version_for(&self, package: &str) -> Option<&Version> {
        self.versions.get(package)
    }

    pub fn versions(&self) -> &BTreeMap<String, Version> {
        &self.versions
    }

    pub fn conflicts(&self) -> &[VersionConflict] {
        &self.conflicts
    }

    pub fn conflict_for(&self, package: &str) -> Option<&VersionConflict> {
        self.conflicts.iter().find(|c| c.package_name == package)
    }

    /// The package has a conflict and no chosen version.
    pub fn is_unresolved(&self, package: &str) -> bool {
        !self.versions.contains_key(package) && self.conflict_for(package).is_some()
    }
}

/// Every range and version observed for one package name.
#[derive(Debug, Default)]
struct PackageGroup {
    constraints: Vec<(VersionConstraint, PathBuf)>,
    available: Vec<Version>,
}

#[derive(Debug, Clone, Default)]
pub struct VersionSolver {
    options: SolverOptions,
}

impl VersionSolver {
    pub fn new(options: SolverOptions) -> Self {
        Self { options }
    }

    /// Solve every registry package in `graph`.
    ///
    /// `resolver` is consulted only for groups that no version satisfies
    /// and only when `force` is off.
    pub async fn solve(
        &self,
        graph: &DependencyGraph,
        resolver: Option<&dyn ConflictResolver>,
    ) -> VersionSolution {
        let mut solution = VersionSolution::default();

        for (package, group) in collect_groups(graph) {
            if group.available.is_empty() {
                continue;
            }
            let constraints: Vec<&VersionConstraint> =
                group.constraints.iter().map(|(c, _)| c).collect();

            if let Some(version) =
                highest_satisfying(&constraints, &group.available, self.options.allow_prerelease)
            {
                tracing::debug!(package = %package, version = %version, "Solved version");
                solution.versions.insert(package, version);
                continue;
            }

            let mut conflict = VersionConflict {
                package_name: package.clone(),
                requested: group
                    .constraints
                    .iter()
                    .map(|(c, by)| RequestedRange {
                        range: c.to_string(),
                        requested_by: by.clone(),
                    })
                    .collect(),
                available_versions: group.available.clone(),
                forced: None,
            };

            if self.options.force {
                let forced = highest_preferring_stable(&group.available);
                tracing::warn!(%conflict, forced = ?forced, "Forcing version despite conflict");
                conflict.forced = forced.clone();
                if let Some(version) = forced {
                    solution.versions.insert(package, version);
                }
                solution.conflicts.push(conflict);
                continue;
            }

            if let Some(resolver) = resolver {
                let mut candidates = group.available.clone();
                candidates.reverse();
                if let Some(chosen) = resolver.resolve(&conflict, &candidates).await {
                    tracing::info!(package = %package, version = %chosen, "Conflict resolved by callback");
                    solution.versions.insert(package, chosen);
                    continue;
                }
            }

            tracing::warn!(%conflict, "Unresolved version conflict");
            solution.conflicts.push(conflict);
        }

        solution
    }
}

fn collect_groups(graph: &DependencyGraph) -> BTreeMap<String, PackageGroup> {
    let mut groups: BTreeMap<String, PackageGroup> = BTreeMap::new();

    for node in graph.nodes() {
        let Some(package) = node.source.registry_package() else {
            continue;
        };
        let group = groups.entry(package.to_string()).or_default();

        for declaration in &node.declarations {
            if let Some(constraint) = &declaration.constraint {
                group
                    .constraints
                    .push((constraint.clone(), declaration.declared_in.clone()));
            }
        }
        if let Some(loaded) = &node.loaded {
            group.available.extend(loaded.available_versions.iter().cloned());
        }
        if let Some(version) = node.source.registry_version() {
            group.available.push(version.clone());
        }
    }

    for group in groups.values_mut() {
        group.available.sort();
        group.available.dedup();
    }
    groups
}

/// Highest version in `available` satisfying every constraint.
///
/// Without constraints only stable versions qualify unless prereleases are
/// allowed, so a package offering nothing but prereleases is a conflict.
pub fn highest_satisfying(
    constraints: &[&VersionConstraint],
    available: &[Version],
    allow_prerelease: bool,
) -> Option<Version> {
    let mut sorted: Vec<&Version> = available.iter().collect();
    sorted.sort();

    sorted
        .into_iter()
        .rev()
        .find(|v| {
            if constraints.is_empty() {
                allow_prerelease || v.pre.is_empty()
            } else {
                constraints.iter().all(|c| c.matches(v, allow_prerelease))
            }
        })
        .cloned()
}

fn highest_preferring_stable(available: &[Version]) -> Option<Version> {
    available
        .iter()
        .filter(|v| v.pre.is_empty())
        .max()
        .or_else(|| available.iter().max())
        .cloned()
}
