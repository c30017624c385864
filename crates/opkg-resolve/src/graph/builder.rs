//! Breadth-first graph construction.
//!
//! Each level of the walk is discovered first (resolve, dedupe, detect
//! cycles against the ancestor path) and then loaded as one batch, so
//! same-depth nodes may load concurrently while a child is never loaded
//! before its parent.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use opkg_manifest::MANIFEST_FILENAME;
use serde::{Deserialize, Serialize};

use super::{
    CycleHandling, DependencyCycle, DependencyGraph, NodeState, ResolutionDependencyNode,
};
use crate::declaration::DependencyDeclaration;
use crate::error::{Error, Result};
use crate::id::DependencyId;
use crate::loader::{ContentLoader, LoadRequest, LoadedPackageData};
use crate::source::{ResolvedSource, SourceResolver};

/// What to do when a dependency loops back to an ancestor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePolicy {
    /// Drop the closing edge and keep going.
    #[default]
    Skip,
    /// Abort the build.
    Error,
    /// Keep the closing edge; members are marked and not installed.
    Ignore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphOptions {
    /// Follow the root manifest's dev dependencies.
    pub include_dev: bool,
    /// Deepest declaration depth that is still expanded.
    pub max_depth: usize,
    /// Add the workspace's own package as the graph root.
    pub include_root: bool,
    /// Bypass the git content cache.
    pub skip_cache: bool,
    pub cycle_policy: CyclePolicy,
    pub allow_prerelease: bool,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            include_dev: false,
            max_depth: 10,
            include_root: false,
            skip_cache: false,
            cycle_policy: CyclePolicy::Skip,
            allow_prerelease: false,
        }
    }
}

/// A declaration waiting to be resolved, with the path that led to it.
struct Frontier {
    declaration: DependencyDeclaration,
    parent: Option<DependencyId>,
    ancestors: Vec<DependencyId>,
}

/// Builds a [`DependencyGraph`] from a root manifest.
#[derive(Clone)]
pub struct GraphBuilder {
    loader: ContentLoader,
    resolver: SourceResolver,
}

impl GraphBuilder {
    pub fn new(loader: ContentLoader) -> Self {
        Self {
            loader,
            resolver: SourceResolver::new(),
        }
    }

    pub fn loader(&self) -> &ContentLoader {
        &self.loader
    }

    /// Walk every dependency reachable from the root manifest.
    ///
    /// `root_manifest` defaults to `<workspace_root>/openpackage.yml`.
    ///
    /// # Errors
    ///
    /// Only failures at the root abort the build: an unreadable root
    /// manifest, a malformed root declaration, or a cycle under
    /// [`CyclePolicy::Error`]. Everything else is recorded as node failures
    /// and graph warnings.
    pub async fn build(
        &self,
        workspace_root: &Path,
        root_manifest: Option<&Path>,
        options: &GraphOptions,
    ) -> Result<DependencyGraph> {
        let manifest_path = root_manifest
            .map(Path::to_path_buf)
            .unwrap_or_else(|| workspace_root.join(MANIFEST_FILENAME));
        let manifest = self
            .loader
            .reader()
            .read(&manifest_path)
            .map_err(|source| Error::RootManifest {
                path: manifest_path.clone(),
                source,
            })?;

        tracing::info!(
            root = %manifest.name,
            manifest = %manifest_path.display(),
            "Building dependency graph"
        );

        let mut graph = DependencyGraph::new(workspace_root);

        let (parent, ancestors) = if options.include_root {
            let id = self.insert_root(&mut graph, &manifest_path, manifest.clone())?;
            (Some(id.clone()), vec![id])
        } else {
            (None, Vec::new())
        };

        let mut frontier = Vec::new();
        for (entry, dev) in manifest.entries(options.include_dev) {
            let declaration = DependencyDeclaration::from_entry(entry, dev, &manifest_path, 1)?;
            frontier.push(Frontier {
                declaration,
                parent: parent.clone(),
                ancestors: ancestors.clone(),
            });
        }

        while !frontier.is_empty() {
            let discovered = self.discover_level(&mut graph, frontier, options)?;
            frontier = self.load_level(&mut graph, discovered, options).await?;
        }

        self.break_remaining_cycles(&mut graph, options.cycle_policy)?;
        graph.finalize();

        tracing::info!(
            nodes = graph.len(),
            cycles = graph.cycles().len(),
            warnings = graph.warnings().len(),
            "Dependency graph built"
        );
        Ok(graph)
    }

    fn insert_root(
        &self,
        graph: &mut DependencyGraph,
        manifest_path: &Path,
        manifest: opkg_manifest::PackageManifest,
    ) -> Result<DependencyId> {
        let root_dir = manifest_path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let source = ResolvedSource::path(&root_dir);
        let id = source.id(&manifest.name);

        let mut node = ResolutionDependencyNode::new(id.clone(), source, 0);
        node.is_root = true;
        for state in [
            NodeState::Discovering,
            NodeState::Discovered,
            NodeState::Loading,
        ] {
            node.transition(state)?;
        }

        let data = LoadedPackageData {
            package_name: manifest.name.clone(),
            version: manifest.parsed_version()?,
            content_root: root_dir,
            manifest_path: Some(manifest_path.to_path_buf()),
            manifest: Some(Arc::new(manifest)),
            available_versions: Vec::new(),
            commit_sha: None,
            repo_path: None,
        };
        data.apply_to(&mut node.source);
        node.loaded = Some(data);
        node.transition(NodeState::Loaded)?;

        graph.insert(node);
        graph.add_root(id.clone());
        Ok(id)
    }

    /// Resolve one level of declarations into nodes. Returns the newly
    /// created nodes with their ancestor paths.
    fn discover_level(
        &self,
        graph: &mut DependencyGraph,
        frontier: Vec<Frontier>,
        options: &GraphOptions,
    ) -> Result<Vec<(DependencyId, Vec<DependencyId>)>> {
        let mut created = Vec::new();

        for Frontier {
            declaration,
            parent,
            ancestors,
        } in frontier
        {
            let source = match self.resolver.resolve(&declaration) {
                Ok(source) => source,
                Err(e) => {
                    branch_warning(graph, parent.as_ref(), e.to_string());
                    continue;
                }
            };
            let id = source.id(&declaration.name);

            if let Some(pos) = ancestors.iter().position(|a| *a == id) {
                let members = ancestors[pos..].to_vec();
                self.handle_cycle(graph, members, parent.as_ref(), declaration, options)?;
                continue;
            }

            if let Some(existing) = graph.get_mut(&id) {
                existing.declarations.push(declaration);
                link(graph, parent.as_ref(), &id);
                tracing::debug!(node = %id, "Attached declaration to existing node");
                continue;
            }

            if declaration.depth > options.max_depth {
                branch_warning(
                    graph,
                    parent.as_ref(),
                    format!(
                        "maximum depth {} reached, not expanding '{}'",
                        options.max_depth, declaration.name
                    ),
                );
                continue;
            }

            let mut node = ResolutionDependencyNode::new(id.clone(), source, declaration.depth);
            node.transition(NodeState::Discovering)?;
            node.declarations.push(declaration);
            node.transition(NodeState::Discovered)?;
            tracing::debug!(node = %id, key = %id.key(), depth = node.depth, "Discovered node");

            graph.insert(node);
            link(graph, parent.as_ref(), &id);

            let mut path = ancestors;
            path.push(id.clone());
            created.push((id, path));
        }

        Ok(created)
    }

    /// Load newly created nodes and collect their dependencies as the next level.
    async fn load_level(
        &self,
        graph: &mut DependencyGraph,
        created: Vec<(DependencyId, Vec<DependencyId>)>,
        options: &GraphOptions,
    ) -> Result<Vec<Frontier>> {
        let mut requests = Vec::with_capacity(created.len());
        let mut batch = Vec::with_capacity(created.len());
        for (id, ancestors) in created {
            let Some(node) = graph.get_mut(&id) else {
                continue;
            };
            node.transition(NodeState::Loading)?;
            let request = LoadRequest {
                constraints: node.constraints().cloned().collect(),
                skip_cache: options.skip_cache,
                allow_prerelease: options.allow_prerelease,
            };
            requests.push((node.source.clone(), request));
            batch.push((id, ancestors));
        }

        let results = self.loader.load_batch(requests).await;

        let mut next = Vec::new();
        for ((id, ancestors), result) in batch.into_iter().zip(results) {
            let data = match result {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!(node = %id, error = %e, "Failed to load dependency");
                    if let Some(node) = graph.get_mut(&id) {
                        node.fail(e.to_string());
                    }
                    graph.add_warning(format!("{id}: {e}"));
                    continue;
                }
            };

            let manifest = data.manifest.clone();
            let declared_in = data.manifest_path.clone();
            let Some(node) = graph.get_mut(&id) else {
                continue;
            };
            data.apply_to(&mut node.source);
            tracing::debug!(
                node = %id,
                package = %data.package_name,
                version = ?data.version,
                "Loaded node"
            );
            node.loaded = Some(data);
            node.transition(NodeState::Loaded)?;
            let child_depth = node.depth + 1;

            let (Some(manifest), Some(declared_in)) = (manifest, declared_in) else {
                continue;
            };
            // Dev dependencies only count for the root manifest
            for (entry, dev) in manifest.entries(false) {
                match DependencyDeclaration::from_entry(entry, dev, &declared_in, child_depth) {
                    Ok(declaration) => next.push(Frontier {
                        declaration,
                        parent: Some(id.clone()),
                        ancestors: ancestors.clone(),
                    }),
                    Err(e) => branch_warning(graph, Some(&id), e.to_string()),
                }
            }
        }

        Ok(next)
    }

    fn handle_cycle(
        &self,
        graph: &mut DependencyGraph,
        members: Vec<DependencyId>,
        parent: Option<&DependencyId>,
        declaration: DependencyDeclaration,
        options: &GraphOptions,
    ) -> Result<()> {
        let Some(target) = members.first().cloned() else {
            return Ok(());
        };
        let description = describe_cycle(&members);

        match options.cycle_policy {
            CyclePolicy::Skip => {
                // The edge is dropped but its range still constrains the target.
                if let Some(node) = graph.get_mut(&target) {
                    node.declarations.push(declaration);
                }
                graph.record_cycle(DependencyCycle {
                    members,
                    handling: CycleHandling::Skipped,
                });
                branch_warning(
                    graph,
                    parent,
                    format!("dependency cycle {description}, edge skipped"),
                );
                Ok(())
            }
            CyclePolicy::Error => {
                graph.record_cycle(DependencyCycle {
                    members: members.clone(),
                    handling: CycleHandling::Error,
                });
                Err(Error::Cycle {
                    members: cycle_names(&members),
                })
            }
            CyclePolicy::Ignore => {
                if let Some(node) = graph.get_mut(&target) {
                    node.declarations.push(declaration);
                }
                link(graph, parent, &target);
                mark_in_cycle(graph, &members);
                graph.record_cycle(DependencyCycle {
                    members,
                    handling: CycleHandling::Ignored,
                });
                tracing::warn!(cycle = %description, "Dependency cycle kept");
                Ok(())
            }
        }
    }

    /// Cycles formed through nodes that were reached by separate paths are
    /// invisible to the ancestor check; catch them here.
    fn break_remaining_cycles(
        &self,
        graph: &mut DependencyGraph,
        policy: CyclePolicy,
    ) -> Result<()> {
        for edge in graph.back_edges() {
            match policy {
                CyclePolicy::Skip => {
                    graph.remove_edge(&edge.from, &edge.to);
                    let description = describe_cycle(&edge.members);
                    if graph.record_cycle(DependencyCycle {
                        members: edge.members,
                        handling: CycleHandling::Skipped,
                    }) {
                        branch_warning(
                            graph,
                            Some(&edge.from),
                            format!("dependency cycle {description}, edge skipped"),
                        );
                    }
                }
                CyclePolicy::Error => {
                    return Err(Error::Cycle {
                        members: cycle_names(&edge.members),
                    });
                }
                CyclePolicy::Ignore => {
                    mark_in_cycle(graph, &edge.members);
                    graph.record_cycle(DependencyCycle {
                        members: edge.members,
                        handling: CycleHandling::Ignored,
                    });
                }
            }
        }
        Ok(())
    }
}

fn link(graph: &mut DependencyGraph, parent: Option<&DependencyId>, child: &DependencyId) {
    match parent {
        Some(parent) => graph.add_edge(parent, child),
        None => graph.add_root(child.clone()),
    }
}

fn mark_in_cycle(graph: &mut DependencyGraph, members: &[DependencyId]) {
    for member in members {
        if let Some(node) = graph.get_mut(member) {
            node.in_cycle = true;
        }
    }
}

/// Member names with the re-entered node repeated at the end.
fn cycle_names(members: &[DependencyId]) -> Vec<String> {
    members
        .iter()
        .chain(members.first())
        .map(|m| m.display_name().to_string())
        .collect()
}

fn describe_cycle(members: &[DependencyId]) -> String {
    cycle_names(members).join(" -> ")
}

/// Record a branch-local problem on the node that declared it and on the graph.
fn branch_warning(graph: &mut DependencyGraph, node: Option<&DependencyId>, warning: String) {
    tracing::warn!(node = ?node.map(ToString::to_string), "{warning}");
    if let Some(node) = node.and_then(|id| graph.get_mut(id)) {
        node.warnings.push(warning.clone());
    }
    graph.add_warning(warning);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{LoaderCaches, SourceLoaders};
    use opkg_manifest::YamlManifestReader;
    use opkg_test_utils::{ManifestBuilder, TestWorkspace};
    use pretty_assertions::assert_eq;

    fn builder(ws: &TestWorkspace) -> GraphBuilder {
        let loaders = SourceLoaders::local(ws.registry_dir(), ws.cache_dir());
        GraphBuilder::new(ContentLoader::new(
            loaders,
            Arc::new(YamlManifestReader),
            LoaderCaches::new(),
        ))
    }

    fn order(graph: &DependencyGraph) -> Vec<String> {
        graph
            .installation_order()
            .iter()
            .map(|id| graph.get(id).unwrap().package_name().to_string())
            .collect()
    }

    #[tokio::test]
    async fn missing_root_manifest_is_fatal() {
        let ws = TestWorkspace::new();
        let err = builder(&ws)
            .build(&ws.root(), None, &GraphOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RootManifest { .. }));
    }

    #[tokio::test]
    async fn malformed_root_declaration_is_fatal() {
        let ws = TestWorkspace::new();
        ws.raw_root_manifest(
            "name: app\ndependencies:\n  - name: bad\n    path: ./x\n    url: https://example.com/x.git\n",
        );
        let err = builder(&ws)
            .build(&ws.root(), None, &GraphOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Declaration { .. }));
    }

    #[tokio::test]
    async fn missing_dependency_is_a_warning() {
        let ws = TestWorkspace::new();
        ws.root_manifest(ManifestBuilder::new("app").registry_dep("ghost", "^1.0.0"));

        let graph = builder(&ws)
            .build(&ws.root(), None, &GraphOptions::default())
            .await
            .unwrap();

        let ghost = graph.nodes().next().unwrap();
        assert_eq!(ghost.state(), NodeState::Failed);
        assert!(ghost.error.as_deref().unwrap().contains("not found in registry"));
        assert_eq!(graph.warnings().len(), 1);
    }

    #[tokio::test]
    async fn include_root_adds_workspace_package() {
        let ws = TestWorkspace::new();
        ws.registry_package(ManifestBuilder::new("core").version("1.0.0"));
        ws.root_manifest(ManifestBuilder::new("app").registry_dep("core", ""));

        let options = GraphOptions {
            include_root: true,
            ..Default::default()
        };
        let graph = builder(&ws).build(&ws.root(), None, &options).await.unwrap();

        assert_eq!(graph.roots().len(), 1);
        let root = graph.get(&graph.roots()[0]).unwrap();
        assert!(root.is_root);
        assert_eq!(root.depth, 0);
        assert_eq!(order(&graph), vec!["core", "app"]);
    }

    #[tokio::test]
    async fn dev_dependencies_only_from_root() {
        let ws = TestWorkspace::new();
        ws.registry_package(ManifestBuilder::new("lint").version("1.0.0"));
        ws.registry_package(
            ManifestBuilder::new("core")
                .version("1.0.0")
                .dev_registry_dep("lint", ""),
        );
        ws.root_manifest(
            ManifestBuilder::new("app")
                .registry_dep("core", "")
                .dev_registry_dep("lint", ""),
        );

        let without = builder(&ws)
            .build(&ws.root(), None, &GraphOptions::default())
            .await
            .unwrap();
        assert_eq!(order(&without), vec!["core"]);

        let with = builder(&ws)
            .build(
                &ws.root(),
                None,
                &GraphOptions {
                    include_dev: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(order(&with), vec!["core", "lint"]);
        let lint = with.nodes().find(|n| n.package_name() == "lint").unwrap();
        assert!(lint.is_dev_only());
    }

    #[tokio::test]
    async fn max_depth_truncates_with_warning() {
        let ws = TestWorkspace::new();
        ws.registry_package(ManifestBuilder::new("c").version("1.0.0"));
        ws.registry_package(ManifestBuilder::new("b").version("1.0.0").registry_dep("c", ""));
        ws.registry_package(ManifestBuilder::new("a").version("1.0.0").registry_dep("b", ""));
        ws.root_manifest(ManifestBuilder::new("app").registry_dep("a", ""));

        let options = GraphOptions {
            max_depth: 2,
            ..Default::default()
        };
        let graph = builder(&ws).build(&ws.root(), None, &options).await.unwrap();

        assert_eq!(order(&graph), vec!["b", "a"]);
        assert!(graph.warnings().iter().any(|w| w.contains("maximum depth 2")));
    }

    #[tokio::test]
    async fn cycle_error_policy_aborts() {
        let ws = TestWorkspace::new();
        ws.registry_package(ManifestBuilder::new("a").version("1.0.0").registry_dep("b", ""));
        ws.registry_package(ManifestBuilder::new("b").version("1.0.0").registry_dep("a", ""));
        ws.root_manifest(ManifestBuilder::new("app").registry_dep("a", ""));

        let options = GraphOptions {
            cycle_policy: CyclePolicy::Error,
            ..Default::default()
        };
        let err = builder(&ws).build(&ws.root(), None, &options).await.unwrap_err();
        assert_eq!(err.to_string(), "dependency cycle detected: a -> b -> a");
    }

    #[tokio::test]
    async fn skipped_cycle_edge_keeps_its_range() {
        let ws = TestWorkspace::new();
        ws.registry_package(ManifestBuilder::new("a").version("1.0.0").registry_dep("b", ""));
        ws.registry_package(ManifestBuilder::new("b").version("1.0.0").registry_dep("a", "^2.0.0"));
        ws.root_manifest(ManifestBuilder::new("app").registry_dep("a", "^1.0.0"));

        let graph = builder(&ws)
            .build(&ws.root(), None, &GraphOptions::default())
            .await
            .unwrap();

        let a = graph.nodes().find(|n| n.package_name() == "a").unwrap();
        let ranges: Vec<String> = a.constraints().map(ToString::to_string).collect();
        assert_eq!(ranges, vec!["^1.0.0", "^2.0.0"]);
        let b = graph.nodes().find(|n| n.package_name() == "b").unwrap();
        assert!(b.children.is_empty());
        assert_eq!(order(&graph), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn cycle_ignore_policy_marks_members() {
        let ws = TestWorkspace::new();
        ws.registry_package(ManifestBuilder::new("a").version("1.0.0").registry_dep("b", ""));
        ws.registry_package(ManifestBuilder::new("b").version("1.0.0").registry_dep("a", ""));
        ws.root_manifest(ManifestBuilder::new("app").registry_dep("a", ""));

        let options = GraphOptions {
            cycle_policy: CyclePolicy::Ignore,
            ..Default::default()
        };
        let graph = builder(&ws).build(&ws.root(), None, &options).await.unwrap();

        assert_eq!(graph.cycles().len(), 1);
        assert_eq!(graph.cycles()[0].handling, CycleHandling::Ignored);
        assert!(graph.nodes().all(|n| n.in_cycle));
    }

    #[tokio::test]
    async fn cross_branch_cycle_is_broken() {
        let ws = TestWorkspace::new();
        ws.registry_package(ManifestBuilder::new("a").version("1.0.0").registry_dep("b", ""));
        ws.registry_package(ManifestBuilder::new("b").version("1.0.0").registry_dep("a", ""));
        ws.root_manifest(
            ManifestBuilder::new("app")
                .registry_dep("a", "")
                .registry_dep("b", ""),
        );

        let graph = builder(&ws)
            .build(&ws.root(), None, &GraphOptions::default())
            .await
            .unwrap();

        assert_eq!(graph.cycles().len(), 1);
        assert_eq!(graph.cycles()[0].handling, CycleHandling::Skipped);
        assert!(graph.back_edges().is_empty());
        assert_eq!(graph.installation_order().len(), 2);
    }
}
