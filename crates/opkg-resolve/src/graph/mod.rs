//! The dependency graph arena.
//!
//! [`DependencyGraph`] owns every [`ResolutionDependencyNode`] by value,
//! keyed by [`DependencyId`] key. Edges are stored as ids on both ends, never
//! as references into other nodes, so a node can be mutated while the rest
//! of the graph is being walked.
//!
//! Installation order is a depth-first post-order from the roots: children
//! come before parents and ties follow declaration order, so the order does
//! not depend on when parallel loads happened to finish.

mod builder;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use builder::{CyclePolicy, GraphBuilder, GraphOptions};

use crate::declaration::DependencyDeclaration;
use crate::error::{Error, Result};
use crate::id::DependencyId;
use crate::loader::LoadedPackageData;
use crate::planner::InstallationContext;
use crate::source::ResolvedSource;
use crate::version::VersionConstraint;

/// Lifecycle of one node.
///
/// `pending -> discovering -> discovered -> loading -> loaded -> installing
/// -> installed`, with `failed` and `skipped` reachable from every
/// non-terminal state. A loaded node may go back to `loading` when the
/// solver picks a different version than the one first loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeState {
    Pending,
    Discovering,
    Discovered,
    Loading,
    Loaded,
    Installing,
    Installed,
    Failed,
    Skipped,
}

impl NodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Discovering => "discovering",
            Self::Discovered => "discovered",
            Self::Loading => "loading",
            Self::Loaded => "loaded",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Installed | Self::Failed | Self::Skipped => true,
            Self::Pending
            | Self::Discovering
            | Self::Discovered
            | Self::Loading
            | Self::Loaded
            | Self::Installing => false,
        }
    }

    pub fn can_transition_to(&self, next: NodeState) -> bool {
        use NodeState::*;

        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Failed | Skipped) => true,
            (Pending, Discovering)
            | (Discovering, Discovered)
            | (Discovered, Loading)
            | (Loading, Loaded)
            | (Loaded, Loading)
            | (Loaded, Installing)
            | (Installing, Installed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One vertex of the dependency graph.
#[derive(Debug, Clone)]
pub struct ResolutionDependencyNode {
    pub id: DependencyId,
    /// Every declaration that resolved to this node, in discovery order.
    pub declarations: Vec<DependencyDeclaration>,
    pub source: ResolvedSource,
    pub children: Vec<DependencyId>,
    pub parents: Vec<DependencyId>,
    state: NodeState,
    /// Depth at which the node was first discovered.
    pub depth: usize,
    pub loaded: Option<LoadedPackageData>,
    pub installation: Option<InstallationContext>,
    /// Why the node failed, when it did.
    pub error: Option<String>,
    pub warnings: Vec<String>,
    /// Member of a cycle kept under the `ignore` policy.
    pub in_cycle: bool,
    /// The workspace's own package.
    pub is_root: bool,
}

impl ResolutionDependencyNode {
    pub fn new(id: DependencyId, source: ResolvedSource, depth: usize) -> Self {
        Self {
            id,
            declarations: Vec::new(),
            source,
            children: Vec::new(),
            parents: Vec::new(),
            state: NodeState::Pending,
            depth,
            loaded: None,
            installation: None,
            error: None,
            warnings: Vec::new(),
            in_cycle: false,
            is_root: false,
        }
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow.
    pub fn transition(&mut self, next: NodeState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                node: self.id.to_string(),
                from: self.state,
                to: next,
            });
        }
        tracing::trace!(node = %self.id, from = %self.state, to = %next, "Node transition");
        self.state = next;
        Ok(())
    }

    /// Mark the node failed with `reason`. Terminal nodes keep their state.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.error = Some(reason.into());
        if !self.state.is_terminal() {
            self.state = NodeState::Failed;
        }
    }

    /// Mark the node skipped. Terminal nodes keep their state.
    pub fn skip(&mut self) {
        if !self.state.is_terminal() {
            self.state = NodeState::Skipped;
        }
    }

    /// Package name: the loaded name, else the first declared name.
    pub fn package_name(&self) -> &str {
        self.loaded
            .as_ref()
            .map(|l| l.package_name.as_str())
            .or_else(|| self.declarations.first().map(|d| d.name.as_str()))
            .unwrap_or_else(|| self.id.display_name())
    }

    /// Non-trivial ranges across every declaration.
    pub fn constraints(&self) -> impl Iterator<Item = &VersionConstraint> {
        self.declarations
            .iter()
            .filter_map(|d| d.constraint.as_ref())
    }

    /// Whether every declaration is a dev dependency.
    pub fn is_dev_only(&self) -> bool {
        !self.declarations.is_empty() && self.declarations.iter().all(|d| d.dev)
    }
}

/// How a detected cycle was dealt with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleHandling {
    /// The closing edge was dropped.
    Skipped,
    /// The build was aborted.
    Error,
    /// The closing edge was kept; members are not installed.
    Ignored,
}

/// A dependency chain that loops back to an ancestor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyCycle {
    /// Members in traversal order, starting at the re-entered ancestor.
    pub members: Vec<DependencyId>,
    pub handling: CycleHandling,
}

impl DependencyCycle {
    pub fn member_names(&self) -> Vec<String> {
        self.members
            .iter()
            .map(|m| m.display_name().to_string())
            .collect()
    }

    fn member_keys(&self) -> HashSet<&str> {
        self.members.iter().map(DependencyId::key).collect()
    }
}

/// An edge that closes a cycle found while ordering the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackEdge {
    pub from: DependencyId,
    pub to: DependencyId,
    /// Cycle members from `to` down to `from`.
    pub members: Vec<DependencyId>,
}

/// Facts about one build.
#[derive(Debug, Clone, Serialize)]
pub struct GraphMetadata {
    pub run_id: Uuid,
    pub built_at: DateTime<Utc>,
    pub workspace_root: PathBuf,
    pub node_count: usize,
    pub max_depth: usize,
    pub warnings: Vec<String>,
}

/// All nodes discovered in one resolution run.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: HashMap<String, ResolutionDependencyNode>,
    discovery_order: Vec<DependencyId>,
    roots: Vec<DependencyId>,
    installation_order: Vec<DependencyId>,
    cycles: Vec<DependencyCycle>,
    metadata: GraphMetadata,
}

impl DependencyGraph {
    pub fn new(workspace_root: &Path) -> Self {
        Self {
            nodes: HashMap::new(),
            discovery_order: Vec::new(),
            roots: Vec::new(),
            installation_order: Vec::new(),
            cycles: Vec::new(),
            metadata: GraphMetadata {
                run_id: Uuid::new_v4(),
                built_at: Utc::now(),
                workspace_root: workspace_root.to_path_buf(),
                node_count: 0,
                max_depth: 0,
                warnings: Vec::new(),
            },
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.metadata.run_id
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.metadata.built_at
    }

    pub fn metadata(&self) -> &GraphMetadata {
        &self.metadata
    }

    pub fn warnings(&self) -> &[String] {
        &self.metadata.warnings
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.metadata.warnings.push(warning.into());
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &DependencyId) -> bool {
        self.nodes.contains_key(id.key())
    }

    pub fn get(&self, id: &DependencyId) -> Option<&ResolutionDependencyNode> {
        self.nodes.get(id.key())
    }

    pub fn get_mut(&mut self, id: &DependencyId) -> Option<&mut ResolutionDependencyNode> {
        self.nodes.get_mut(id.key())
    }

    /// Insert a new node. An existing node with the same key is kept.
    pub fn insert(&mut self, node: ResolutionDependencyNode) -> bool {
        if self.nodes.contains_key(node.id.key()) {
            return false;
        }
        self.discovery_order.push(node.id.clone());
        self.nodes.insert(node.id.key().to_string(), node);
        true
    }

    /// Nodes in discovery order.
    pub fn nodes(&self) -> impl Iterator<Item = &ResolutionDependencyNode> {
        self.discovery_order
            .iter()
            .filter_map(|id| self.nodes.get(id.key()))
    }

    pub fn roots(&self) -> &[DependencyId] {
        &self.roots
    }

    pub fn add_root(&mut self, id: DependencyId) {
        if !self.roots.contains(&id) {
            self.roots.push(id);
        }
    }

    /// Record `parent -> child`. Duplicate edges are ignored.
    pub fn add_edge(&mut self, parent: &DependencyId, child: &DependencyId) {
        if let Some(node) = self.nodes.get_mut(parent.key())
            && !node.children.contains(child)
        {
            node.children.push(child.clone());
        }
        if let Some(node) = self.nodes.get_mut(child.key())
            && !node.parents.contains(parent)
        {
            node.parents.push(parent.clone());
        }
    }

    pub fn remove_edge(&mut self, parent: &DependencyId, child: &DependencyId) {
        if let Some(node) = self.nodes.get_mut(parent.key()) {
            node.children.retain(|c| c != child);
        }
        if let Some(node) = self.nodes.get_mut(child.key()) {
            node.parents.retain(|p| p != parent);
        }
    }

    pub fn cycles(&self) -> &[DependencyCycle] {
        &self.cycles
    }

    /// Record a cycle unless one with the same member set is already known.
    pub fn record_cycle(&mut self, cycle: DependencyCycle) -> bool {
        let keys = cycle.member_keys();
        if self.cycles.iter().any(|c| c.member_keys() == keys) {
            return false;
        }
        self.cycles.push(cycle);
        true
    }

    /// Installation order computed by [`finalize`](Self::finalize).
    pub fn installation_order(&self) -> &[DependencyId] {
        &self.installation_order
    }

    /// Edges that close a cycle, in traversal order.
    pub fn back_edges(&self) -> Vec<BackEdge> {
        self.walk().1
    }

    /// Compute the installation order and refresh node and depth counts.
    pub fn finalize(&mut self) {
        let (order, _) = self.walk();
        self.installation_order = order;
        self.metadata.node_count = self.nodes.len();
        self.metadata.max_depth = self.nodes.values().map(|n| n.depth).max().unwrap_or(0);
    }

    /// Depth-first post-order over the graph, roots first, children in
    /// declaration order. Edges into a node still on the stack are not
    /// followed and are reported as back edges.
    fn walk(&self) -> (Vec<DependencyId>, Vec<BackEdge>) {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut back_edges = Vec::new();
        let mut done: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&DependencyId> = Vec::new();

        let starts = self.roots.iter().chain(self.discovery_order.iter());
        for start in starts {
            if done.contains(start.key()) {
                continue;
            }
            self.visit(start, &mut stack, &mut done, &mut order, &mut back_edges);
        }
        (order, back_edges)
    }

    fn visit<'g>(
        &'g self,
        id: &'g DependencyId,
        stack: &mut Vec<&'g DependencyId>,
        done: &mut HashSet<&'g str>,
        order: &mut Vec<DependencyId>,
        back_edges: &mut Vec<BackEdge>,
    ) {
        let Some(node) = self.nodes.get(id.key()) else {
            return;
        };
        stack.push(id);
        for child in &node.children {
            if let Some(pos) = stack.iter().position(|s| *s == child) {
                back_edges.push(BackEdge {
                    from: id.clone(),
                    to: child.clone(),
                    members: stack[pos..].iter().map(|s| (*s).clone()).collect(),
                });
                continue;
            }
            if !done.contains(child.key()) {
                self.visit(child, stack, done, order, back_edges);
            }
        }
        stack.pop();
        done.insert(id.key());
        order.push(id.clone());
    }

    /// Display names along one path from a root to `id`, root first.
    ///
    /// Follows the first recorded parent at each step.
    pub fn dependency_chain(&self, id: &DependencyId) -> Vec<String> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.get(id);
        while let Some(node) = current {
            if !seen.insert(node.id.key()) {
                break;
            }
            chain.push(node.package_name().to_string());
            current = node.parents.first().and_then(|p| self.get(p));
        }
        chain.reverse();
        chain
    }
}
