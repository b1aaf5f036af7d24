//! Build graph implementation.
//!
//! Provides an arena-style container for build-unit nodes with
//! bidirectionally-navigable adjacency, reference management that keeps
//! both directions and the edge registry in lockstep, and projections
//! into petgraph for ordering and cycle diagnostics.

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

use super::registry::{EdgeRegistry, ReferenceMetadata};
use crate::unit::{BuildUnit, ConfigurationKey};

/// Errors produced by graph-level queries.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The graph contains a directed reference cycle, so no topological
    /// ordering exists. Construction is expected to be acyclic upstream;
    /// the offending unit paths are listed for diagnosis.
    #[error("build graph contains a reference cycle: {}", .cycle.join(" -> "))]
    Cyclic {
        /// Paths of the units participating in one detected cycle.
        cycle: Vec<String>,
    },
}

/// A stable handle to a node inside one [`BuildGraph`].
///
/// Handles are assigned in insertion order and remain valid for the
/// lifetime of the graph; nodes are never deleted individually, the
/// whole graph is discarded together. A handle from one graph must not
/// be used against another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    /// Returns the handle's position in the graph's insertion order.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One node of the build graph: an evaluated unit plus its adjacency.
///
/// Both directions of the reference relation are kept as identity sets
/// so the graph is navigable from a unit to its dependencies and to its
/// dependents without a scan.
#[derive(Debug, Clone)]
pub struct GraphNode {
    unit: BuildUnit,
    outgoing: HashSet<NodeId>,
    incoming: HashSet<NodeId>,
}

impl GraphNode {
    fn new(unit: BuildUnit) -> Self {
        Self {
            unit,
            outgoing: HashSet::new(),
            incoming: HashSet::new(),
        }
    }

    /// The evaluated build unit this node wraps.
    pub fn unit(&self) -> &BuildUnit {
        &self.unit
    }

    /// Units this node references (its dependencies).
    pub fn outgoing(&self) -> &HashSet<NodeId> {
        &self.outgoing
    }

    /// Units referencing this node (its dependents).
    pub fn incoming(&self) -> &HashSet<NodeId> {
        &self.incoming
    }

    /// True when no other unit references this one.
    pub fn is_root(&self) -> bool {
        self.incoming.is_empty()
    }
}

/// A directed graph of build units with bidirectional adjacency.
///
/// All nodes are owned by the graph and addressed by [`NodeId`] handles;
/// an index keyed by [`ConfigurationKey`] deduplicates units so exactly
/// one node exists per distinct (path, properties) combination.
///
/// Mutation is single-writer: callers serialize all reference-management
/// calls during construction. Once built, the graph is treated as
/// read-only and may be shared freely.
///
/// Invariant: `b ∈ a.outgoing ⇔ a ∈ b.incoming` after every mutation.
/// [`remove_reference`](Self::remove_reference) asserts it; a violation
/// is a programming defect upstream, never bad input.
///
/// # Example
///
/// ```rust
/// use buildscope::graph::{BuildGraph, EdgeRegistry, ReferenceMetadata};
/// use buildscope::unit::BuildUnit;
///
/// let mut graph = BuildGraph::new();
/// let mut registry = EdgeRegistry::new();
///
/// let app = graph.add_unit(BuildUnit::new("app.proj", "17.0"));
/// let core = graph.add_unit(BuildUnit::new("core.proj", "17.0"));
/// graph.add_reference(app, core, ReferenceMetadata::new(), &mut registry);
///
/// assert!(graph.node(app).outgoing().contains(&core));
/// assert!(graph.node(core).incoming().contains(&app));
/// assert_eq!(graph.roots(), vec![app]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct BuildGraph {
    /// Node arena; a `NodeId` is an index into it.
    nodes: Vec<GraphNode>,
    /// Maps configuration identity to handles for O(1) lookup.
    index: HashMap<ConfigurationKey, NodeId>,
}

impl BuildGraph {
    /// Creates a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new graph with pre-allocated node capacity.
    pub fn with_capacity(nodes: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(nodes),
            index: HashMap::with_capacity(nodes),
        }
    }

    /// Adds an evaluated unit to the graph.
    ///
    /// If a node with the same configuration identity already exists,
    /// its handle is returned and the supplied unit is discarded; the
    /// graph holds exactly one node per distinct configuration.
    pub fn add_unit(&mut self, unit: BuildUnit) -> NodeId {
        let key = unit.configuration_key();
        if let Some(&id) = self.index.get(&key) {
            return id;
        }

        let id = NodeId::from_index(self.nodes.len());
        debug!(unit = %unit, handle = id.index(), "adding build unit");
        self.nodes.push(GraphNode::new(unit));
        self.index.insert(key, id);
        id
    }

    /// Looks up a node handle by configuration identity.
    pub fn find(&self, key: &ConfigurationKey) -> Option<NodeId> {
        self.index.get(key).copied()
    }

    /// Checks whether a node with the given identity exists.
    pub fn contains(&self, key: &ConfigurationKey) -> bool {
        self.index.contains_key(key)
    }

    /// Gets the node behind a handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle does not belong to this graph.
    pub fn node(&self, id: NodeId) -> &GraphNode {
        &self.nodes[id.index()]
    }

    /// Gets the build unit behind a handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle does not belong to this graph.
    pub fn unit(&self, id: NodeId) -> &BuildUnit {
        &self.nodes[id.index()].unit
    }

    /// Adds a reference from one unit to another.
    ///
    /// Inserts `to` into `from`'s outgoing set and `from` into `to`'s
    /// incoming set, and records the metadata in the registry keyed by
    /// the ordered pair. Idempotent with respect to the adjacency sets;
    /// repeated calls overwrite the metadata (the registry owns
    /// de-duplication semantics).
    pub fn add_reference(
        &mut self,
        from: NodeId,
        to: NodeId,
        metadata: ReferenceMetadata,
        registry: &mut EdgeRegistry,
    ) {
        let inserted = self.nodes[from.index()].outgoing.insert(to);
        self.nodes[to.index()].incoming.insert(from);
        registry.add_or_update(from, to, metadata);

        if inserted {
            debug!(
                from = %self.nodes[from.index()].unit,
                to = %self.nodes[to.index()].unit,
                "added reference"
            );
        }
    }

    /// Removes the reference from one unit to another.
    ///
    /// Unwires both adjacency directions and drops the registry entry.
    ///
    /// # Panics
    ///
    /// Panics if the symmetry invariant was already violated before the
    /// call (the edge exists in one direction only). That indicates a
    /// programming defect upstream, not bad input, and must surface
    /// loudly rather than be tolerated.
    pub fn remove_reference(&mut self, from: NodeId, to: NodeId, registry: &mut EdgeRegistry) {
        let had_outgoing = self.nodes[from.index()].outgoing.remove(&to);
        let had_incoming = self.nodes[to.index()].incoming.remove(&from);
        assert!(
            had_outgoing && had_incoming,
            "inconsistent reference from '{}' to '{}' (outgoing present: {}, incoming present: {})",
            self.nodes[from.index()].unit,
            self.nodes[to.index()].unit,
            had_outgoing,
            had_incoming,
        );

        registry.remove(from, to);
        debug!(
            from = %self.nodes[from.index()].unit,
            to = %self.nodes[to.index()].unit,
            "removed reference"
        );
    }

    /// Removes every outgoing reference of a unit.
    ///
    /// Unlinks `from` out of the incoming set of each formerly-referenced
    /// node, drops the corresponding registry edges, then clears the
    /// outgoing set. Used when a node is pruned from the graph (e.g.,
    /// replaced by an updated evaluation).
    ///
    /// # Panics
    ///
    /// Panics if any of the edges was already asymmetric before the call.
    pub fn remove_all_references(&mut self, from: NodeId, registry: &mut EdgeRegistry) {
        let targets: Vec<NodeId> = self.nodes[from.index()].outgoing.iter().copied().collect();
        for to in targets {
            let removed = self.nodes[to.index()].incoming.remove(&from);
            assert!(
                removed,
                "asymmetric reference between '{}' and '{}': target has no incoming entry",
                self.nodes[from.index()].unit,
                self.nodes[to.index()].unit,
            );
            registry.remove(from, to);
        }
        self.nodes[from.index()].outgoing.clear();
    }

    /// Inserts both adjacency directions without touching any registry.
    ///
    /// Only for wire decoding, which rebuilds adjacency from a payload
    /// that carries no edge metadata.
    pub(crate) fn link(&mut self, from: NodeId, to: NodeId) {
        self.nodes[from.index()].outgoing.insert(to);
        self.nodes[to.index()].incoming.insert(from);
    }

    /// Iterates over all node handles in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId::from_index)
    }

    /// Iterates over all nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter()
    }

    /// Returns the handles of every root node (no incoming references),
    /// in insertion order.
    pub fn roots(&self) -> Vec<NodeId> {
        self.node_ids()
            .filter(|&id| self.nodes[id.index()].is_root())
            .collect()
    }

    /// Returns the number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of references in the graph.
    pub fn reference_count(&self) -> usize {
        self.nodes.iter().map(|node| node.outgoing.len()).sum()
    }

    /// Checks if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns all nodes in dependency order: every unit appears after
    /// the units it references, so a scheduler can walk the result
    /// front-to-back.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Cyclic`] when the graph contains a
    /// reference cycle and no ordering exists.
    pub fn toposorted(&self) -> Result<Vec<NodeId>, GraphError> {
        let graph = self.to_petgraph();
        match toposort(&graph, None) {
            Ok(order) => {
                // Edges point dependent -> dependency, so petgraph yields
                // dependents first; reverse for dependencies-first order.
                Ok(order.into_iter().rev().map(|idx| graph[idx]).collect())
            }
            Err(_) => {
                let cycle = self
                    .detect_cycles()
                    .into_iter()
                    .next()
                    .unwrap_or_default()
                    .into_iter()
                    .map(|id| self.nodes[id.index()].unit.full_path.display().to_string())
                    .collect();
                Err(GraphError::Cyclic { cycle })
            }
        }
    }

    /// Detects reference cycles.
    ///
    /// Construction is assumed acyclic upstream; this is a diagnostic
    /// for surfacing upstream defects, using strongly connected
    /// components.
    ///
    /// # Returns
    ///
    /// A vector of cycles, where each cycle is a vector of node handles.
    pub fn detect_cycles(&self) -> Vec<Vec<NodeId>> {
        let graph = self.to_petgraph();
        let mut cycles = Vec::new();

        for scc in tarjan_scc(&graph) {
            if scc.len() > 1 {
                cycles.push(scc.into_iter().map(|idx| graph[idx]).collect());
            } else if scc.len() == 1 {
                // Single node: only a cycle if it references itself.
                let idx = scc[0];
                if graph.contains_edge(idx, idx) {
                    cycles.push(vec![graph[idx]]);
                }
            }
        }

        cycles
    }

    /// Projects the arena into a petgraph `DiGraph` for algorithms.
    fn to_petgraph(&self) -> DiGraph<NodeId, ()> {
        let mut graph = DiGraph::with_capacity(self.nodes.len(), self.reference_count());
        let indices: Vec<NodeIndex> = self.node_ids().map(|id| graph.add_node(id)).collect();

        for (position, node) in self.nodes.iter().enumerate() {
            for &to in &node.outgoing {
                graph.add_edge(indices[position], indices[to.index()], ());
            }
        }

        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(path: &str) -> BuildUnit {
        BuildUnit::new(path, "17.0")
    }

    #[test]
    fn test_create_empty_graph() {
        let graph = BuildGraph::new();
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.reference_count(), 0);
        assert!(graph.is_empty());
    }

    #[test]
    fn test_add_unit_deduplicates_by_configuration() {
        let mut graph = BuildGraph::new();
        let first = graph.add_unit(unit("a.proj"));
        let again = graph.add_unit(unit("a.proj"));

        assert_eq!(first, again);
        assert_eq!(graph.node_count(), 1);

        // Same path but different properties is a distinct configuration.
        let mut debug = unit("a.proj");
        debug.set_property("Configuration", "Debug");
        let other = graph.add_unit(debug);

        assert_ne!(first, other);
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn test_find_by_configuration_key() {
        let mut graph = BuildGraph::new();
        let id = graph.add_unit(unit("a.proj"));

        let key = unit("a.proj").configuration_key();
        assert_eq!(graph.find(&key), Some(id));
        assert!(graph.contains(&key));

        let missing = unit("missing.proj").configuration_key();
        assert_eq!(graph.find(&missing), None);
    }

    #[test]
    fn test_add_reference_wires_both_directions() {
        let mut graph = BuildGraph::new();
        let mut registry = EdgeRegistry::new();
        let a = graph.add_unit(unit("a.proj"));
        let b = graph.add_unit(unit("b.proj"));

        graph.add_reference(a, b, ReferenceMetadata::new(), &mut registry);

        assert!(graph.node(a).outgoing().contains(&b));
        assert!(graph.node(b).incoming().contains(&a));
        assert!(registry.contains(a, b));
        assert_eq!(graph.reference_count(), 1);
    }

    #[test]
    fn test_add_reference_idempotent_on_sets() {
        let mut graph = BuildGraph::new();
        let mut registry = EdgeRegistry::new();
        let a = graph.add_unit(unit("a.proj"));
        let b = graph.add_unit(unit("b.proj"));

        let mut first = ReferenceMetadata::new();
        first.set("Private", "false");
        graph.add_reference(a, b, first, &mut registry);
        let mut second = ReferenceMetadata::new();
        second.set("Private", "true");
        graph.add_reference(a, b, second, &mut registry);

        // Sets unchanged, metadata overwritten.
        assert_eq!(graph.node(a).outgoing().len(), 1);
        assert_eq!(graph.node(b).incoming().len(), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(a, b).unwrap().get("Private"), Some("true"));
    }

    #[test]
    fn test_remove_reference_unwires_both_directions() {
        let mut graph = BuildGraph::new();
        let mut registry = EdgeRegistry::new();
        let a = graph.add_unit(unit("a.proj"));
        let b = graph.add_unit(unit("b.proj"));

        graph.add_reference(a, b, ReferenceMetadata::new(), &mut registry);
        graph.remove_reference(a, b, &mut registry);

        assert!(!graph.node(a).outgoing().contains(&b));
        assert!(!graph.node(b).incoming().contains(&a));
        assert!(!registry.contains(a, b));
    }

    #[test]
    fn test_remove_reference_keeps_other_edges() {
        let mut graph = BuildGraph::new();
        let mut registry = EdgeRegistry::new();
        let a = graph.add_unit(unit("a.proj"));
        let b = graph.add_unit(unit("b.proj"));
        let c = graph.add_unit(unit("c.proj"));

        graph.add_reference(a, b, ReferenceMetadata::new(), &mut registry);
        graph.add_reference(a, c, ReferenceMetadata::new(), &mut registry);
        graph.add_reference(c, b, ReferenceMetadata::new(), &mut registry);

        graph.remove_reference(a, b, &mut registry);

        // The source, not the target, is unlinked from b's incoming set.
        assert!(graph.node(b).incoming().contains(&c));
        assert!(!graph.node(b).incoming().contains(&a));
        assert!(graph.node(a).outgoing().contains(&c));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    #[should_panic(expected = "inconsistent reference")]
    fn test_remove_reference_panics_on_asymmetry() {
        let mut graph = BuildGraph::new();
        let mut registry = EdgeRegistry::new();
        let a = graph.add_unit(unit("a.proj"));
        let b = graph.add_unit(unit("b.proj"));

        graph.add_reference(a, b, ReferenceMetadata::new(), &mut registry);
        // Corrupt the invariant from inside the module.
        graph.nodes[b.index()].incoming.remove(&a);

        graph.remove_reference(a, b, &mut registry);
    }

    #[test]
    fn test_remove_all_references() {
        let mut graph = BuildGraph::new();
        let mut registry = EdgeRegistry::new();
        let a = graph.add_unit(unit("a.proj"));
        let b = graph.add_unit(unit("b.proj"));
        let c = graph.add_unit(unit("c.proj"));
        let d = graph.add_unit(unit("d.proj"));

        graph.add_reference(a, b, ReferenceMetadata::new(), &mut registry);
        graph.add_reference(a, c, ReferenceMetadata::new(), &mut registry);
        graph.add_reference(d, a, ReferenceMetadata::new(), &mut registry);

        graph.remove_all_references(a, &mut registry);

        assert!(graph.node(a).outgoing().is_empty());
        assert!(!graph.node(b).incoming().contains(&a));
        assert!(!graph.node(c).incoming().contains(&a));
        // Incoming references to a are untouched.
        assert!(graph.node(a).incoming().contains(&d));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(d, a));
    }

    #[test]
    fn test_roots() {
        let mut graph = BuildGraph::new();
        let mut registry = EdgeRegistry::new();
        let app = graph.add_unit(unit("app.proj"));
        let tool = graph.add_unit(unit("tool.proj"));
        let core = graph.add_unit(unit("core.proj"));

        graph.add_reference(app, core, ReferenceMetadata::new(), &mut registry);
        graph.add_reference(tool, core, ReferenceMetadata::new(), &mut registry);

        assert_eq!(graph.roots(), vec![app, tool]);
    }

    #[test]
    fn test_toposorted_dependencies_first() {
        let mut graph = BuildGraph::new();
        let mut registry = EdgeRegistry::new();
        let app = graph.add_unit(unit("app.proj"));
        let lib = graph.add_unit(unit("lib.proj"));
        let core = graph.add_unit(unit("core.proj"));

        graph.add_reference(app, lib, ReferenceMetadata::new(), &mut registry);
        graph.add_reference(lib, core, ReferenceMetadata::new(), &mut registry);

        let order = graph.toposorted().unwrap();
        let position = |id: NodeId| order.iter().position(|&o| o == id).unwrap();

        assert!(position(core) < position(lib));
        assert!(position(lib) < position(app));
    }

    #[test]
    fn test_toposorted_rejects_cycle() {
        let mut graph = BuildGraph::new();
        let mut registry = EdgeRegistry::new();
        let a = graph.add_unit(unit("a.proj"));
        let b = graph.add_unit(unit("b.proj"));

        graph.add_reference(a, b, ReferenceMetadata::new(), &mut registry);
        graph.add_reference(b, a, ReferenceMetadata::new(), &mut registry);

        let err = graph.toposorted().unwrap_err();
        assert!(matches!(err, GraphError::Cyclic { .. }));
        assert!(err.to_string().contains("a.proj"));
    }

    #[test]
    fn test_detect_cycles() {
        let mut graph = BuildGraph::new();
        let mut registry = EdgeRegistry::new();
        let a = graph.add_unit(unit("a.proj"));
        let b = graph.add_unit(unit("b.proj"));
        let c = graph.add_unit(unit("c.proj"));
        let d = graph.add_unit(unit("d.proj"));

        graph.add_reference(a, b, ReferenceMetadata::new(), &mut registry);
        graph.add_reference(b, c, ReferenceMetadata::new(), &mut registry);
        graph.add_reference(c, a, ReferenceMetadata::new(), &mut registry);
        graph.add_reference(a, d, ReferenceMetadata::new(), &mut registry);

        let cycles = graph.detect_cycles();
        assert_eq!(cycles.len(), 1);

        let cycle = &cycles[0];
        assert_eq!(cycle.len(), 3);
        assert!(cycle.contains(&a));
        assert!(cycle.contains(&b));
        assert!(cycle.contains(&c));
        assert!(!cycle.contains(&d));
    }

    #[test]
    fn test_detect_cycles_none() {
        let mut graph = BuildGraph::new();
        let mut registry = EdgeRegistry::new();
        let a = graph.add_unit(unit("a.proj"));
        let b = graph.add_unit(unit("b.proj"));

        graph.add_reference(a, b, ReferenceMetadata::new(), &mut registry);

        assert!(graph.detect_cycles().is_empty());
    }

    #[test]
    fn test_symmetry_after_mixed_mutations() {
        let mut graph = BuildGraph::new();
        let mut registry = EdgeRegistry::new();
        let ids: Vec<NodeId> = (0..5)
            .map(|i| graph.add_unit(unit(&format!("p{}.proj", i))))
            .collect();

        for window in ids.windows(2) {
            graph.add_reference(window[0], window[1], ReferenceMetadata::new(), &mut registry);
        }
        graph.remove_reference(ids[1], ids[2], &mut registry);
        graph.remove_all_references(ids[3], &mut registry);

        for &id in &ids {
            for &to in graph.node(id).outgoing() {
                assert!(graph.node(to).incoming().contains(&id));
            }
            for &from in graph.node(id).incoming() {
                assert!(graph.node(from).outgoing().contains(&id));
            }
        }
    }
}
