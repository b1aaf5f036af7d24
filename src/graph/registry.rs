//! Edge registry for reference metadata.
//!
//! Nodes own only their adjacency sets; everything describing *why* a
//! reference exists lives here, keyed by the ordered pair of node
//! handles. De-duplication semantics belong to the registry, not the
//! node: recording the same ordered pair twice overwrites the metadata.

use std::collections::{BTreeMap, HashMap};

use super::build_graph::NodeId;

/// Item-level data describing one reference between two build units.
///
/// Typically carries the configuration mapping between the referencing
/// and referenced unit (e.g., which configuration the target should be
/// built in), plus an optional item type label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceMetadata {
    /// Item type the reference was declared as, when known.
    pub item_type: Option<String>,

    /// Key/value metadata attached to the reference item.
    pub properties: BTreeMap<String, String>,
}

impl ReferenceMetadata {
    /// Creates empty reference metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates metadata tagged with an item type label.
    pub fn with_item_type(item_type: impl Into<String>) -> Self {
        Self {
            item_type: Some(item_type.into()),
            properties: BTreeMap::new(),
        }
    }

    /// Sets a metadata property, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Looks up a metadata property by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// Owns all edge metadata for a build graph, keyed by ordered node pairs.
///
/// The registry is a collaborator of [`BuildGraph`](super::BuildGraph):
/// reference-management operations keep it in lockstep with the
/// adjacency sets but the storage itself is external to the nodes.
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
/// let lib = graph.add_unit(BuildUnit::new("lib.proj", "17.0"));
///
/// graph.add_reference(app, lib, ReferenceMetadata::new(), &mut registry);
/// assert!(registry.contains(app, lib));
/// ```
#[derive(Debug, Clone, Default)]
pub struct EdgeRegistry {
    edges: HashMap<(NodeId, NodeId), ReferenceMetadata>,
}

impl EdgeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records metadata for the ordered pair, overwriting any existing
    /// entry.
    ///
    /// Returns the previous metadata when the edge was already present.
    pub fn add_or_update(
        &mut self,
        from: NodeId,
        to: NodeId,
        metadata: ReferenceMetadata,
    ) -> Option<ReferenceMetadata> {
        self.edges.insert((from, to), metadata)
    }

    /// Removes the entry for the ordered pair, returning its metadata.
    pub fn remove(&mut self, from: NodeId, to: NodeId) -> Option<ReferenceMetadata> {
        self.edges.remove(&(from, to))
    }

    /// Gets the metadata recorded for the ordered pair.
    pub fn get(&self, from: NodeId, to: NodeId) -> Option<&ReferenceMetadata> {
        self.edges.get(&(from, to))
    }

    /// Checks whether an edge is recorded for the ordered pair.
    pub fn contains(&self, from: NodeId, to: NodeId) -> bool {
        self.edges.contains_key(&(from, to))
    }

    /// Returns the number of recorded edges.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Checks if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}
