//! Handle-based graph codec.
//!
//! Nodes mutually reference each other, so recursing through the
//! adjacency relation while encoding would never terminate. The codec
//! instead flattens a graph through a per-session node table: every
//! node is serialized in full exactly once, and adjacency is written as
//! dense `u32` handles into that table. Decoding materializes all units
//! into the same shared table first and only then wires adjacency, so
//! two lists naming the same handle resolve to one in-memory node.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

use crate::graph::{BuildGraph, NodeId};
use crate::unit::{BuildUnit, GlobalProperties};

/// Errors that can occur while reading or decoding a wire payload.
///
/// These are input errors: a corrupt or hand-edited payload is rejected
/// with a description of what is wrong, unlike in-memory invariant
/// violations which panic.
#[derive(Debug, Error)]
pub enum WireError {
    /// Failed to read or write the payload bytes.
    #[error("failed to read wire payload: {0}")]
    Io(#[from] std::io::Error),

    /// The payload is not valid JSON for the wire schema.
    #[error("failed to parse wire payload: {0}")]
    Json(#[from] serde_json::Error),

    /// An adjacency list names a handle past the end of the node table.
    #[error("wire payload references node handle {handle} but only {nodes} nodes are encoded")]
    HandleOutOfRange {
        /// The out-of-range handle.
        handle: u32,
        /// Number of nodes actually present in the payload.
        nodes: usize,
    },

    /// Two entries in the node table share one configuration identity.
    #[error("wire payload encodes '{}' more than once", .path.display())]
    DuplicateUnit {
        /// Path of the duplicated unit.
        path: PathBuf,
    },

    /// The payload's outgoing and incoming lists do not agree.
    #[error("adjacency of '{}' is not symmetric in the wire payload", .path.display())]
    AsymmetricAdjacency {
        /// Path of the unit whose adjacency is inconsistent.
        path: PathBuf,
    },
}

/// Self-contained unit data as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireUnit {
    /// Full path to the unit's project file.
    pub full_path: PathBuf,
    /// Tools version the unit was evaluated with.
    pub tools_version: String,
    /// Global configuration properties.
    pub global_properties: GlobalProperties,
}

impl From<&BuildUnit> for WireUnit {
    fn from(unit: &BuildUnit) -> Self {
        Self {
            full_path: unit.full_path.clone(),
            tools_version: unit.tools_version.clone(),
            global_properties: unit.global_properties.clone(),
        }
    }
}

impl From<WireUnit> for BuildUnit {
    fn from(unit: WireUnit) -> Self {
        BuildUnit::with_properties(unit.full_path, unit.tools_version, unit.global_properties)
    }
}

/// One node of the flattened graph: its own unit data plus adjacency
/// expressed as handles into the session's node table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireNode {
    /// The unit itself, serialized in full exactly once.
    pub unit: WireUnit,
    /// Handles of the units this node references.
    pub outgoing: Vec<u32>,
    /// Handles of the units referencing this node.
    pub incoming: Vec<u32>,
}

/// A flattened build graph ready for transport.
///
/// The node table is the encoding session's shared identity table:
/// handle `n` is the `n`-th entry. A table belongs to exactly one graph
/// and must not be reused across unrelated graphs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireGraph {
    /// The session node table, in handle order.
    pub nodes: Vec<WireNode>,
}

impl WireGraph {
    /// Serializes the wire form as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses the wire form from JSON.
    pub fn from_json(content: &str) -> Result<Self, WireError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Writes the wire form as JSON to the given writer.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), WireError> {
        let json = self.to_json()?;
        writeln!(writer, "{}", json)?;
        Ok(())
    }

    /// Reads the wire form from a JSON reader.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self, WireError> {
        let mut content = String::new();
        reader.read_to_string(&mut content)?;
        Self::from_json(&content)
    }

    /// Materializes the wire form back into a [`BuildGraph`].
    ///
    /// Convenience for [`decode_graph`].
    pub fn decode(&self) -> Result<BuildGraph, WireError> {
        decode_graph(self)
    }
}

/// An encoding session over one graph.
///
/// The session owns the shared node table: the first time a node is
/// seen it is assigned the next dense handle and queued for
/// serialization; every later sighting (from any adjacency list) reuses
/// the handle instead of re-encoding the node. Adjacency pulls
/// neighbors into the table, so seeding a session with a subset of
/// nodes encodes the whole fragment connected to them.
pub struct EncodeSession<'a> {
    graph: &'a BuildGraph,
    handles: HashMap<NodeId, u32>,
    order: Vec<NodeId>,
}

impl<'a> EncodeSession<'a> {
    /// Starts an empty session over the given graph.
    pub fn new(graph: &'a BuildGraph) -> Self {
        Self {
            graph,
            handles: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Adds a node to the session table, returning its handle.
    ///
    /// Idempotent: a node already in the table keeps its handle.
    pub fn add_node(&mut self, id: NodeId) -> u32 {
        if let Some(&handle) = self.handles.get(&id) {
            return handle;
        }
        let handle = self.order.len() as u32;
        self.handles.insert(id, handle);
        self.order.push(id);
        handle
    }

    /// Flattens every node reachable from the seeded set (over both
    /// reference directions) into the wire form.
    pub fn finish(mut self) -> WireGraph {
        let graph = self.graph;
        let mut nodes = Vec::new();
        let mut cursor = 0;

        // The table grows as adjacency pulls in unseen neighbors; keep
        // draining until every tabled node has been serialized.
        while cursor < self.order.len() {
            let id = self.order[cursor];
            cursor += 1;

            let node = graph.node(id);

            // Visit neighbors in handle-stable order so unseen ones get
            // deterministic handles regardless of set iteration order.
            let mut out_ids: Vec<NodeId> = node.outgoing().iter().copied().collect();
            let mut in_ids: Vec<NodeId> = node.incoming().iter().copied().collect();
            out_ids.sort_unstable();
            in_ids.sort_unstable();

            let mut outgoing: Vec<u32> =
                out_ids.into_iter().map(|to| self.add_node(to)).collect();
            let mut incoming: Vec<u32> =
                in_ids.into_iter().map(|from| self.add_node(from)).collect();
            outgoing.sort_unstable();
            incoming.sort_unstable();

            nodes.push(WireNode {
                unit: WireUnit::from(node.unit()),
                outgoing,
                incoming,
            });
        }

        debug!(nodes = nodes.len(), "encoded graph fragment");
        WireGraph { nodes }
    }
}

/// Flattens an entire graph into its wire form.
///
/// # Example
///
/// ```rust
/// use buildscope::graph::{BuildGraph, EdgeRegistry, ReferenceMetadata};
/// use buildscope::unit::BuildUnit;
/// use buildscope::wire::{decode_graph, encode_graph};
///
/// let mut graph = BuildGraph::new();
/// let mut registry = EdgeRegistry::new();
/// let app = graph.add_unit(BuildUnit::new("app.proj", "17.0"));
/// let core = graph.add_unit(BuildUnit::new("core.proj", "17.0"));
/// graph.add_reference(app, core, ReferenceMetadata::new(), &mut registry);
///
/// let wire = encode_graph(&graph);
/// let decoded = decode_graph(&wire).unwrap();
/// assert_eq!(decoded.node_count(), 2);
/// assert_eq!(decoded.reference_count(), 1);
/// ```
pub fn encode_graph(graph: &BuildGraph) -> WireGraph {
    let mut session = EncodeSession::new(graph);
    for id in graph.node_ids() {
        session.add_node(id);
    }
    session.finish()
}

/// Flattens the fragment connected to the seed nodes into wire form.
///
/// The fragment is closed over both reference directions: dependencies
/// and dependents of every seed are pulled into the session table.
pub fn encode_fragment(graph: &BuildGraph, seeds: &[NodeId]) -> WireGraph {
    let mut session = EncodeSession::new(graph);
    for &id in seeds {
        session.add_node(id);
    }
    session.finish()
}

/// Materializes a wire form into a fresh [`BuildGraph`].
///
/// Units are added to the shared table first so every handle resolves
/// to one node, then adjacency is wired from the outgoing lists. The
/// payload's incoming lists must agree with the rebuilt incoming sets;
/// disagreement, handles past the table, or duplicated unit identities
/// reject the payload.
///
/// The decoded graph starts with an empty edge registry: reference
/// metadata does not travel on the wire.
pub fn decode_graph(wire: &WireGraph) -> Result<BuildGraph, WireError> {
    let mut graph = BuildGraph::with_capacity(wire.nodes.len());
    let mut ids = Vec::with_capacity(wire.nodes.len());

    // Pass 1: materialize every unit into the shared table.
    for node in &wire.nodes {
        let before = graph.node_count();
        let id = graph.add_unit(BuildUnit::from(node.unit.clone()));
        if graph.node_count() == before {
            return Err(WireError::DuplicateUnit {
                path: node.unit.full_path.clone(),
            });
        }
        ids.push(id);
    }

    let resolve = |handle: u32| -> Result<NodeId, WireError> {
        ids.get(handle as usize)
            .copied()
            .ok_or(WireError::HandleOutOfRange {
                handle,
                nodes: ids.len(),
            })
    };

    // Pass 2: wire adjacency by handle.
    for (position, node) in wire.nodes.iter().enumerate() {
        for &handle in &node.outgoing {
            let to = resolve(handle)?;
            graph.link(ids[position], to);
        }
    }

    // Pass 3: the incoming lists must describe the same edges.
    for (position, node) in wire.nodes.iter().enumerate() {
        let expected: HashSet<NodeId> = node
            .incoming
            .iter()
            .map(|&handle| resolve(handle))
            .collect::<Result<_, _>>()?;
        if &expected != graph.node(ids[position]).incoming() {
            return Err(WireError::AsymmetricAdjacency {
                path: node.unit.full_path.clone(),
            });
        }
    }

    debug!(nodes = graph.node_count(), "decoded graph");
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeRegistry, ReferenceMetadata};

    fn unit(path: &str) -> BuildUnit {
        BuildUnit::new(path, "17.0")
    }

    /// A -> B -> C plus A -> C: every node participates in a cycle of
    /// mutual incoming/outgoing links even though the references are
    /// acyclic.
    fn linked_graph() -> (BuildGraph, NodeId, NodeId, NodeId) {
        let mut graph = BuildGraph::new();
        let mut registry = EdgeRegistry::new();
        let a = graph.add_unit(unit("a.proj"));
        let b = graph.add_unit(unit("b.proj"));
        let c = graph.add_unit(unit("c.proj"));
        graph.add_reference(a, b, ReferenceMetadata::new(), &mut registry);
        graph.add_reference(b, c, ReferenceMetadata::new(), &mut registry);
        graph.add_reference(a, c, ReferenceMetadata::new(), &mut registry);
        (graph, a, b, c)
    }

    #[test]
    fn test_round_trip_preserves_identity_and_symmetry() {
        let (graph, a, _, c) = linked_graph();
        assert!(graph.node(c).incoming().contains(&a));

        let wire = encode_graph(&graph);
        // Each node appears in the table exactly once despite being
        // named by multiple adjacency lists.
        assert_eq!(wire.nodes.len(), 3);

        let decoded = wire.decode().unwrap();
        assert_eq!(decoded.node_count(), 3);
        assert_eq!(decoded.reference_count(), 3);

        // Identity-equal before implies identity-equal after: the node
        // reached through a's outgoing list and the node reached through
        // b's outgoing list are the same c.
        let da = decoded.find(&unit("a.proj").configuration_key()).unwrap();
        let db = decoded.find(&unit("b.proj").configuration_key()).unwrap();
        let dc = decoded.find(&unit("c.proj").configuration_key()).unwrap();

        assert!(decoded.node(da).outgoing().contains(&dc));
        assert!(decoded.node(db).outgoing().contains(&dc));
        assert_eq!(decoded.node(dc).incoming().len(), 2);

        // Symmetry holds across the transfer.
        for id in decoded.node_ids() {
            for &to in decoded.node(id).outgoing() {
                assert!(decoded.node(to).incoming().contains(&id));
            }
            for &from in decoded.node(id).incoming() {
                assert!(decoded.node(from).outgoing().contains(&id));
            }
        }
    }

    #[test]
    fn test_round_trip_through_json() {
        let (graph, _, _, _) = linked_graph();

        let json = encode_graph(&graph).to_json().unwrap();
        let decoded = WireGraph::from_json(&json).unwrap().decode().unwrap();

        assert_eq!(decoded.node_count(), 3);
        assert_eq!(decoded.reference_count(), 3);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let (graph, _, _, _) = linked_graph();
        assert_eq!(encode_graph(&graph), encode_graph(&graph));
    }

    #[test]
    fn test_encode_preserves_properties() {
        let mut graph = BuildGraph::new();
        let mut debug = unit("a.proj");
        debug.set_property("Configuration", "Debug");
        graph.add_unit(debug.clone());

        let decoded = encode_graph(&graph).decode().unwrap();
        let id = decoded.find(&debug.configuration_key()).unwrap();
        assert_eq!(decoded.unit(id).property("Configuration"), Some("Debug"));
    }

    #[test]
    fn test_encode_fragment_closes_over_both_directions() {
        let (graph, _, b, _) = linked_graph();

        // Seeding with just b drags in its dependent a and dependency c.
        let wire = encode_fragment(&graph, &[b]);
        assert_eq!(wire.nodes.len(), 3);

        let decoded = wire.decode().unwrap();
        assert_eq!(decoded.node_count(), 3);
    }

    #[test]
    fn test_encode_fragment_skips_disconnected_nodes() {
        let (mut graph, a, _, _) = linked_graph();
        graph.add_unit(unit("island.proj"));

        let wire = encode_fragment(&graph, &[a]);
        assert_eq!(wire.nodes.len(), 3);

        let decoded = wire.decode().unwrap();
        assert!(!decoded.contains(&unit("island.proj").configuration_key()));
    }

    #[test]
    fn test_decode_rejects_out_of_range_handle() {
        let wire = WireGraph {
            nodes: vec![WireNode {
                unit: WireUnit::from(&unit("a.proj")),
                outgoing: vec![7],
                incoming: vec![],
            }],
        };

        let err = decode_graph(&wire).unwrap_err();
        assert!(matches!(err, WireError::HandleOutOfRange { handle: 7, nodes: 1 }));
    }

    #[test]
    fn test_decode_rejects_duplicate_unit() {
        let node = WireNode {
            unit: WireUnit::from(&unit("a.proj")),
            outgoing: vec![],
            incoming: vec![],
        };
        let wire = WireGraph {
            nodes: vec![node.clone(), node],
        };

        let err = decode_graph(&wire).unwrap_err();
        assert!(matches!(err, WireError::DuplicateUnit { .. }));
    }

    #[test]
    fn test_decode_rejects_asymmetric_payload() {
        let wire = WireGraph {
            nodes: vec![
                WireNode {
                    unit: WireUnit::from(&unit("a.proj")),
                    outgoing: vec![1],
                    incoming: vec![],
                },
                WireNode {
                    unit: WireUnit::from(&unit("b.proj")),
                    // Claims nobody references it, contradicting a's
                    // outgoing list.
                    outgoing: vec![],
                    incoming: vec![],
                },
            ],
        };

        let err = decode_graph(&wire).unwrap_err();
        assert!(matches!(err, WireError::AsymmetricAdjacency { .. }));
    }

    #[test]
    fn test_decode_rejects_malformed_json() {
        assert!(WireGraph::from_json("{not json").is_err());
    }

    #[test]
    fn test_write_and_read() {
        let (graph, _, _, _) = linked_graph();
        let wire = encode_graph(&graph);

        let mut buffer = Vec::new();
        wire.write(&mut buffer).unwrap();

        let read_back = WireGraph::read(&mut buffer.as_slice()).unwrap();
        assert_eq!(read_back, wire);
    }
}
