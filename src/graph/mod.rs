//! Graph module for build dependency modeling.
//!
//! This module provides the [`BuildGraph`] arena of build-unit nodes
//! with bidirectionally-navigable adjacency, and the [`EdgeRegistry`]
//! side-table owning per-reference metadata.
//!
//! # Example
//!
//! ```rust
//! use buildscope::graph::{BuildGraph, EdgeRegistry, ReferenceMetadata};
//! use buildscope::unit::BuildUnit;
//!
//! let mut graph = BuildGraph::new();
//! let mut registry = EdgeRegistry::new();
//!
//! let app = graph.add_unit(BuildUnit::new("app.proj", "17.0"));
//! let core = graph.add_unit(BuildUnit::new("core.proj", "17.0"));
//! graph.add_reference(app, core, ReferenceMetadata::new(), &mut registry);
//!
//! assert_eq!(graph.node_count(), 2);
//! assert_eq!(graph.reference_count(), 1);
//! ```

mod build_graph;
mod registry;

pub use build_graph::{BuildGraph, GraphError, GraphNode, NodeId};
pub use registry::{EdgeRegistry, ReferenceMetadata};
