//! Cross-boundary encoding for build graphs.
//!
//! Build-graph nodes reference each other in both directions, so a
//! naive recursive encoding would either never terminate or duplicate
//! node identity on the receiving side. This module flattens a graph
//! through a per-session shared node table: each node is serialized
//! once and adjacency travels as handles into that table, which the
//! decoder resolves back to single in-memory nodes.
//!
//! The byte layer is JSON; the identity-sharing policy is what this
//! module owns, not the primitive format.

mod codec;

pub use codec::{
    decode_graph, encode_fragment, encode_graph, EncodeSession, WireError, WireGraph, WireNode,
    WireUnit,
};
