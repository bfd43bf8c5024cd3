//! Preprocessing for a contraction-hierarchies routing engine: the access-only
//! stratification pass and the shortcut edge model it protects.
//!
//! Access-only roads may begin or end a route but never carry through-traffic.
//! [`access_only::stratify_marked_and_implicit_access_only_clusters`] rewrites every
//! access-only region into start/end strata so that property survives contraction,
//! and [`edge::DirectedEdge`] enforces the shortcut invariants (no access-only
//! children, monotonic shortcut ids) that the contraction step depends on.
//!
//! Choosing the contraction order, running witness searches and answering queries
//! all live elsewhere; this crate only makes the graph safe to contract and defines
//! what a shortcut is.

pub mod access_only;
pub mod connectivity;
pub mod edge;
pub mod error;
pub mod graph;

pub use access_only::{
    find_access_only_clusters, mark_implicitly_access_only_edges,
    stratify_marked_access_only_clusters, stratify_marked_and_implicit_access_only_clusters,
    AccessOnlyCluster,
};
pub use connectivity::nodes_not_bidirectionally_reachable;
pub use edge::{DirectedEdge, PLACEHOLDER_ID};
pub use error::{Error, Result};
pub use graph::{MapData, Node, NodeId};
