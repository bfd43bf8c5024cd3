//! Error types for graph preprocessing
//!
//! Every variant is a contract violation surfaced to the caller; nothing here is
//! retried or recovered locally. The only variant a caller is expected to handle is
//! [`Error::NotBidirectionallyConnected`], by running connectivity repair before
//! invoking stratification again.

use crate::graph::NodeId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The stratification precondition failed: some nodes cannot be reached from the
    /// start node in both directions.
    #[error(
        "implicit access-only marking requires a graph where every node is \
         bidirectionally reachable from the start node; {missing} nodes are not \
         reachable from node {start}"
    )]
    NotBidirectionallyConnected { start: NodeId, missing: usize },

    /// A node id was referenced that is not present in the container.
    #[error("node {0} is not in the graph")]
    UnknownNode(NodeId),

    /// An edge id that is neither positive nor the reserved placeholder.
    #[error("edge id {0} must be positive or the placeholder")]
    InvalidEdgeId(i64),

    /// A shortcut was assigned an id that does not exceed both child ids. This
    /// signals an id-allocation bug in the contraction code, not bad map data:
    /// shortcut ids probably start too low.
    #[error("shortcut id {edge_id} must exceed both child edge ids {first} and {second}")]
    NonMonotonicShortcutId { edge_id: i64, first: i64, second: i64 },

    /// A shortcut was built over an access-only child. Access-only clusters must be
    /// stratified away before any contraction happens.
    #[error("edge {0} is access-only and cannot be contracted into a shortcut")]
    AccessOnlyChild(i64),
}
