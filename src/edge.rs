//! Directed edges and shortcut composition
//!
//! A [`DirectedEdge`] is either a leaf edge loaded from map data or a shortcut built
//! by contraction from exactly two child edges. Shortcuts form a binary composition
//! tree whose leaves may be shared by many shortcuts, so edges are handed around as
//! `Arc<DirectedEdge>` and compared by pointer identity where object identity
//! matters (visited sets, structural removal).
//!
//! Everything on an edge is immutable after construction except the access-only
//! flag, which the implicit-access-only detector promotes in place on edges already
//! wired into the graph.

use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::graph::NodeId;

/// Id for edges that have not been assigned a real application id, e.g. trial
/// shortcuts probed during witness search. Placeholder edges cannot be ordered.
pub const PLACEHOLDER_ID: i64 = -123_456;

/// A directed edge of the routing graph.
///
/// Leaf edges have `first == second == None` and `contraction_depth == 0`.
/// Shortcuts have both children set and a depth one above the deeper child.
#[derive(Debug)]
pub struct DirectedEdge {
    pub edge_id: i64,
    pub from: NodeId,
    pub to: NodeId,
    pub drive_time_ms: u32,
    access_only: AtomicBool,

    // Contraction metadata
    pub first: Option<Arc<DirectedEdge>>,
    pub second: Option<Arc<DirectedEdge>>,
    pub contraction_depth: u32,
    // Concatenated leaf sequence, computed once at construction. Empty for leaves:
    // a leaf expands lazily to a singleton of itself (it cannot hold an Arc to
    // itself while being constructed).
    uncontracted: Vec<Arc<DirectedEdge>>,
}

impl DirectedEdge {
    /// Create a leaf edge.
    pub fn leaf(
        edge_id: i64,
        from: NodeId,
        to: NodeId,
        drive_time_ms: u32,
        access_only: bool,
    ) -> Result<Arc<DirectedEdge>> {
        check_edge_id(edge_id)?;
        Ok(Arc::new(DirectedEdge {
            edge_id,
            from,
            to,
            drive_time_ms,
            access_only: AtomicBool::new(access_only),
            first: None,
            second: None,
            contraction_depth: 0,
            uncontracted: Vec::new(),
        }))
    }

    /// Create a shortcut bypassing a contracted node, composed of exactly two
    /// child edges.
    ///
    /// Both children must be non-access-only: access-only subgraphs are stratified
    /// away before contraction, and a shortcut over one would leak a restricted
    /// road into through-routing. When both children carry positive application
    /// ids, `edge_id` must exceed both; a violation is an id-allocation bug in the
    /// caller and fails construction.
    pub fn shortcut(
        edge_id: i64,
        from: NodeId,
        to: NodeId,
        drive_time_ms: u32,
        first: Arc<DirectedEdge>,
        second: Arc<DirectedEdge>,
    ) -> Result<Arc<DirectedEdge>> {
        check_edge_id(edge_id)?;
        for child in [&first, &second] {
            if child.is_access_only() {
                return Err(Error::AccessOnlyChild(child.edge_id));
            }
        }
        if edge_id > 0 && (edge_id <= first.edge_id || edge_id <= second.edge_id) {
            // If this starts failing, shortcut ids probably start too low.
            return Err(Error::NonMonotonicShortcutId {
                edge_id,
                first: first.edge_id,
                second: second.edge_id,
            });
        }

        let contraction_depth = first.contraction_depth.max(second.contraction_depth) + 1;
        let mut uncontracted = first.uncontracted_edges();
        uncontracted.extend(second.uncontracted_edges());

        Ok(Arc::new(DirectedEdge {
            edge_id,
            from,
            to,
            drive_time_ms,
            access_only: AtomicBool::new(false),
            first: Some(first),
            second: Some(second),
            contraction_depth,
            uncontracted,
        }))
    }

    /// Re-id an edge without altering its topology, preserving drive time, the
    /// access-only flag and any children. Used when edge ids are renumbered.
    pub fn clone_with_edge_id(&self, edge_id: i64) -> Result<Arc<DirectedEdge>> {
        match (&self.first, &self.second) {
            (Some(first), Some(second)) => DirectedEdge::shortcut(
                edge_id,
                self.from,
                self.to,
                self.drive_time_ms,
                Arc::clone(first),
                Arc::clone(second),
            ),
            _ => DirectedEdge::leaf(
                edge_id,
                self.from,
                self.to,
                self.drive_time_ms,
                self.is_access_only(),
            ),
        }
    }

    pub fn is_shortcut(&self) -> bool {
        self.contraction_depth != 0
    }

    pub fn is_access_only(&self) -> bool {
        self.access_only.load(AtomicOrdering::Relaxed)
    }

    /// Promote this edge to access-only. Flags only ever move from false to true;
    /// nothing in the preprocessing pipeline clears one.
    pub fn mark_access_only(&self) {
        self.access_only.store(true, AtomicOrdering::Relaxed);
    }

    /// The ordered sequence of original leaf edges this edge stands for: the edge
    /// itself for a leaf, the left child's sequence then the right child's for a
    /// shortcut.
    pub fn uncontracted_edges(self: &Arc<DirectedEdge>) -> Vec<Arc<DirectedEdge>> {
        if self.is_shortcut() {
            self.uncontracted.clone()
        } else {
            vec![Arc::clone(self)]
        }
    }

    /// Total order by edge id, used to keep adjacency lists sorted.
    ///
    /// # Panics
    ///
    /// Panics if either edge carries [`PLACEHOLDER_ID`]: placeholder edges have no
    /// position in the id order and comparing one is a caller bug.
    pub fn compare_by_id(&self, other: &DirectedEdge) -> Ordering {
        assert!(
            self.edge_id != PLACEHOLDER_ID && other.edge_id != PLACEHOLDER_ID,
            "placeholder-id edges cannot be order-compared"
        );
        self.edge_id.cmp(&other.edge_id)
    }
}

fn check_edge_id(edge_id: i64) -> Result<()> {
    if edge_id > 0 || edge_id == PLACEHOLDER_ID {
        Ok(())
    } else {
        Err(Error::InvalidEdgeId(edge_id))
    }
}

impl fmt::Display for DirectedEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}--{}({})-->{}",
            self.from, self.drive_time_ms, self.contraction_depth, self.to
        )
    }
}
