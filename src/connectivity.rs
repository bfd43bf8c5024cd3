//! Bidirectional reachability check
//!
//! Stratification preconditions require every node to be reachable from the start
//! node both forwards and backwards over the full edge set (access restrictions are
//! ignored here; this is pure connectivity). The usual fix for a non-empty result is
//! connectivity repair on the map data before preprocessing.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};

use rustc_hash::FxHashSet;

use crate::error::{Error, Result};
use crate::graph::{MapData, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forwards,
    Backwards,
}

/// Node ids that cannot be reached from `start` in both directions. Empty means the
/// graph satisfies the stratification precondition.
pub fn nodes_not_bidirectionally_reachable(
    map: &MapData,
    start: NodeId,
) -> Result<BTreeSet<NodeId>> {
    if !map.contains(start) {
        return Err(Error::UnknownNode(start));
    }
    let forwards = reachable_nodes(map, start, Direction::Forwards);
    let backwards = reachable_nodes(map, start, Direction::Backwards);

    Ok(map
        .node_ids()
        .filter(|id| !forwards.contains(id) || !backwards.contains(id))
        .collect())
}

fn reachable_nodes(map: &MapData, start: NodeId, direction: Direction) -> FxHashSet<NodeId> {
    let mut visited = FxHashSet::default();
    let mut frontier = BinaryHeap::new();
    frontier.push(Reverse(start));

    while let Some(Reverse(node_id)) = frontier.pop() {
        if !visited.insert(node_id) {
            continue;
        }
        let Some(node) = map.get(node_id) else {
            continue;
        };
        let neighbors: Box<dyn Iterator<Item = NodeId> + '_> = match direction {
            Direction::Forwards => Box::new(node.edges_from.iter().map(|e| e.to)),
            Direction::Backwards => Box::new(node.edges_to.iter().map(|e| e.from)),
        };
        for neighbor in neighbors {
            if !visited.contains(&neighbor) {
                frontier.push(Reverse(neighbor));
            }
        }
    }

    visited
}
