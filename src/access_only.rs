//! Access-only cluster stratification
//!
//! Access-only roads are legal to drive when a trip starts or ends on them and
//! illegal as a through-route. Contraction cannot see that distinction, so before
//! any contraction happens this pass rewrites every access-only region of the graph
//! into three layers:
//!
//! - a start stratum, reachable only as the beginning of a trip, which exits into
//!   the real graph at the cluster's border nodes;
//! - an end stratum, reachable only from the real graph at the border, where a trip
//!   may finish;
//! - the untouched non-access-only border edges, which through-traffic keeps using.
//!
//! A route can therefore start or end inside the cluster but can never cut through
//! it, and afterwards not a single access-only edge remains in the graph.
//!
//! Edges that are not tagged access-only but can only be reached (or only left)
//! through access-only roads behave the same way in practice, so a detector pass
//! promotes them first, then the structural rewrite runs over the complete set.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};
use std::sync::Arc;

use rustc_hash::FxHashSet;
use tracing::{debug, info};

use crate::connectivity::{nodes_not_bidirectionally_reachable, Direction};
use crate::edge::DirectedEdge;
use crate::error::{Error, Result};
use crate::graph::{MapData, Node, NodeId};

/// Added to a cluster node's id to form its start-stratum clone id.
pub const ACCESS_ONLY_START_NODE_ID_PREFIX: i64 = 400_000_000_000_000_000;
/// Added to a cluster node's id to form its end-stratum clone id.
pub const ACCESS_ONLY_END_NODE_ID_PREFIX: i64 = 200_000_000_000_000_000;
/// First value of the shared counter that numbers every edge created by
/// stratification. Far above real map edge ids, and advanced monotonically so
/// shortcuts built over these edges later can satisfy the id-ordering invariant.
pub const INITIAL_NEW_EDGE_ID: i64 = 1_000_000_000;

/// Run the implicit-access-only detector, then stratify every access-only cluster.
///
/// The whole pass is all-or-nothing: it either completes, fails before mutating
/// anything (the reachability precondition), or panics on a broken container
/// contract. There is no partial-progress state worth resuming from.
pub fn stratify_marked_and_implicit_access_only_clusters(
    map: &mut MapData,
    start_node: NodeId,
) -> Result<()> {
    mark_implicitly_access_only_edges(map, start_node)?;
    stratify_marked_access_only_clusters(map)
}

/// Promote edges that, while not tagged access-only, can only be reached or only
/// be left via access-only edges.
///
/// Two explorations run from `start_node` over the currently non-access-only
/// edges, one forwards and one backwards. An edge seen by both is genuinely open;
/// an edge seen by one or neither is promoted. Flags only move from false to true.
///
/// Requires every node to be bidirectionally reachable from `start_node`, which
/// also means `start_node` itself must touch at least one non-access-only edge in
/// each direction; a start node interior to an access-only region is outside this
/// function's contract.
pub fn mark_implicitly_access_only_edges(map: &mut MapData, start_node: NodeId) -> Result<()> {
    let unreachable = nodes_not_bidirectionally_reachable(map, start_node)?;
    if !unreachable.is_empty() {
        return Err(Error::NotBidirectionallyConnected {
            start: start_node,
            missing: unreachable.len(),
        });
    }

    let accessible_forwards = accessible_edges_from(map, start_node, Direction::Forwards);
    let accessible_backwards = accessible_edges_from(map, start_node, Direction::Backwards);

    let mut promoted = 0usize;
    for node in map.nodes() {
        for edge in &node.edges_from {
            let key = edge_key(edge);
            if accessible_forwards.contains(&key) && accessible_backwards.contains(&key) {
                continue;
            }
            if !edge.is_access_only() {
                edge.mark_access_only();
                promoted += 1;
            }
        }
    }

    info!(promoted, "marked implicitly access-only edges");
    Ok(())
}

/// Stratify every cluster of nodes connected by access-only edges. All clusters
/// share one monotonic edge-id counter; ids are never reused across clusters.
pub fn stratify_marked_access_only_clusters(map: &mut MapData) -> Result<()> {
    let clusters = find_access_only_clusters(map);
    info!(clusters = clusters.len(), "stratifying access-only clusters");

    let edge_id_counter = AtomicI64::new(INITIAL_NEW_EDGE_ID);
    for cluster in &clusters {
        stratify_cluster(map, cluster, &edge_id_counter)?;
    }
    Ok(())
}

/// A maximal set of nodes connected to one another through access-only edges,
/// treating each directed edge as traversable both ways. Transient: built during
/// stratification and discarded once its cluster has been rewritten.
#[derive(Debug, Default)]
pub struct AccessOnlyCluster {
    pub nodes: BTreeSet<NodeId>,
}

/// Partition every node touching at least one access-only edge into maximal
/// clusters. Nodes without access-only edges are never placed in a cluster.
pub fn find_access_only_clusters(map: &MapData) -> Vec<AccessOnlyCluster> {
    let mut assigned: FxHashSet<NodeId> = FxHashSet::default();
    let mut clusters = Vec::new();

    for node in map.nodes() {
        if node.any_edges_access_only() && !assigned.contains(&node.node_id) {
            let cluster = identify_cluster(map, node.node_id);
            assigned.extend(cluster.nodes.iter().copied());
            clusters.push(cluster);
        }
    }

    clusters
}

/// Grow the cluster containing `start` by breadth-first traversal restricted to
/// access-only edges, followed in both directions. The frontier is ordered by node
/// id so traversal is repeatable.
fn identify_cluster(map: &MapData, start: NodeId) -> AccessOnlyCluster {
    let mut cluster = AccessOnlyCluster::default();
    let mut frontier = BinaryHeap::new();
    frontier.push(Reverse(start));

    while let Some(Reverse(node_id)) = frontier.pop() {
        if !cluster.nodes.insert(node_id) {
            continue;
        }
        let Some(node) = map.get(node_id) else {
            continue;
        };
        for edge in node.edges().filter(|e| e.is_access_only()) {
            if !cluster.nodes.contains(&edge.to) {
                frontier.push(Reverse(edge.to));
            }
            if !cluster.nodes.contains(&edge.from) {
                frontier.push(Reverse(edge.from));
            }
        }
    }

    cluster
}

/// Edges reachable from `start` in one direction, following only edges that are
/// currently non-access-only. Frontier ordering matches [`identify_cluster`].
fn accessible_edges_from(map: &MapData, start: NodeId, direction: Direction) -> FxHashSet<usize> {
    let mut result = FxHashSet::default();
    let mut visited: FxHashSet<NodeId> = FxHashSet::default();
    let mut frontier = BinaryHeap::new();
    frontier.push(Reverse(start));

    while let Some(Reverse(node_id)) = frontier.pop() {
        if !visited.insert(node_id) {
            continue;
        }
        let Some(node) = map.get(node_id) else {
            continue;
        };
        let to_follow = match direction {
            Direction::Forwards => &node.edges_from,
            Direction::Backwards => &node.edges_to,
        };
        for edge in to_follow {
            if edge.is_access_only() {
                continue;
            }
            result.insert(edge_key(edge));
            if !visited.contains(&edge.to) {
                frontier.push(Reverse(edge.to));
            }
            if !visited.contains(&edge.from) {
                frontier.push(Reverse(edge.from));
            }
        }
    }

    result
}

/// Identity key for an edge shared between two adjacency lists.
fn edge_key(edge: &Arc<DirectedEdge>) -> usize {
    Arc::as_ptr(edge) as usize
}

fn next_edge_id(counter: &AtomicI64) -> i64 {
    counter.fetch_add(1, AtomicOrdering::Relaxed) + 1
}

fn stratify_cluster(
    map: &mut MapData,
    cluster: &AccessOnlyCluster,
    edge_id_counter: &AtomicI64,
) -> Result<()> {
    let start_strata = clone_nodes_and_connections_adding_prefix(
        map,
        cluster,
        ACCESS_ONLY_START_NODE_ID_PREFIX,
        edge_id_counter,
    )?;
    let end_strata = clone_nodes_and_connections_adding_prefix(
        map,
        cluster,
        ACCESS_ONLY_END_NODE_ID_PREFIX,
        edge_id_counter,
    )?;
    let start_ids: Vec<NodeId> = start_strata.keys().copied().collect();
    let end_ids: Vec<NodeId> = end_strata.keys().copied().collect();

    map.add_all(start_strata.into_values());
    map.add_all(end_strata.into_values());

    link_borders_and_stratas(map, cluster, edge_id_counter)?;
    remove_access_only_edges_that_have_been_replaced(map, cluster);
    remove_access_only_nodes_that_have_been_replaced(map, cluster);

    map.sort_neighbor_lists(start_ids);
    map.sort_neighbor_lists(end_ids);
    map.sort_neighbor_lists(cluster.nodes.iter().copied());

    debug!(nodes = cluster.nodes.len(), "stratified cluster");
    Ok(())
}

/// Clone every cluster node under `node_id_prefix`, wiring clones of all edges
/// internal to the cluster between them. Cloned edges get fresh ids and are never
/// access-only; clones carry no barrier.
fn clone_nodes_and_connections_adding_prefix(
    map: &MapData,
    cluster: &AccessOnlyCluster,
    node_id_prefix: i64,
    edge_id_counter: &AtomicI64,
) -> Result<BTreeMap<NodeId, Node>> {
    let mut clones: BTreeMap<NodeId, Node> = BTreeMap::new();

    for &node_id in &cluster.nodes {
        let node = map.get(node_id).ok_or(Error::UnknownNode(node_id))?;
        clones.insert(
            node_id + node_id_prefix,
            Node::new(node_id + node_id_prefix, node.lat, node.lon, false),
        );
    }

    for &node_id in &cluster.nodes {
        let node = map.get(node_id).ok_or(Error::UnknownNode(node_id))?;
        for edge in &node.edges_from {
            if !cluster.nodes.contains(&edge.to) {
                continue;
            }
            let clone = DirectedEdge::leaf(
                next_edge_id(edge_id_counter),
                edge.from + node_id_prefix,
                edge.to + node_id_prefix,
                edge.drive_time_ms,
                false,
            )?;
            clones
                .get_mut(&clone.from)
                .ok_or(Error::UnknownNode(clone.from))?
                .edges_from
                .push(Arc::clone(&clone));
            clones
                .get_mut(&clone.to)
                .ok_or(Error::UnknownNode(clone.to))?
                .edges_to
                .push(clone);
        }
    }

    for node in clones.values_mut() {
        node.sort_neighbor_lists();
    }
    Ok(clones)
}

/// Tie each cluster node's clones into the live graph with zero-cost edges.
///
/// A node whose edges are all access-only is fully internal: its only legal use is
/// a trip that both starts and ends on access roads, so its start clone links
/// straight to its end clone. A border node touches the outside graph, so its
/// start clone exits into the original node and the original node feeds its end
/// clone.
fn link_borders_and_stratas(
    map: &mut MapData,
    cluster: &AccessOnlyCluster,
    edge_id_counter: &AtomicI64,
) -> Result<()> {
    for &node_id in &cluster.nodes {
        let start_clone = node_id + ACCESS_ONLY_START_NODE_ID_PREFIX;
        let end_clone = node_id + ACCESS_ONLY_END_NODE_ID_PREFIX;
        let fully_internal = map
            .get(node_id)
            .ok_or(Error::UnknownNode(node_id))?
            .all_edges_access_only();

        if fully_internal {
            map.add_leaf_edge(next_edge_id(edge_id_counter), start_clone, end_clone, 0, false)?;
        } else {
            map.add_leaf_edge(next_edge_id(edge_id_counter), start_clone, node_id, 0, false)?;
            map.add_leaf_edge(next_edge_id(edge_id_counter), node_id, end_clone, 0, false)?;
        }
    }
    Ok(())
}

/// Drop the access-only edges the strata clones have superseded. Cluster
/// maximality guarantees both endpoints of every such edge are in the cluster.
fn remove_access_only_edges_that_have_been_replaced(map: &mut MapData, cluster: &AccessOnlyCluster) {
    for &node_id in &cluster.nodes {
        let Some(node) = map.get(node_id) else {
            continue;
        };
        let to_remove: Vec<Arc<DirectedEdge>> = node
            .edges()
            .filter(|e| e.is_access_only())
            .map(Arc::clone)
            .collect();
        for edge in to_remove {
            map.detach_edge(&edge);
        }
    }
}

/// Remove cluster nodes left with no edges at all; they have been fully absorbed
/// into the strata.
fn remove_access_only_nodes_that_have_been_replaced(
    map: &mut MapData,
    cluster: &AccessOnlyCluster,
) {
    for &node_id in &cluster.nodes {
        if map.get(node_id).is_some_and(Node::has_no_edges) {
            map.remove_node_and_connected_edges(node_id);
        }
    }
}
