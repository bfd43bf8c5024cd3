//! End-to-end stratification tests
//!
//! These build small graphs the way the map loader would, run the full
//! preprocessing pass, and check routing-level consequences with a plain Dijkstra:
//! access-only roads must stay usable for trips that start or end on them and must
//! never win as a through-route.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use butterfly_stratify::access_only::{
    ACCESS_ONLY_END_NODE_ID_PREFIX, ACCESS_ONLY_START_NODE_ID_PREFIX,
};
use butterfly_stratify::{
    find_access_only_clusters, stratify_marked_and_implicit_access_only_clusters, DirectedEdge,
    MapData, Node, NodeId,
};

fn map_with_nodes(ids: &[NodeId]) -> MapData {
    let mut map = MapData::new();
    for &id in ids {
        map.add(Node::new(id, 52.0, 0.2, false));
    }
    map
}

fn two_way(map: &mut MapData, first_edge_id: i64, a: NodeId, b: NodeId, ms: u32, access_only: bool) {
    map.add_leaf_edge(first_edge_id, a, b, ms, access_only).unwrap();
    map.add_leaf_edge(first_edge_id + 1, b, a, ms, access_only).unwrap();
}

fn access_only_edge_count(map: &MapData) -> usize {
    map.nodes()
        .flat_map(|n| n.edges_from.iter())
        .filter(|e| e.is_access_only())
        .count()
}

/// Plain Dijkstra over the live graph, returning total drive time and the edges of
/// one shortest path.
fn dijkstra(map: &MapData, from: NodeId, to: NodeId) -> Option<(u64, Vec<Arc<DirectedEdge>>)> {
    let mut dist: HashMap<NodeId, u64> = HashMap::new();
    let mut prev: HashMap<NodeId, Arc<DirectedEdge>> = HashMap::new();
    let mut heap = BinaryHeap::new();
    dist.insert(from, 0);
    heap.push(Reverse((0u64, from)));

    while let Some(Reverse((cost, node_id))) = heap.pop() {
        if cost > *dist.get(&node_id).unwrap_or(&u64::MAX) {
            continue;
        }
        let Some(node) = map.get(node_id) else { continue };
        for edge in &node.edges_from {
            let next = cost + u64::from(edge.drive_time_ms);
            if next < *dist.get(&edge.to).unwrap_or(&u64::MAX) {
                dist.insert(edge.to, next);
                prev.insert(edge.to, Arc::clone(edge));
                heap.push(Reverse((next, edge.to)));
            }
        }
    }

    let total = *dist.get(&to)?;
    let mut path = Vec::new();
    let mut current = to;
    while current != from {
        let edge = Arc::clone(prev.get(&current)?);
        current = edge.from;
        path.push(edge);
    }
    path.reverse();
    Some((total, path))
}

fn is_strata_node(id: NodeId) -> bool {
    id >= ACCESS_ONLY_END_NODE_ID_PREFIX
}

/// A diamond where the tempting short side is an access-only pair: 1-2-4 is cheap
/// but restricted between 2 and 4, 1-3-4 is open.
fn diamond() -> MapData {
    let mut map = map_with_nodes(&[1, 2, 3, 4]);
    two_way(&mut map, 10, 1, 2, 100, false);
    two_way(&mut map, 20, 2, 4, 100, true);
    two_way(&mut map, 30, 1, 3, 1000, false);
    two_way(&mut map, 40, 3, 4, 1000, false);
    map
}

#[test]
fn through_route_never_uses_access_only_strata() {
    let mut map = diamond();
    stratify_marked_and_implicit_access_only_clusters(&mut map, 1).unwrap();

    assert_eq!(access_only_edge_count(&map), 0);
    // Both interior nodes were border nodes; each got its two zero-cost links
    for node_id in [2, 4] {
        let start_clone = node_id + ACCESS_ONLY_START_NODE_ID_PREFIX;
        let end_clone = node_id + ACCESS_ONLY_END_NODE_ID_PREFIX;
        let entries = map
            .get(start_clone)
            .unwrap()
            .edges_from
            .iter()
            .filter(|e| e.to == node_id && e.drive_time_ms == 0)
            .count();
        let exits = map
            .get(node_id)
            .unwrap()
            .edges_from
            .iter()
            .filter(|e| e.to == end_clone && e.drive_time_ms == 0)
            .count();
        assert_eq!((entries, exits), (1, 1), "bad strata links at node {node_id}");
    }

    // The restricted short side is gone, so the open long side wins
    let (cost, path) = dijkstra(&map, 1, 4).expect("4 must stay reachable");
    assert_eq!(cost, 2000);
    for edge in &path {
        assert!(edge.drive_time_ms > 0, "through-route used a strata link {edge}");
        assert!(!is_strata_node(edge.from) && !is_strata_node(edge.to));
    }
}

#[test]
fn trips_may_still_start_and_end_on_access_roads() {
    let mut map = diamond();
    stratify_marked_and_implicit_access_only_clusters(&mut map, 1).unwrap();

    // Start on the access road at 4: cross the start stratum, exit at border 2
    let start_clone = 4 + ACCESS_ONLY_START_NODE_ID_PREFIX;
    let (cost, _) = dijkstra(&map, start_clone, 1).expect("must be able to start at 4");
    assert_eq!(cost, 200);

    // End on the access road at 4: enter the end stratum at border 2
    let end_clone = 4 + ACCESS_ONLY_END_NODE_ID_PREFIX;
    let (cost, _) = dijkstra(&map, 1, end_clone).expect("must be able to end at 4");
    assert_eq!(cost, 200);

    // The end stratum is a dead end for through-traffic
    assert!(dijkstra(&map, end_clone, 1).is_none());
}

#[test]
fn isolated_node_is_left_alone() {
    let mut map = map_with_nodes(&[1, 2, 7]);
    two_way(&mut map, 10, 1, 2, 100, false);

    let clusters = find_access_only_clusters(&map);
    assert!(clusters.is_empty());

    // Stratification over the two connected nodes ignores 7 entirely
    map.remove_node_and_connected_edges(7);
    stratify_marked_and_implicit_access_only_clusters(&mut map, 1).unwrap();
    assert_eq!(map.len(), 2);
}

#[test]
fn random_graphs_cluster_into_a_partition() {
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for round in 0..20 {
        let n_nodes = rng.random_range(5..40i64);
        let mut map = map_with_nodes(&(1..=n_nodes).collect::<Vec<_>>());
        let n_edges = rng.random_range(0..80);
        let mut edge_id = 1;
        for _ in 0..n_edges {
            let a = rng.random_range(1..=n_nodes);
            let b = rng.random_range(1..=n_nodes);
            if a == b {
                continue;
            }
            map.add_leaf_edge(edge_id, a, b, 100, rng.random_bool(0.3)).unwrap();
            edge_id += 1;
        }

        let clusters = find_access_only_clusters(&map);

        let mut seen = HashMap::new();
        for (i, cluster) in clusters.iter().enumerate() {
            for &node_id in &cluster.nodes {
                assert!(
                    seen.insert(node_id, i).is_none(),
                    "round {round}: node {node_id} in two clusters"
                );
            }
        }
        for node in map.nodes() {
            assert_eq!(
                node.any_edges_access_only(),
                seen.contains_key(&node.node_id),
                "round {round}: wrong cluster coverage for node {}",
                node.node_id
            );
        }
        for node in map.nodes() {
            for edge in node.edges_from.iter().filter(|e| e.is_access_only()) {
                assert_eq!(
                    seen.get(&edge.from),
                    seen.get(&edge.to),
                    "round {round}: access-only edge {edge} spans clusters"
                );
            }
        }
    }
}

#[test]
fn random_connected_graphs_end_up_with_no_access_only_edges() {
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..10 {
        let n_nodes = rng.random_range(4..30i64);
        let mut map = map_with_nodes(&(1..=n_nodes).collect::<Vec<_>>());

        // Open two-way ring keeps everything bidirectionally reachable
        let mut edge_id = 1;
        for a in 1..=n_nodes {
            let b = a % n_nodes + 1;
            two_way(&mut map, edge_id, a, b, 100, false);
            edge_id += 2;
        }
        // Random chords, some restricted
        for _ in 0..rng.random_range(0..30) {
            let a = rng.random_range(1..=n_nodes);
            let b = rng.random_range(1..=n_nodes);
            if a == b {
                continue;
            }
            map.add_leaf_edge(edge_id, a, b, 100, rng.random_bool(0.5)).unwrap();
            edge_id += 1;
        }

        stratify_marked_and_implicit_access_only_clusters(&mut map, 1).unwrap();

        assert_eq!(access_only_edge_count(&map), 0);
        for node in map.nodes() {
            for list in [&node.edges_from, &node.edges_to] {
                let ids: Vec<i64> = list.iter().map(|e| e.edge_id).collect();
                let mut sorted = ids.clone();
                sorted.sort_unstable();
                assert_eq!(ids, sorted, "unsorted adjacency at node {}", node.node_id);
            }
        }
    }
}
