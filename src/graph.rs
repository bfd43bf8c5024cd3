//! Node and graph container
//!
//! [`MapData`] owns every node; edges live in `Arc`s pushed onto the adjacency
//! lists of their two endpoints. Adjacency lists are kept sorted by edge id, which
//! downstream contraction processing relies on; any code that batch-inserts or
//! removes edges re-sorts the touched lists before returning.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::edge::DirectedEdge;
use crate::error::{Error, Result};

pub type NodeId = i64;

#[derive(Debug)]
pub struct Node {
    pub node_id: NodeId,
    pub lat: f64,
    pub lon: f64,
    pub barrier: bool,
    pub edges_from: Vec<Arc<DirectedEdge>>,
    pub edges_to: Vec<Arc<DirectedEdge>>,
}

impl Node {
    pub fn new(node_id: NodeId, lat: f64, lon: f64, barrier: bool) -> Node {
        Node {
            node_id,
            lat,
            lon,
            barrier,
            edges_from: Vec::new(),
            edges_to: Vec::new(),
        }
    }

    /// Outgoing and incoming edges as one read-only pass, without copying either
    /// list.
    pub fn edges(&self) -> impl Iterator<Item = &Arc<DirectedEdge>> {
        self.edges_from.iter().chain(self.edges_to.iter())
    }

    pub fn any_edges_access_only(&self) -> bool {
        self.edges().any(|e| e.is_access_only())
    }

    pub fn all_edges_access_only(&self) -> bool {
        self.edges().all(|e| e.is_access_only())
    }

    pub fn has_no_edges(&self) -> bool {
        self.edges_from.is_empty() && self.edges_to.is_empty()
    }

    /// Restore the sorted-by-edge-id adjacency invariant after structural edits.
    pub fn sort_neighbor_lists(&mut self) {
        self.edges_from.sort_unstable_by(|a, b| a.compare_by_id(b));
        self.edges_to.sort_unstable_by(|a, b| a.compare_by_id(b));
    }
}

/// The shared mutable graph container. Node enumeration order is ascending node id
/// and is stable across runs.
#[derive(Debug, Default)]
pub struct MapData {
    nodes: BTreeMap<NodeId, Node>,
}

impl MapData {
    pub fn new() -> MapData {
        MapData::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    pub fn get(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    pub fn get_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Insert a node.
    ///
    /// # Panics
    ///
    /// Panics on a duplicate node id. Ids are the container's identity contract;
    /// a collision means two distinct nodes claim the same identity (e.g. a cluster
    /// node cloned twice) and there is no way to continue.
    pub fn add(&mut self, node: Node) {
        let node_id = node.node_id;
        let previous = self.nodes.insert(node_id, node);
        assert!(previous.is_none(), "duplicate node id {node_id}");
    }

    pub fn add_all(&mut self, nodes: impl IntoIterator<Item = Node>) {
        for node in nodes {
            self.add(node);
        }
    }

    /// Wire an already-constructed edge into the adjacency lists of both its
    /// endpoints. The touched lists are left unsorted; callers re-sort after the
    /// batch they are applying.
    pub fn attach_edge(&mut self, edge: &Arc<DirectedEdge>) -> Result<()> {
        // Check both endpoints before touching either list so a failure never
        // leaves the edge half-attached.
        if !self.contains(edge.from) {
            return Err(Error::UnknownNode(edge.from));
        }
        if !self.contains(edge.to) {
            return Err(Error::UnknownNode(edge.to));
        }
        self.nodes
            .get_mut(&edge.from)
            .ok_or(Error::UnknownNode(edge.from))?
            .edges_from
            .push(Arc::clone(edge));
        self.nodes
            .get_mut(&edge.to)
            .ok_or(Error::UnknownNode(edge.to))?
            .edges_to
            .push(Arc::clone(edge));
        Ok(())
    }

    /// Build a leaf edge and wire it in, in one step.
    pub fn add_leaf_edge(
        &mut self,
        edge_id: i64,
        from: NodeId,
        to: NodeId,
        drive_time_ms: u32,
        access_only: bool,
    ) -> Result<Arc<DirectedEdge>> {
        let edge = DirectedEdge::leaf(edge_id, from, to, drive_time_ms, access_only)?;
        self.attach_edge(&edge)?;
        Ok(edge)
    }

    /// Unwire an edge from the adjacency lists of both its endpoints, by identity.
    pub fn detach_edge(&mut self, edge: &Arc<DirectedEdge>) {
        if let Some(from) = self.nodes.get_mut(&edge.from) {
            from.edges_from.retain(|e| !Arc::ptr_eq(e, edge));
        }
        if let Some(to) = self.nodes.get_mut(&edge.to) {
            to.edges_to.retain(|e| !Arc::ptr_eq(e, edge));
        }
    }

    /// Remove a node and unwire every edge touching it from the rest of the graph.
    pub fn remove_node_and_connected_edges(&mut self, node_id: NodeId) {
        let Some(node) = self.nodes.remove(&node_id) else {
            return;
        };
        for edge in node.edges_from {
            if let Some(to) = self.nodes.get_mut(&edge.to) {
                to.edges_to.retain(|e| !Arc::ptr_eq(e, &edge));
            }
        }
        for edge in node.edges_to {
            if let Some(from) = self.nodes.get_mut(&edge.from) {
                from.edges_from.retain(|e| !Arc::ptr_eq(e, &edge));
            }
        }
    }

    /// Re-sort the adjacency lists of the given nodes. Ids without a live node are
    /// skipped (the node may have been absorbed by an earlier removal).
    pub fn sort_neighbor_lists(&mut self, node_ids: impl IntoIterator<Item = NodeId>) {
        for node_id in node_ids {
            if let Some(node) = self.nodes.get_mut(&node_id) {
                node.sort_neighbor_lists();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_with_nodes(ids: &[NodeId]) -> MapData {
        let mut map = MapData::new();
        for &id in ids {
            map.add(Node::new(id, 52.0, 0.2, false));
        }
        map
    }

    #[test]
    fn nodes_enumerate_in_id_order() {
        let map = map_with_nodes(&[30, 10, 20]);
        let ids: Vec<NodeId> = map.node_ids().collect();
        assert_eq!(ids, vec![10, 20, 30]);
    }

    #[test]
    #[should_panic(expected = "duplicate node id 10")]
    fn duplicate_node_id_panics() {
        let mut map = map_with_nodes(&[10]);
        map.add(Node::new(10, 52.0, 0.2, false));
    }

    #[test]
    fn attach_edge_requires_both_endpoints() {
        let mut map = map_with_nodes(&[10]);
        let result = map.add_leaf_edge(1, 10, 99, 1000, false);
        assert!(matches!(result, Err(Error::UnknownNode(99))));
    }

    #[test]
    fn attached_edge_appears_in_both_lists() {
        let mut map = map_with_nodes(&[10, 11]);
        let edge = map.add_leaf_edge(1, 10, 11, 1000, false).unwrap();
        assert!(Arc::ptr_eq(&map.get(10).unwrap().edges_from[0], &edge));
        assert!(Arc::ptr_eq(&map.get(11).unwrap().edges_to[0], &edge));
    }

    #[test]
    fn detach_edge_removes_by_identity() {
        let mut map = map_with_nodes(&[10, 11]);
        let edge = map.add_leaf_edge(1, 10, 11, 1000, false).unwrap();
        map.detach_edge(&edge);
        assert!(map.get(10).unwrap().has_no_edges());
        assert!(map.get(11).unwrap().has_no_edges());
    }

    #[test]
    fn removing_a_node_unwires_its_edges() {
        let mut map = map_with_nodes(&[10, 11, 12]);
        map.add_leaf_edge(1, 10, 11, 1000, false).unwrap();
        map.add_leaf_edge(2, 11, 12, 1000, false).unwrap();
        map.remove_node_and_connected_edges(11);
        assert!(!map.contains(11));
        assert!(map.get(10).unwrap().has_no_edges());
        assert!(map.get(12).unwrap().has_no_edges());
    }

    #[test]
    fn sort_neighbor_lists_restores_id_order() {
        let mut map = map_with_nodes(&[10, 11]);
        map.add_leaf_edge(5, 10, 11, 1000, false).unwrap();
        map.add_leaf_edge(2, 10, 11, 1000, false).unwrap();
        map.sort_neighbor_lists([10, 11]);
        let ids: Vec<i64> = map
            .get(10)
            .unwrap()
            .edges_from
            .iter()
            .map(|e| e.edge_id)
            .collect();
        assert_eq!(ids, vec![2, 5]);
    }

    #[test]
    fn access_only_node_predicates() {
        let mut map = map_with_nodes(&[10, 11, 12]);
        map.add_leaf_edge(1, 10, 11, 1000, true).unwrap();
        map.add_leaf_edge(2, 11, 12, 1000, false).unwrap();
        assert!(map.get(10).unwrap().all_edges_access_only());
        assert!(map.get(11).unwrap().any_edges_access_only());
        assert!(!map.get(11).unwrap().all_edges_access_only());
        assert!(!map.get(12).unwrap().any_edges_access_only());
    }
}
