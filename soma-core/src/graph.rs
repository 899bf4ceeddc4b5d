//! The part graph — typed, undirected connection edges between parts.
//!
//! Nodes are [`PartId`]s; the parts themselves live in the owning soma's
//! arena. Each undirected edge is stored in both adjacency lists and carries
//! a [`ConnectionKind`] and a `connection_integrity` in `[0, 1]`. At most
//! one edge of a given kind exists between a pair of parts.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SomaError};
use crate::types::{ConnectionKind, PartId};

/// One directed half of an undirected connection edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// The part at the other end.
    pub to: PartId,
    /// Connection type.
    pub kind: ConnectionKind,
    /// How sound the connection is, in `[0, 1]`.
    pub integrity: f32,
}

/// Adjacency structure over the parts of one soma.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartGraph {
    adjacency: HashMap<PartId, Vec<Edge>>,
}

impl PartGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node with no edges (no-op if present).
    pub fn insert_node(&mut self, id: PartId) {
        self.adjacency.entry(id).or_default();
    }

    /// Remove a node and every edge touching it.
    pub fn remove_node(&mut self, id: PartId) {
        if self.adjacency.remove(&id).is_some() {
            for edges in self.adjacency.values_mut() {
                edges.retain(|e| e.to != id);
            }
        }
    }

    /// Whether the node is in the graph.
    #[must_use]
    pub fn contains(&self, id: PartId) -> bool {
        self.adjacency.contains_key(&id)
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Iterate over node ids.
    pub fn nodes(&self) -> impl Iterator<Item = PartId> + '_ {
        self.adjacency.keys().copied()
    }

    /// Iterate over the edges leaving a node.
    pub fn neighbors(&self, id: PartId) -> impl Iterator<Item = &Edge> {
        self.adjacency.get(&id).into_iter().flatten()
    }

    /// Connect two existing nodes with an edge of the given kind.
    ///
    /// Returns `Ok(false)` if an edge of that kind already exists between
    /// the pair — the duplicate is not inserted.
    ///
    /// # Errors
    /// [`SomaError::PartNotFound`] if either node is absent;
    /// [`SomaError::IntegrityOutOfRange`] for an integrity outside `[0, 1]`.
    pub fn connect(
        &mut self,
        a: PartId,
        b: PartId,
        kind: ConnectionKind,
        integrity: f32,
    ) -> Result<bool> {
        if !self.contains(a) {
            return Err(SomaError::PartNotFound(a));
        }
        if !self.contains(b) {
            return Err(SomaError::PartNotFound(b));
        }
        if !(0.0..=1.0).contains(&integrity) {
            return Err(SomaError::IntegrityOutOfRange(integrity));
        }
        // Self-loops and duplicate kinds fail softly.
        if a == b || self.edge_kind_exists(a, b, &kind) {
            return Ok(false);
        }
        if let Some(edges) = self.adjacency.get_mut(&a) {
            edges.push(Edge {
                to: b,
                kind: kind.clone(),
                integrity,
            });
        }
        if let Some(edges) = self.adjacency.get_mut(&b) {
            edges.push(Edge {
                to: a,
                kind,
                integrity,
            });
        }
        Ok(true)
    }

    /// Remove every edge between two nodes, returning how many undirected
    /// edges were cut.
    pub fn disconnect_all(&mut self, a: PartId, b: PartId) -> usize {
        let mut removed = 0;
        if let Some(edges) = self.adjacency.get_mut(&a) {
            let before = edges.len();
            edges.retain(|e| e.to != b);
            removed = before - edges.len();
        }
        if let Some(edges) = self.adjacency.get_mut(&b) {
            edges.retain(|e| e.to != a);
        }
        removed
    }

    /// Whether any edge exists between the pair.
    #[must_use]
    pub fn has_edge(&self, a: PartId, b: PartId) -> bool {
        self.neighbors(a).any(|e| e.to == b)
    }

    /// Whether an attachment edge (`Joined`/`Merged`) exists between the pair.
    #[must_use]
    pub fn has_attachment(&self, a: PartId, b: PartId) -> bool {
        self.neighbors(a)
            .any(|e| e.to == b && e.kind.is_attachment())
    }

    fn edge_kind_exists(&self, a: PartId, b: PartId, kind: &ConnectionKind) -> bool {
        self.neighbors(a).any(|e| e.to == b && e.kind == *kind)
    }

    /// Update the integrity of the edge of the given kind between a pair.
    ///
    /// # Errors
    /// [`SomaError::IntegrityOutOfRange`] for a value outside `[0, 1]`;
    /// [`SomaError::NoSharedEdge`] if no such edge exists.
    pub fn set_integrity(
        &mut self,
        a: PartId,
        b: PartId,
        kind: &ConnectionKind,
        integrity: f32,
    ) -> Result<()> {
        if !(0.0..=1.0).contains(&integrity) {
            return Err(SomaError::IntegrityOutOfRange(integrity));
        }
        if !self.edge_kind_exists(a, b, kind) {
            return Err(SomaError::NoSharedEdge { a, b });
        }
        for (from, to) in [(a, b), (b, a)] {
            if let Some(edges) = self.adjacency.get_mut(&from) {
                for edge in edges.iter_mut().filter(|e| e.to == to && e.kind == *kind) {
                    edge.integrity = integrity;
                }
            }
        }
        Ok(())
    }

    /// Read the integrity of the edge of the given kind between a pair.
    #[must_use]
    pub fn integrity(&self, a: PartId, b: PartId, kind: &ConnectionKind) -> Option<f32> {
        self.neighbors(a)
            .find(|e| e.to == b && e.kind == *kind)
            .map(|e| e.integrity)
    }

    /// BFS-reachable set from `start`.
    ///
    /// With `attachment_only`, only `Joined`/`Merged` edges are walked —
    /// this is the contiguity relation. Otherwise every connection kind
    /// counts, which is the relation severance and cascades partition over.
    #[must_use]
    pub fn reachable(&self, start: PartId, attachment_only: bool) -> HashSet<PartId> {
        let mut seen = HashSet::new();
        if !self.contains(start) {
            return seen;
        }
        let mut queue = VecDeque::from([start]);
        seen.insert(start);
        while let Some(id) = queue.pop_front() {
            for edge in self.neighbors(id) {
                if attachment_only && !edge.kind.is_attachment() {
                    continue;
                }
                if seen.insert(edge.to) {
                    queue.push_back(edge.to);
                }
            }
        }
        seen
    }

    /// Partition all nodes into connected components over every edge kind.
    #[must_use]
    pub fn components(&self) -> Vec<HashSet<PartId>> {
        let mut assigned: HashSet<PartId> = HashSet::new();
        let mut components = Vec::new();
        // Deterministic walk order so component anchors are stable.
        let mut ids: Vec<PartId> = self.adjacency.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            if assigned.contains(&id) {
                continue;
            }
            let component = self.reachable(id, false);
            assigned.extend(component.iter().copied());
            components.push(component);
        }
        components
    }

    /// Whether the graph is one connected component (or empty).
    #[must_use]
    pub fn is_single_component(&self) -> bool {
        self.components().len() <= 1
    }

    /// Collect the undirected edges whose endpoints both lie in `parts`,
    /// each reported once.
    #[must_use]
    pub fn edges_within(&self, parts: &HashSet<PartId>) -> Vec<(PartId, Edge)> {
        let mut edges = Vec::new();
        for &id in parts {
            for edge in self.neighbors(id) {
                if id < edge.to && parts.contains(&edge.to) {
                    edges.push((id, edge.clone()));
                }
            }
        }
        edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(n: usize) -> (PartGraph, Vec<PartId>) {
        let mut graph = PartGraph::new();
        let ids: Vec<PartId> = (0..n).map(|_| PartId::new()).collect();
        for &id in &ids {
            graph.insert_node(id);
        }
        for pair in ids.windows(2) {
            graph
                .connect(pair[0], pair[1], ConnectionKind::Joined, 1.0)
                .expect("connect");
        }
        (graph, ids)
    }

    #[test]
    fn duplicate_kind_is_rejected() {
        let (mut graph, ids) = chain(2);
        let inserted = graph
            .connect(ids[0], ids[1], ConnectionKind::Joined, 1.0)
            .expect("connect");
        assert!(!inserted);
        // A different kind between the same pair is fine.
        let inserted = graph
            .connect(ids[0], ids[1], ConnectionKind::Holding, 1.0)
            .expect("connect");
        assert!(inserted);
    }

    #[test]
    fn connect_to_missing_node_errors() {
        let (mut graph, ids) = chain(2);
        let ghost = PartId::new();
        assert!(matches!(
            graph.connect(ids[0], ghost, ConnectionKind::Joined, 1.0),
            Err(SomaError::PartNotFound(_))
        ));
    }

    #[test]
    fn integrity_is_validated() {
        let (mut graph, ids) = chain(2);
        assert!(matches!(
            graph.connect(ids[0], ids[1], ConnectionKind::Merged, 1.5),
            Err(SomaError::IntegrityOutOfRange(_))
        ));
        assert!(matches!(
            graph.set_integrity(ids[0], ids[1], &ConnectionKind::Joined, -0.1),
            Err(SomaError::IntegrityOutOfRange(_))
        ));
        graph
            .set_integrity(ids[0], ids[1], &ConnectionKind::Joined, 0.4)
            .expect("set");
        assert_eq!(
            graph.integrity(ids[0], ids[1], &ConnectionKind::Joined),
            Some(0.4)
        );
        // Mirror half sees the same value.
        assert_eq!(
            graph.integrity(ids[1], ids[0], &ConnectionKind::Joined),
            Some(0.4)
        );
    }

    #[test]
    fn reachability_walks_the_chain() {
        let (graph, ids) = chain(4);
        let reach = graph.reachable(ids[0], true);
        assert_eq!(reach.len(), 4);
    }

    #[test]
    fn attachment_only_skips_holding_edges() {
        let mut graph = PartGraph::new();
        let a = PartId::new();
        let b = PartId::new();
        graph.insert_node(a);
        graph.insert_node(b);
        graph
            .connect(a, b, ConnectionKind::Holding, 1.0)
            .expect("connect");

        assert_eq!(graph.reachable(a, true).len(), 1);
        assert_eq!(graph.reachable(a, false).len(), 2);
    }

    #[test]
    fn disconnect_splits_components() {
        let (mut graph, ids) = chain(4);
        assert!(graph.is_single_component());
        let removed = graph.disconnect_all(ids[1], ids[2]);
        assert_eq!(removed, 1);
        let components = graph.components();
        assert_eq!(components.len(), 2);
    }

    #[test]
    fn remove_node_strips_mirror_edges() {
        let (mut graph, ids) = chain(3);
        graph.remove_node(ids[1]);
        assert!(!graph.has_edge(ids[0], ids[1]));
        assert!(graph.neighbors(ids[0]).next().is_none());
        assert_eq!(graph.components().len(), 2);
    }

    #[test]
    fn edges_within_reports_each_edge_once() {
        let (graph, ids) = chain(3);
        let set: HashSet<PartId> = ids.iter().copied().collect();
        assert_eq!(graph.edges_within(&set).len(), 2);
        let partial: HashSet<PartId> = ids[..2].iter().copied().collect();
        assert_eq!(graph.edges_within(&partial).len(), 1);
    }
}
