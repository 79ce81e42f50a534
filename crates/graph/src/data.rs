//! In-memory node and edge tables.
//!
//! Nodes and edges live in arenas indexed by their dense id. Deleted slots
//! stay as tombstones so ids are never reused. Adjacency is kept per
//! (node, edge type, direction) and labels are indexed per label.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::model::{Direction, Edge, EdgeId, EdgeProps, Label, LabelSet, NodeId, NodeProps, RelType};

/// A stored node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct NodeSlot {
    pub(crate) labels: LabelSet,
    pub(crate) props: NodeProps,
}

/// A stored edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct EdgeSlot {
    pub(crate) start: NodeId,
    pub(crate) end: NodeId,
    pub(crate) rel: RelType,
    pub(crate) props: EdgeProps,
}

type AdjacencyKey = (NodeId, RelType, Direction);

#[derive(Debug, Default)]
pub(crate) struct GraphData {
    nodes: Vec<Option<NodeSlot>>,
    edges: Vec<Option<EdgeSlot>>,
    adjacency: HashMap<AdjacencyKey, BTreeSet<EdgeId>>,
    by_label: HashMap<Label, BTreeSet<NodeId>>,
    live_nodes: usize,
    live_edges: usize,
}

impl GraphData {
    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    pub(crate) fn next_node_id(&self) -> NodeId {
        NodeId::new(self.nodes.len() as u64)
    }

    pub(crate) fn next_edge_id(&self) -> EdgeId {
        EdgeId::new(self.edges.len() as u64)
    }

    /// Grows both tables with tombstones up to the given id counters.
    pub(crate) fn pad(&mut self, next_node: u64, next_edge: u64) {
        let (nodes, edges) = (next_node as usize, next_edge as usize);
        if self.nodes.len() < nodes {
            self.nodes.resize(nodes, None);
        }
        if self.edges.len() < edges {
            self.edges.resize(edges, None);
        }
    }

    pub(crate) fn insert_node(&mut self, slot: NodeSlot) -> NodeId {
        let id = self.next_node_id();
        self.nodes.push(None);
        self.restore_node(id, slot);
        id
    }

    /// Puts `slot` at `id`, growing the table with tombstones if needed.
    pub(crate) fn restore_node(&mut self, id: NodeId, slot: NodeSlot) {
        if self.nodes.len() <= id.slot() {
            self.nodes.resize(id.slot() + 1, None);
        }
        for label in slot.labels.iter() {
            self.by_label.entry(label).or_default().insert(id);
        }
        if self.nodes[id.slot()].replace(slot).is_none() {
            self.live_nodes += 1;
        }
    }

    /// Removes the node. Incident edges must have been removed first.
    pub(crate) fn remove_node(&mut self, id: NodeId) -> Option<NodeSlot> {
        let slot = self.nodes.get_mut(id.slot())?.take()?;
        for label in slot.labels.iter() {
            if let Some(set) = self.by_label.get_mut(&label) {
                set.remove(&id);
            }
        }
        self.live_nodes -= 1;
        Some(slot)
    }


    pub(crate) fn node(&self, id: NodeId) -> Option<&NodeSlot> {
        self.nodes.get(id.slot()).and_then(Option::as_ref)
    }

    pub(crate) fn contains_node(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Replaces the labels, returning the previous set.
    pub(crate) fn set_labels(&mut self, id: NodeId, labels: LabelSet) -> Option<LabelSet> {
        let slot = self.nodes.get_mut(id.slot())?.as_mut()?;
        let old = std::mem::replace(&mut slot.labels, labels);
        for label in old.difference(labels).iter() {
            if let Some(set) = self.by_label.get_mut(&label) {
                set.remove(&id);
            }
        }
        for label in labels.difference(old).iter() {
            self.by_label.entry(label).or_default().insert(id);
        }
        Some(old)
    }

    /// Replaces the properties, returning the previous ones.
    pub(crate) fn set_props(&mut self, id: NodeId, props: NodeProps) -> Option<NodeProps> {
        let slot = self.nodes.get_mut(id.slot())?.as_mut()?;
        Some(std::mem::replace(&mut slot.props, props))
    }

    pub(crate) fn nodes_with_label(&self, label: Label) -> Vec<NodeId> {
        self.by_label.get(&label).map(|s| s.iter().copied().collect()).unwrap_or_default()
    }

    pub(crate) fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| NodeId::new(i as u64))
    }

    pub(crate) fn node_count(&self) -> usize {
        self.live_nodes
    }

    // ------------------------------------------------------------------
    // Edges
    // ------------------------------------------------------------------

    pub(crate) fn insert_edge(&mut self, slot: EdgeSlot) -> EdgeId {
        let id = self.next_edge_id();
        self.edges.push(None);
        self.restore_edge(id, slot);
        id
    }

    pub(crate) fn restore_edge(&mut self, id: EdgeId, slot: EdgeSlot) {
        if self.edges.len() <= id.slot() {
            self.edges.resize(id.slot() + 1, None);
        }
        self.adjacency.entry((slot.start, slot.rel, Direction::Outgoing)).or_default().insert(id);
        self.adjacency.entry((slot.end, slot.rel, Direction::Incoming)).or_default().insert(id);
        if self.edges[id.slot()].replace(slot).is_none() {
            self.live_edges += 1;
        }
    }

    pub(crate) fn remove_edge(&mut self, id: EdgeId) -> Option<EdgeSlot> {
        let slot = self.edges.get_mut(id.slot())?.take()?;
        for key in
            [(slot.start, slot.rel, Direction::Outgoing), (slot.end, slot.rel, Direction::Incoming)]
        {
            if let Some(set) = self.adjacency.get_mut(&key) {
                set.remove(&id);
                if set.is_empty() {
                    self.adjacency.remove(&key);
                }
            }
        }
        self.live_edges -= 1;
        Some(slot)
    }

    /// Replaces the edge properties, returning the previous ones.
    pub(crate) fn set_edge_props(&mut self, id: EdgeId, props: EdgeProps) -> Option<EdgeProps> {
        let slot = self.edges.get_mut(id.slot())?.as_mut()?;
        Some(std::mem::replace(&mut slot.props, props))
    }

    pub(crate) fn edge_slot(&self, id: EdgeId) -> Option<&EdgeSlot> {
        self.edges.get(id.slot()).and_then(Option::as_ref)
    }

    pub(crate) fn edge(&self, id: EdgeId) -> Option<Edge> {
        self.edge_slot(id).map(|slot| Edge {
            id,
            start: slot.start,
            end: slot.end,
            rel: slot.rel,
            props: slot.props.clone(),
        })
    }

    /// Edges of type `rel` at `node`, in id order. A self-loop is listed once.
    pub(crate) fn edges(&self, node: NodeId, rel: RelType, direction: Direction) -> Vec<EdgeId> {
        match direction {
            Direction::Both => {
                let mut all: BTreeSet<EdgeId> = BTreeSet::new();
                for dir in [Direction::Outgoing, Direction::Incoming] {
                    if let Some(set) = self.adjacency.get(&(node, rel, dir)) {
                        all.extend(set.iter().copied());
                    }
                }
                all.into_iter().collect()
            },
            dir => self
                .adjacency
                .get(&(node, rel, dir))
                .map(|s| s.iter().copied().collect())
                .unwrap_or_default(),
        }
    }

    pub(crate) fn degree(&self, node: NodeId, rel: RelType, direction: Direction) -> usize {
        match direction {
            Direction::Both => self.edges(node, rel, direction).len(),
            dir => self.adjacency.get(&(node, rel, dir)).map_or(0, BTreeSet::len),
        }
    }

    /// Every edge touching `node`, any type, in id order.
    pub(crate) fn incident_edges(&self, node: NodeId) -> Vec<EdgeId> {
        let mut all = BTreeSet::new();
        for rel in RelType::ALL {
            for dir in [Direction::Outgoing, Direction::Incoming] {
                if let Some(set) = self.adjacency.get(&(node, rel, dir)) {
                    all.extend(set.iter().copied());
                }
            }
        }
        all.into_iter().collect()
    }

    pub(crate) fn edge_ids(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.edges
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| EdgeId::new(i as u64))
    }

    pub(crate) fn edges_of_type(&self, rel: RelType) -> Vec<EdgeId> {
        self.edges
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.as_ref().is_some_and(|s| s.rel == rel))
            .map(|(i, _)| EdgeId::new(i as u64))
            .collect()
    }

    pub(crate) fn edge_count(&self) -> usize {
        self.live_edges
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;

    fn node(label: Label, id: &str) -> NodeSlot {
        NodeSlot { labels: LabelSet::of(label), props: NodeProps::with_id(id) }
    }

    fn edge(start: NodeId, end: NodeId, rel: RelType) -> EdgeSlot {
        EdgeSlot { start, end, rel, props: EdgeProps::default() }
    }

    #[test]
    fn test_adjacency_per_type_and_direction() {
        let mut g = GraphData::default();
        let a = g.insert_node(node(Label::Taxon, "a"));
        let b = g.insert_node(node(Label::Taxon, "b"));
        let e = g.insert_edge(edge(a, b, RelType::ParentOf));

        assert_eq!(g.edges(a, RelType::ParentOf, Direction::Outgoing), [e]);
        assert_eq!(g.edges(b, RelType::ParentOf, Direction::Incoming), [e]);
        assert!(g.edges(a, RelType::ParentOf, Direction::Incoming).is_empty());
        assert!(g.edges(a, RelType::SynonymOf, Direction::Outgoing).is_empty());
        assert_eq!(g.incident_edges(b), [e]);
    }

    #[test]
    fn test_self_loop_listed_once() {
        let mut g = GraphData::default();
        let a = g.insert_node(node(Label::Name, "a"));
        let e = g.insert_edge(edge(a, a, RelType::HasBasionym));
        assert_eq!(g.edges(a, RelType::HasBasionym, Direction::Both), [e]);
        assert_eq!(g.degree(a, RelType::HasBasionym, Direction::Both), 1);
        assert_eq!(g.degree(a, RelType::HasBasionym, Direction::Outgoing), 1);
    }

    #[test]
    fn test_incident_edges_cover_every_type_and_direction() {
        let mut g = GraphData::default();
        let a = g.insert_node(node(Label::Taxon, "a"));
        let b = g.insert_node(node(Label::Taxon, "b"));
        let n = g.insert_node(node(Label::Name, "n"));
        let child = g.insert_edge(edge(a, b, RelType::ParentOf));
        let synonym = g.insert_edge(edge(b, a, RelType::SynonymOf));
        let name = g.insert_edge(edge(a, n, RelType::HasName));
        let interaction = g.insert_edge(edge(a, a, RelType::SpeciesInteraction));

        assert_eq!(g.incident_edges(a), [child, synonym, name, interaction]);
        assert_eq!(g.incident_edges(n), [name]);
        assert_eq!(g.incident_edges(b), [child, synonym]);
    }

    #[test]
    fn test_label_index_follows_changes() {
        let mut g = GraphData::default();
        let a = g.insert_node(node(Label::Taxon, "a"));
        assert_eq!(g.nodes_with_label(Label::Taxon), [a]);

        let old = g.set_labels(a, LabelSet::of(Label::Synonym)).unwrap();
        assert_eq!(old, LabelSet::of(Label::Taxon));
        assert!(g.nodes_with_label(Label::Taxon).is_empty());
        assert_eq!(g.nodes_with_label(Label::Synonym), [a]);

        g.remove_node(a);
        assert!(g.nodes_with_label(Label::Synonym).is_empty());
        assert_eq!(g.node_count(), 0);
    }

    #[test]
    fn test_tombstones_keep_ids_stable() {
        let mut g = GraphData::default();
        let a = g.insert_node(node(Label::Name, "a"));
        let b = g.insert_node(node(Label::Name, "b"));
        g.remove_node(a);
        let c = g.insert_node(node(Label::Name, "c"));
        assert_eq!(c, NodeId::new(2));
        assert_eq!(g.node_ids().collect::<Vec<_>>(), [b, c]);
    }

    #[test]
    fn test_removed_trailing_node_id_is_not_reused() {
        let mut g = GraphData::default();
        g.insert_node(node(Label::Name, "a"));
        let b = g.insert_node(node(Label::Name, "b"));
        g.remove_node(b);
        let c = g.insert_node(node(Label::Name, "c"));
        assert_eq!(c, NodeId::new(2));
        assert_eq!(g.node_count(), 2);
        assert!(g.node(b).is_none());
    }

    #[test]
    fn test_remove_edge_clears_adjacency() {
        let mut g = GraphData::default();
        let a = g.insert_node(node(Label::Taxon, "a"));
        let b = g.insert_node(node(Label::Taxon, "b"));
        let e = g.insert_edge(edge(a, b, RelType::ParentOf));
        let slot = g.remove_edge(e).unwrap();
        assert_eq!(slot.start, a);
        assert!(g.incident_edges(a).is_empty());
        assert_eq!(g.edge_count(), 0);
        assert!(g.edge(e).is_none());

        g.restore_edge(e, slot);
        assert_eq!(g.edges(a, RelType::ParentOf, Direction::Outgoing), [e]);
        assert_eq!(g.edges_of_type(RelType::ParentOf), [e]);
    }
}
