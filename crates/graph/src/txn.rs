//! Graph transactions.
//!
//! Writes are applied to the in-memory tables immediately and recorded in an
//! undo log. [`Transaction::commit`] persists the touched rows in one redb
//! write transaction; rollback, explicit or on drop, replays the undo log in
//! reverse. Ids of rolled-back nodes and edges stay unused.

use std::{collections::BTreeSet, sync::Arc};

use parking_lot::MappedMutexGuard;
use snafu::{OptionExt, ensure};

use crate::{
    data::{EdgeSlot, NodeSlot},
    db::{Mode, OpenGraph},
    error::{
        EdgeNotFoundSnafu, ImmutableEdgeSnafu, MultiplicitySnafu, NodeHasEdgesSnafu,
        NodeNotFoundSnafu, Result,
    },
    hooks::TxHooks,
    model::{Direction, Edge, EdgeId, EdgeProps, Label, LabelSet, NodeId, NodeProps, NodeRef, RelType},
    write::{GraphWrite, check_new_edge},
};

#[derive(Debug)]
enum Undo {
    CreateNode(NodeId),
    CreateEdge(EdgeId),
    DeleteNode(NodeId, NodeSlot),
    DeleteEdge(EdgeId, EdgeSlot),
    Labels(NodeId, LabelSet),
    NodeProps(NodeId, NodeProps),
    EdgeProps(EdgeId, EdgeProps),
}

/// An atomic unit of graph reads and writes.
///
/// Holds the graph lock until committed, rolled back or dropped.
pub struct Transaction<'g> {
    graph: MappedMutexGuard<'g, OpenGraph>,
    undo: Vec<Undo>,
    dirty_nodes: BTreeSet<NodeId>,
    dirty_edges: BTreeSet<EdgeId>,
    hooks: Option<Arc<dyn TxHooks>>,
    finished: bool,
}

impl<'g> Transaction<'g> {
    pub(crate) fn new(
        graph: MappedMutexGuard<'g, OpenGraph>,
        hooks: Option<Arc<dyn TxHooks>>,
    ) -> Self {
        if let Some(hooks) = &hooks {
            hooks.begun();
        }
        Self {
            graph,
            undo: Vec::new(),
            dirty_nodes: BTreeSet::new(),
            dirty_edges: BTreeSet::new(),
            hooks,
            finished: false,
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// The node collecting relations whose target is outside the dataset.
    pub fn dev_null(&self) -> NodeId {
        self.graph.dev_null
    }

    /// Turns a node reference from either mode into a checked node id.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::NodeNotFound` if the node does not exist.
    pub fn resolve(&self, node: NodeRef) -> Result<NodeId> {
        let id = node.id();
        ensure!(self.graph.data.contains_node(id), NodeNotFoundSnafu { node: id });
        Ok(id)
    }

    /// Returns true if the node exists.
    pub fn contains_node(&self, node: NodeId) -> bool {
        self.graph.data.contains_node(node)
    }

    /// Labels of `node`.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::NodeNotFound` if the node does not exist.
    pub fn labels(&self, node: NodeId) -> Result<LabelSet> {
        Ok(self.slot(node)?.labels)
    }

    /// Returns true if `node` carries `label`.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::NodeNotFound` if the node does not exist.
    pub fn has_label(&self, node: NodeId, label: Label) -> Result<bool> {
        Ok(self.labels(node)?.contains(label))
    }

    /// Properties of `node`.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::NodeNotFound` if the node does not exist.
    pub fn props(&self, node: NodeId) -> Result<&NodeProps> {
        Ok(&self.slot(node)?.props)
    }

    /// All nodes with `label`, in id order.
    pub fn nodes_with_label(&self, label: Label) -> Vec<NodeId> {
        self.graph.data.nodes_with_label(label)
    }

    /// All nodes in id order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.graph.data.node_ids().collect()
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.graph.data.node_count()
    }

    /// Number of live edges.
    pub fn edge_count(&self) -> usize {
        self.graph.data.edge_count()
    }

    /// The edge with `id`.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::EdgeNotFound` if the edge does not exist.
    pub fn edge(&self, id: EdgeId) -> Result<Edge> {
        self.graph.data.edge(id).context(EdgeNotFoundSnafu { edge: id })
    }

    /// Edges of type `rel` at `node`, in id order.
    pub fn edges(&self, node: NodeId, rel: RelType, direction: Direction) -> Vec<Edge> {
        self.collect(self.graph.data.edges(node, rel, direction))
    }

    /// All edges of type `rel`, in id order.
    pub fn edges_of_type(&self, rel: RelType) -> Vec<Edge> {
        self.collect(self.graph.data.edges_of_type(rel))
    }

    /// All edges touching `node`, in id order.
    pub fn incident_edges(&self, node: NodeId) -> Vec<Edge> {
        self.collect(self.graph.data.incident_edges(node))
    }

    /// All edges in id order.
    pub fn all_edges(&self) -> Vec<Edge> {
        self.collect(self.graph.data.edge_ids().collect())
    }

    /// Number of edges of type `rel` at `node`.
    pub fn degree(&self, node: NodeId, rel: RelType, direction: Direction) -> usize {
        self.graph.data.degree(node, rel, direction)
    }

    /// Nodes at the other end of the `rel` edges of `node`, in edge order.
    pub fn related(&self, node: NodeId, rel: RelType, direction: Direction) -> Vec<NodeId> {
        self.edges(node, rel, direction).iter().map(|e| e.other(node)).collect()
    }

    /// The only edge of type `rel` at `node`, if any.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::Multiplicity` if more than one edge exists.
    pub fn single_edge(
        &self,
        node: NodeId,
        rel: RelType,
        direction: Direction,
    ) -> Result<Option<Edge>> {
        let mut edges = self.graph.data.edges(node, rel, direction);
        ensure!(
            edges.len() <= 1,
            MultiplicitySnafu { node, rel, direction, count: edges.len() }
        );
        Ok(edges.pop().and_then(|id| self.graph.data.edge(id)))
    }

    fn slot(&self, node: NodeId) -> Result<&NodeSlot> {
        self.graph.data.node(node).context(NodeNotFoundSnafu { node })
    }

    fn collect(&self, ids: Vec<EdgeId>) -> Vec<Edge> {
        ids.into_iter().filter_map(|id| self.graph.data.edge(id)).collect()
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Removes labels from `node`.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::NodeNotFound` if the node does not exist.
    pub fn remove_labels(&mut self, node: NodeId, labels: LabelSet) -> Result<()> {
        let current = self.labels(node)?;
        self.set_labels(node, current.difference(labels))
    }

    /// Replaces the labels of `node`.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::NodeNotFound` if the node does not exist.
    pub fn set_labels(&mut self, node: NodeId, labels: LabelSet) -> Result<()> {
        let old = self.graph.data.set_labels(node, labels).context(NodeNotFoundSnafu { node })?;
        if old != labels {
            self.undo.push(Undo::Labels(node, old));
            self.dirty_nodes.insert(node);
        }
        Ok(())
    }

    /// Replaces the properties of an edge.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::EdgeNotFound` if the edge does not exist.
    pub fn set_edge_props(&mut self, edge: EdgeId, props: EdgeProps) -> Result<()> {
        let old = self.graph.data.set_edge_props(edge, props).context(EdgeNotFoundSnafu { edge })?;
        self.undo.push(Undo::EdgeProps(edge, old));
        self.dirty_edges.insert(edge);
        Ok(())
    }

    /// Deletes an edge.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::EdgeNotFound` for a missing edge and
    /// `GraphError::ImmutableEdge` for a `HAS_NAME` edge, which only goes
    /// away with [`detach_delete`](Self::detach_delete).
    pub fn delete_edge(&mut self, edge: EdgeId) -> Result<Edge> {
        let found = self.edge(edge)?;
        ensure!(found.rel != RelType::HasName, ImmutableEdgeSnafu { edge, rel: found.rel });
        self.remove_edge(edge)?;
        Ok(found)
    }

    /// Deletes a node without edges.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::NodeHasEdges` if edges still touch the node.
    pub fn delete_node(&mut self, node: NodeId) -> Result<NodeProps> {
        let count = self.graph.data.incident_edges(node).len();
        ensure!(count == 0, NodeHasEdgesSnafu { node, count });
        self.remove_node(node)
    }

    /// Deletes a node together with every edge touching it.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::NodeNotFound` if the node does not exist.
    pub fn detach_delete(&mut self, node: NodeId) -> Result<NodeProps> {
        ensure!(self.contains_node(node), NodeNotFoundSnafu { node });
        for edge in self.graph.data.incident_edges(node) {
            self.remove_edge(edge)?;
        }
        self.remove_node(node)
    }

    fn remove_edge(&mut self, edge: EdgeId) -> Result<()> {
        let slot = self.graph.data.remove_edge(edge).context(EdgeNotFoundSnafu { edge })?;
        self.undo.push(Undo::DeleteEdge(edge, slot));
        self.dirty_edges.insert(edge);
        Ok(())
    }

    fn remove_node(&mut self, node: NodeId) -> Result<NodeProps> {
        let slot = self.graph.data.remove_node(node).context(NodeNotFoundSnafu { node })?;
        let props = slot.props.clone();
        self.undo.push(Undo::DeleteNode(node, slot));
        self.dirty_nodes.insert(node);
        Ok(props)
    }

    // ========================================================================
    // Completion
    // ========================================================================

    /// Persists all changes.
    ///
    /// # Errors
    ///
    /// Returns a storage error; the in-memory changes are rolled back then.
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        if !self.dirty_nodes.is_empty() || !self.dirty_edges.is_empty() {
            let graph = &*self.graph;
            if let Err(error) =
                graph.file.persist(&graph.data, &self.dirty_nodes, &self.dirty_edges)
            {
                tracing::error!(%error, "Graph commit failed, rolling back");
                self.undo_all();
                return Err(error);
            }
        }
        if let Some(hooks) = &self.hooks {
            hooks.committed();
        }
        Ok(())
    }

    /// Discards all changes.
    pub fn rollback(mut self) {
        self.finished = true;
        self.undo_all();
    }

    fn undo_all(&mut self) {
        let data = &mut self.graph.data;
        while let Some(step) = self.undo.pop() {
            match step {
                Undo::CreateNode(id) => {
                    data.remove_node(id);
                },
                Undo::CreateEdge(id) => {
                    data.remove_edge(id);
                },
                Undo::DeleteNode(id, slot) => data.restore_node(id, slot),
                Undo::DeleteEdge(id, slot) => data.restore_edge(id, slot),
                Undo::Labels(id, labels) => {
                    data.set_labels(id, labels);
                },
                Undo::NodeProps(id, props) => {
                    data.set_props(id, props);
                },
                Undo::EdgeProps(id, props) => {
                    data.set_edge_props(id, props);
                },
            }
        }
        self.dirty_nodes.clear();
        self.dirty_edges.clear();
        if let Some(hooks) = &self.hooks {
            hooks.rolled_back();
        }
    }
}

impl GraphWrite for Transaction<'_> {
    fn mode(&self) -> Mode {
        Mode::Transactional
    }

    fn create_node(&mut self, labels: LabelSet, props: NodeProps) -> Result<NodeRef> {
        let id = self.graph.data.insert_node(NodeSlot { labels, props });
        self.undo.push(Undo::CreateNode(id));
        self.dirty_nodes.insert(id);
        Ok(NodeRef::Live(id))
    }

    fn create_edge(
        &mut self,
        start: NodeId,
        end: NodeId,
        rel: RelType,
        props: EdgeProps,
    ) -> Result<EdgeId> {
        check_new_edge(&self.graph.data, start, end, rel)?;
        let id = self.graph.data.insert_edge(EdgeSlot { start, end, rel, props });
        self.undo.push(Undo::CreateEdge(id));
        self.dirty_edges.insert(id);
        Ok(id)
    }

    fn add_labels(&mut self, node: NodeId, labels: LabelSet) -> Result<()> {
        let current = self.labels(node)?;
        self.set_labels(node, current.union(labels))
    }

    fn set_node_props(&mut self, node: NodeId, props: NodeProps) -> Result<()> {
        let old = self.graph.data.set_props(node, props).context(NodeNotFoundSnafu { node })?;
        self.undo.push(Undo::NodeProps(node, old));
        self.dirty_nodes.insert(node);
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if !self.undo.is_empty() {
                tracing::debug!(steps = self.undo.len(), "Rolling back dropped graph transaction");
            }
            self.undo_all();
        }
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("undo", &self.undo.len())
            .field("dirty_nodes", &self.dirty_nodes.len())
            .field("dirty_edges", &self.dirty_edges.len())
            .finish_non_exhaustive()
    }
}
