//! Bulk-mode writer.

use parking_lot::MappedMutexGuard;
use snafu::OptionExt;

use crate::{
    data::{EdgeSlot, NodeSlot},
    db::{Mode, OpenGraph},
    error::{NodeNotFoundSnafu, Result},
    model::{EdgeId, EdgeProps, LabelSet, NodeId, NodeProps, NodeRef, RelType},
    write::{GraphWrite, check_new_edge},
};

/// Appends nodes and edges without transactions.
///
/// Nothing written here can be read back until the store switches to
/// transactional mode; created nodes are handed out as [`NodeRef::Bulk`].
/// Rows reach the graph file when bulk mode ends or the store closes.
pub struct BulkWriter<'g> {
    graph: MappedMutexGuard<'g, OpenGraph>,
}

impl<'g> BulkWriter<'g> {
    pub(crate) fn new(graph: MappedMutexGuard<'g, OpenGraph>) -> Self {
        Self { graph }
    }

    /// The node collecting relations whose target is outside the dataset.
    pub fn dev_null(&self) -> NodeId {
        self.graph.dev_null
    }
}

impl GraphWrite for BulkWriter<'_> {
    fn mode(&self) -> Mode {
        Mode::Bulk
    }

    fn create_node(&mut self, labels: LabelSet, props: NodeProps) -> Result<NodeRef> {
        let graph = &mut *self.graph;
        let id = graph.data.insert_node(NodeSlot { labels, props });
        graph.pending_nodes.insert(id);
        Ok(NodeRef::Bulk(id.value()))
    }

    fn create_edge(
        &mut self,
        start: NodeId,
        end: NodeId,
        rel: RelType,
        props: EdgeProps,
    ) -> Result<EdgeId> {
        let graph = &mut *self.graph;
        check_new_edge(&graph.data, start, end, rel)?;
        let id = graph.data.insert_edge(EdgeSlot { start, end, rel, props });
        graph.pending_edges.insert(id);
        Ok(id)
    }

    fn add_labels(&mut self, node: NodeId, labels: LabelSet) -> Result<()> {
        let graph = &mut *self.graph;
        let current = graph.data.node(node).context(NodeNotFoundSnafu { node })?.labels;
        graph.data.set_labels(node, current.union(labels));
        graph.pending_nodes.insert(node);
        Ok(())
    }

    fn set_node_props(&mut self, node: NodeId, props: NodeProps) -> Result<()> {
        let graph = &mut *self.graph;
        graph.data.set_props(node, props).context(NodeNotFoundSnafu { node })?;
        graph.pending_nodes.insert(node);
        Ok(())
    }
}

impl std::fmt::Debug for BulkWriter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkWriter")
            .field("pending_nodes", &self.graph.pending_nodes.len())
            .field("pending_edges", &self.graph.pending_edges.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use taxostage_test_utils::TestDir;

    use super::*;
    use crate::{GraphDb, GraphError, Label};

    #[test]
    fn test_bulk_refs_are_placeholders() {
        let dir = TestDir::new();
        let db = GraphDb::open(dir.graph_file(), false).unwrap();
        db.start_bulk().unwrap();
        let mut w = db.bulk().unwrap();
        let node = w.create_node(LabelSet::of(Label::Name), NodeProps::with_id("n")).unwrap();
        assert!(node.is_bulk());
        assert_eq!(w.mode(), Mode::Bulk);
    }

    #[test]
    fn test_bulk_enforces_has_name_cardinality() {
        let dir = TestDir::new();
        let db = GraphDb::open(dir.graph_file(), false).unwrap();
        db.start_bulk().unwrap();
        let mut w = db.bulk().unwrap();
        let u = w.create_node(LabelSet::of(Label::Taxon), NodeProps::with_id("u")).unwrap().id();
        let n1 = w.create_node(LabelSet::of(Label::Name), NodeProps::with_id("n1")).unwrap().id();
        let n2 = w.create_node(LabelSet::of(Label::Name), NodeProps::with_id("n2")).unwrap().id();
        w.create_edge(u, n1, RelType::HasName, EdgeProps::default()).unwrap();
        let err = w.create_edge(u, n2, RelType::HasName, EdgeProps::default()).unwrap_err();
        assert!(matches!(err, GraphError::Multiplicity { .. }));
    }
}
