//! Write operations shared by the bulk writer and transactions.

use snafu::ensure;

use crate::{
    data::GraphData,
    db::Mode,
    error::{MultiplicitySnafu, NodeNotFoundSnafu, Result},
    model::{Direction, EdgeId, EdgeProps, LabelSet, NodeId, NodeProps, NodeRef, RelType},
};

/// Node and edge creation available in both write modes.
///
/// Loader code is written against this trait so the same code path works
/// during the initial bulk load and inside a transaction later on.
pub trait GraphWrite {
    /// Mode the writer belongs to.
    fn mode(&self) -> Mode;

    /// Creates a node.
    ///
    /// # Errors
    ///
    /// Returns an error if the write cannot be recorded.
    fn create_node(&mut self, labels: LabelSet, props: NodeProps) -> Result<NodeRef>;

    /// Creates a directed edge.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::NodeNotFound` for a missing endpoint and
    /// `GraphError::Multiplicity` for a second `HAS_NAME` edge of one node.
    fn create_edge(
        &mut self,
        start: NodeId,
        end: NodeId,
        rel: RelType,
        props: EdgeProps,
    ) -> Result<EdgeId>;

    /// Adds labels to an existing node.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::NodeNotFound` for a missing node.
    fn add_labels(&mut self, node: NodeId, labels: LabelSet) -> Result<()>;

    /// Replaces the properties of an existing node.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::NodeNotFound` for a missing node.
    fn set_node_props(&mut self, node: NodeId, props: NodeProps) -> Result<()>;
}

/// Checks an edge about to be created.
pub(crate) fn check_new_edge(
    data: &GraphData,
    start: NodeId,
    end: NodeId,
    rel: RelType,
) -> Result<()> {
    ensure!(data.contains_node(start), NodeNotFoundSnafu { node: start });
    ensure!(data.contains_node(end), NodeNotFoundSnafu { node: end });
    if rel == RelType::HasName {
        let count = data.degree(start, rel, Direction::Outgoing);
        ensure!(
            count == 0,
            MultiplicitySnafu { node: start, rel, direction: Direction::Outgoing, count: count + 1 }
        );
    }
    Ok(())
}
