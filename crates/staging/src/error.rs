//! Error types for the staging engine.

use snafu::Snafu;
use taxostage_graph::{EdgeId, GraphError, NodeId, RelType};
use taxostage_store::StoreError;
use taxostage_types::ConfigError;

use crate::pipeline::PipelineError;

/// Result type for staging operations.
pub type Result<T, E = StagingError> = std::result::Result<T, E>;

/// Errors returned by [`StagingDb`](crate::StagingDb).
///
/// Dirty input never ends up here; it is recorded as issues on verbatim
/// records. These errors abort the import attempt.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StagingError {
    /// The object store failed.
    #[snafu(display("Object store error: {source}"))]
    Store {
        /// Underlying store error.
        source: StoreError,
    },

    /// The graph store failed.
    #[snafu(display("Graph store error: {source}"))]
    Graph {
        /// Underlying graph error.
        source: GraphError,
    },

    /// A batch traversal failed.
    #[snafu(display("Batch processing failed: {source}"))]
    Pipeline {
        /// Underlying pipeline error.
        source: PipelineError,
    },

    /// The configuration is invalid.
    #[snafu(display("Invalid staging configuration: {source}"))]
    Config {
        /// Underlying validation error.
        source: ConfigError,
    },

    /// A file system operation on the staging directory failed.
    #[snafu(display("I/O error on {path}: {source}"))]
    Io {
        /// Path involved.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A node has no backing record in the object store.
    #[snafu(display("No {kind} record stored for node {node}"))]
    MissingRecord {
        /// Expected record kind.
        kind: &'static str,
        /// Node without record.
        node: NodeId,
    },

    /// A usage node has no `HAS_NAME` edge.
    #[snafu(display("Usage node {node} has no name"))]
    MissingName {
        /// Usage node.
        node: NodeId,
    },

    /// An edge does not carry the relation it was read as.
    #[snafu(display("Edge {edge} of type {rel} is not a {expected}"))]
    UnexpectedEdge {
        /// Edge read.
        edge: EdgeId,
        /// Its type.
        rel: RelType,
        /// Relation kind expected.
        expected: &'static str,
    },

    /// A usage was passed to a create operation without its name.
    #[snafu(display("Usage {id} carries no name"))]
    UsageWithoutName {
        /// Usage id, or `-` if it has none yet.
        id: String,
    },
}

impl From<StoreError> for StagingError {
    fn from(source: StoreError) -> Self {
        StagingError::Store { source }
    }
}

impl From<GraphError> for StagingError {
    fn from(source: GraphError) -> Self {
        StagingError::Graph { source }
    }
}

impl From<PipelineError> for StagingError {
    fn from(source: PipelineError) -> Self {
        StagingError::Pipeline { source }
    }
}
