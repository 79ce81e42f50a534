//! Error types for the graph store.

use snafu::Snafu;
use taxostage_types::codec::CodecError;

use crate::{
    db::Mode,
    model::{Direction, EdgeId, NodeId, RelType},
};

/// Result type for graph operations.
pub type Result<T, E = GraphError> = std::result::Result<T, E>;

/// Errors returned by the graph store.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum GraphError {
    /// The graph file could not be opened or created.
    #[snafu(display("Failed to open graph store at {path}: {source}"))]
    Open {
        /// Path of the graph file.
        path: String,
        /// Underlying redb error.
        source: redb::DatabaseError,
    },

    /// A redb transaction could not be started.
    #[snafu(display("Failed to begin storage transaction: {source}"))]
    BeginStorage {
        /// Underlying redb error.
        source: redb::TransactionError,
    },

    /// A redb table could not be opened.
    #[snafu(display("Failed to open graph table: {source}"))]
    OpenTable {
        /// Underlying redb error.
        source: redb::TableError,
    },

    /// A read or write of the graph file failed.
    #[snafu(display("Graph storage operation failed: {source}"))]
    Storage {
        /// Underlying redb error.
        source: redb::StorageError,
    },

    /// Persisting a commit failed.
    #[snafu(display("Failed to commit graph changes: {source}"))]
    Commit {
        /// Underlying redb error.
        source: redb::CommitError,
    },

    /// A stored node or edge could not be encoded or decoded.
    #[snafu(display("Graph codec error: {source}"))]
    Codec {
        /// Underlying codec error.
        source: CodecError,
    },

    /// Writing a dump failed.
    #[snafu(display("Failed to write graph dump: {source}"))]
    Io {
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The node does not exist or has been deleted.
    #[snafu(display("Node {node} not found"))]
    NodeNotFound {
        /// Missing node.
        node: NodeId,
    },

    /// The edge does not exist or has been deleted.
    #[snafu(display("Edge {edge} not found"))]
    EdgeNotFound {
        /// Missing edge.
        edge: EdgeId,
    },

    /// More edges of one type and direction exist than allowed.
    #[snafu(display("Node {node} has {count} {direction} {rel} edges where at most one is allowed"))]
    Multiplicity {
        /// Node carrying the edges.
        node: NodeId,
        /// Edge type.
        rel: RelType,
        /// Edge direction relative to `node`.
        direction: Direction,
        /// Number of edges found.
        count: usize,
    },

    /// The operation is not available in the current mode.
    #[snafu(display("Graph store is in {actual} mode, {expected} mode required"))]
    WrongMode {
        /// Mode the operation needs.
        expected: Mode,
        /// Current mode.
        actual: Mode,
    },

    /// The edge may only be removed together with its start node.
    #[snafu(display("Edge {edge} of type {rel} cannot be deleted on its own"))]
    ImmutableEdge {
        /// Edge that was to be deleted.
        edge: EdgeId,
        /// Its type.
        rel: RelType,
    },

    /// The node still has edges and cannot be deleted.
    #[snafu(display("Node {node} still has {count} edges"))]
    NodeHasEdges {
        /// Node that was to be deleted.
        node: NodeId,
        /// Number of incident edges.
        count: usize,
    },

    /// Flushing bulk-mode data failed. The store has been closed.
    #[snafu(display("Failed to flush bulk data, graph store closed: {source}"))]
    FlushFailed {
        /// Failure of the flush.
        #[snafu(source(from(GraphError, Box::new)))]
        source: Box<GraphError>,
    },
}
