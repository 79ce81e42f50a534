//! Property graph store for the taxostage staging engine.
//!
//! One node exists per name and per usage. Typed, directed edges carry the
//! hierarchy (`PARENT_OF`), synonymy (`SYNONYM_OF`), the usage-to-name link
//! (`HAS_NAME`) and nomenclatural relations between names.
//!
//! The store has two write modes:
//! - **Bulk**: a [`BulkWriter`] appends nodes and edges with no reads and
//!   no transactions. Rows are flushed when the mode ends.
//! - **Transactional**: a [`Transaction`] reads and writes atomically; label
//!   queries and traversals are only available here.
//!
//! Nodes and edges live in dense arenas with adjacency keyed by
//! (node, edge type, direction). Changes are persisted in a redb file.
//! [`TxHooks`] let outside state follow transaction commits and rollbacks.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bulk;
mod data;
mod db;
mod error;
mod hooks;
mod model;
mod persist;
pub mod printer;
mod txn;
mod write;

pub use bulk::BulkWriter;
pub use db::{GraphDb, Mode};
pub use error::{GraphError, Result};
pub use hooks::TxHooks;
pub use model::{
    Direction, Edge, EdgeId, EdgeProps, Label, LabelSet, NodeId, NodeProps, NodeRef, RelType,
};
pub use txn::Transaction;
pub use write::GraphWrite;
