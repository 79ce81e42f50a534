//! Error types for the object store.

use snafu::Snafu;
use taxostage_types::codec::CodecError;

use crate::tables::Table;

/// Result type for object store operations.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Errors returned by the object store.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    /// The database file could not be opened or created.
    #[snafu(display("Failed to open object store at {path}: {source}"))]
    Open {
        /// Path of the database file.
        path: String,
        /// Underlying redb error.
        source: redb::DatabaseError,
    },

    /// A read or write transaction could not be started.
    #[snafu(display("Failed to begin transaction: {source}"))]
    Transaction {
        /// Underlying redb error.
        source: redb::TransactionError,
    },

    /// A table could not be opened.
    #[snafu(display("Failed to open table {}: {source}", table.name()))]
    OpenTable {
        /// Table being opened.
        table: Table,
        /// Underlying redb error.
        source: redb::TableError,
    },

    /// A read or write inside a transaction failed.
    #[snafu(display("Storage operation on {} failed: {source}", table.name()))]
    Storage {
        /// Table being accessed.
        table: Table,
        /// Underlying redb error.
        source: redb::StorageError,
    },

    /// A write transaction could not be committed.
    #[snafu(display("Failed to commit: {source}"))]
    Commit {
        /// Underlying redb error.
        source: redb::CommitError,
    },

    /// A stored value could not be encoded or decoded.
    #[snafu(display("Codec error in {}: {source}", table.name()))]
    Codec {
        /// Table holding the value.
        table: Table,
        /// Underlying codec error.
        source: CodecError,
    },

    /// A record without an id was passed where an id is required.
    #[snafu(display("{kind} record has no id"))]
    MissingId {
        /// Entity kind of the record.
        kind: &'static str,
    },

    /// A stored key is malformed.
    #[snafu(display("Corrupted key in {}: {message}", table.name()))]
    CorruptedKey {
        /// Table holding the key.
        table: Table,
        /// Description of the problem.
        message: String,
    },
}
