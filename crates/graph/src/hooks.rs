//! Callbacks at transaction boundaries.

use std::fmt;

/// Observer of transaction boundaries.
///
/// Lets state kept outside the graph, such as object store records, commit
/// and roll back together with a [`Transaction`](crate::Transaction). The
/// graph lock is held across every call, so at most one transaction is
/// between [`begun`](Self::begun) and its completion at any time.
pub trait TxHooks: Send + Sync + fmt::Debug {
    /// A transaction started.
    fn begun(&self);

    /// The transaction's graph changes were persisted.
    fn committed(&self);

    /// The transaction was rolled back, explicitly, on drop or after a
    /// failed commit.
    fn rolled_back(&self);
}
