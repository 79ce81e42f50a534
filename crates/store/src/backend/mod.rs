//! Key-value backend abstraction for the object store.
//!
//! The backend trait abstracts the underlying persistent map, allowing both
//! file-based (production) and in-memory (testing) implementations.
//! [`JournaledBackend`] wraps either to undo writes made inside a graph
//! transaction that rolls back. Record encoding happens above this layer;
//! backends only see bytes.

mod file;
mod journal;
mod memory;

use std::fmt;

pub use file::RedbBackend;
pub use journal::JournaledBackend;
pub use memory::MemoryBackend;

use crate::{error::Result, tables::Table};

/// Visitor invoked for every key/value pair of a table scan.
pub type Visitor<'a> = dyn FnMut(&[u8], &[u8]) -> Result<()> + 'a;

/// A persistent, ordered byte map with one namespace per [`Table`].
///
/// Every method is a self-contained, atomic operation. Writes from several
/// threads are serialized by the backend; callers still assume a single
/// logical writer per store.
pub trait KvBackend: Send + Sync + fmt::Debug {
    /// Returns the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the write or its commit fails.
    fn put(&self, table: Table, key: &[u8], value: &[u8]) -> Result<()>;

    /// Removes `key`, returning the value it held.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the write or its commit fails.
    fn delete(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Visits every entry of `table` in key order.
    ///
    /// The first error returned by `visit` stops the scan and is returned.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the scan fails, or the visitor's error.
    fn for_each(&self, table: Table, visit: &mut Visitor<'_>) -> Result<()>;

    /// Returns the greatest key of `table`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    fn last_key(&self, table: Table) -> Result<Option<Vec<u8>>>;

    /// Returns the number of entries in `table`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    fn len(&self, table: Table) -> Result<u64>;

    /// Returns true if `key` is present.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    fn contains(&self, table: Table, key: &[u8]) -> Result<bool> {
        Ok(self.get(table, key)?.is_some())
    }
}
