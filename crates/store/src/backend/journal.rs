//! Undo journal over another backend.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{KvBackend, Visitor};
use crate::{error::Result, tables::Table};

/// The value a key held before a journaled write.
#[derive(Debug)]
struct Before {
    table: Table,
    key: Vec<u8>,
    value: Option<Vec<u8>>,
}

/// Backend that can undo the writes made since [`begin`](Self::begin).
///
/// Writes go straight through to the inner backend. While a journal is open
/// the previous value of every written key is kept, so
/// [`rewind`](Self::rewind) can restore it. Only one journal is open at a
/// time and writes from other threads land in it too; callers serialize
/// journal scopes with the writes they cover.
#[derive(Debug)]
pub struct JournaledBackend {
    inner: Arc<dyn KvBackend>,
    journal: Mutex<Option<Vec<Before>>>,
}

impl JournaledBackend {
    /// Wraps `inner` with no journal open.
    pub fn new(inner: Arc<dyn KvBackend>) -> Self {
        Self { inner, journal: Mutex::new(None) }
    }

    /// Opens a journal, dropping any previous one.
    pub fn begin(&self) {
        *self.journal.lock() = Some(Vec::new());
    }

    /// Closes the journal and keeps every write.
    pub fn discard(&self) {
        *self.journal.lock() = None;
    }

    /// Returns true while a journal is open.
    pub fn is_open(&self) -> bool {
        self.journal.lock().is_some()
    }

    /// Closes the journal and restores every key written since
    /// [`begin`](Self::begin), newest first. Returns the number of writes
    /// undone.
    ///
    /// # Errors
    ///
    /// Returns the first storage error. The remaining writes are not undone.
    pub fn rewind(&self) -> Result<usize> {
        let Some(entries) = self.journal.lock().take() else {
            return Ok(0);
        };
        let count = entries.len();
        for before in entries.into_iter().rev() {
            match before.value {
                Some(value) => self.inner.put(before.table, &before.key, &value)?,
                None => {
                    self.inner.delete(before.table, &before.key)?;
                },
            }
        }
        Ok(count)
    }

    fn record(&self, table: Table, key: &[u8]) -> Result<()> {
        let mut journal = self.journal.lock();
        if let Some(entries) = journal.as_mut() {
            let value = self.inner.get(table, key)?;
            entries.push(Before { table, key: key.to_vec(), value });
        }
        Ok(())
    }
}

impl KvBackend for JournaledBackend {
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner.get(table, key)
    }

    fn put(&self, table: Table, key: &[u8], value: &[u8]) -> Result<()> {
        self.record(table, key)?;
        self.inner.put(table, key, value)
    }

    fn delete(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.record(table, key)?;
        self.inner.delete(table, key)
    }

    fn for_each(&self, table: Table, visit: &mut Visitor<'_>) -> Result<()> {
        self.inner.for_each(table, visit)
    }

    fn last_key(&self, table: Table) -> Result<Option<Vec<u8>>> {
        self.inner.last_key(table)
    }

    fn len(&self, table: Table) -> Result<u64> {
        self.inner.len(table)
    }
}
