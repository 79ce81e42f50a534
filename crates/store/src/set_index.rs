//! Persistent string → set-of-ids index.

use std::{collections::BTreeSet, sync::Arc};

use snafu::ResultExt;
use taxostage_types::codec;

use crate::{
    backend::KvBackend,
    error::{CodecSnafu, Result},
    tables::Table,
};

/// Secondary index mapping a string key to a set of numeric ids.
///
/// Each key holds one postcard-encoded sorted set; empty sets are removed.
#[derive(Debug)]
pub struct SetIndex {
    table: Table,
    backend: Arc<dyn KvBackend>,
}

impl SetIndex {
    /// Creates an index over `table`.
    pub fn new(table: Table, backend: Arc<dyn KvBackend>) -> Self {
        Self { table, backend }
    }

    /// Adds `id` to the set of `key`.
    ///
    /// # Errors
    ///
    /// Returns a storage or codec error.
    pub fn add(&self, key: &str, id: u64) -> Result<()> {
        let mut set = self.get(key)?;
        if set.insert(id) {
            self.store(key, &set)?;
        }
        Ok(())
    }

    /// Removes `id` from the set of `key`.
    ///
    /// # Errors
    ///
    /// Returns a storage or codec error.
    pub fn remove(&self, key: &str, id: u64) -> Result<()> {
        let mut set = self.get(key)?;
        if !set.remove(&id) {
            return Ok(());
        }
        if set.is_empty() {
            self.backend.delete(self.table, key.as_bytes())?;
            Ok(())
        } else {
            self.store(key, &set)
        }
    }

    /// Returns the ids indexed under `key`.
    ///
    /// # Errors
    ///
    /// Returns a storage or codec error.
    pub fn get(&self, key: &str) -> Result<BTreeSet<u64>> {
        match self.backend.get(self.table, key.as_bytes())? {
            Some(bytes) => codec::decode(&bytes).context(CodecSnafu { table: self.table }),
            None => Ok(BTreeSet::new()),
        }
    }

    fn store(&self, key: &str, set: &BTreeSet<u64>) -> Result<()> {
        let bytes = codec::encode(set).context(CodecSnafu { table: self.table })?;
        self.backend.put(self.table, key.as_bytes(), &bytes)
    }
}
