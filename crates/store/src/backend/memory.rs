//! In-memory backend for tests and throwaway stores.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;

use super::{KvBackend, Visitor};
use crate::{error::Result, tables::Table};

type TableMap = BTreeMap<Vec<u8>, Vec<u8>>;

/// Backend keeping every table in a `BTreeMap`.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: RwLock<HashMap<Table, TableMap>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvBackend for MemoryBackend {
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.tables.read().get(&table).and_then(|t| t.get(key)).cloned())
    }

    fn put(&self, table: Table, key: &[u8], value: &[u8]) -> Result<()> {
        self.tables.write().entry(table).or_default().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.tables.write().get_mut(&table).and_then(|t| t.remove(key)))
    }

    fn for_each(&self, table: Table, visit: &mut Visitor<'_>) -> Result<()> {
        // Snapshot so the visitor may write to the backend.
        let entries: Vec<(Vec<u8>, Vec<u8>)> = match self.tables.read().get(&table) {
            Some(t) => t.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            None => return Ok(()),
        };
        for (key, value) in &entries {
            visit(key, value)?;
        }
        Ok(())
    }

    fn last_key(&self, table: Table) -> Result<Option<Vec<u8>>> {
        Ok(self.tables.read().get(&table).and_then(|t| t.keys().next_back().cloned()))
    }

    fn len(&self, table: Table) -> Result<u64> {
        Ok(self.tables.read().get(&table).map_or(0, |t| t.len() as u64))
    }
}
