//! redb-backed file storage.

use std::path::{Path, PathBuf};

use redb::{
    Database, Durability, ReadableTable, ReadableTableMetadata, TableDefinition, WriteTransaction,
};
use snafu::ResultExt;

use super::{KvBackend, Visitor};
use crate::{
    error::{CommitSnafu, OpenSnafu, OpenTableSnafu, Result, StorageSnafu, TransactionSnafu},
    tables::Table,
};

const fn definition(table: Table) -> TableDefinition<'static, &'static [u8], &'static [u8]> {
    TableDefinition::new(table.name())
}

/// Object store backend persisting every table in one redb file.
///
/// Each operation runs in its own redb transaction. With `durable` unset,
/// commits skip the fsync; the data still survives a clean close.
#[derive(Debug)]
pub struct RedbBackend {
    db: Database,
    path: PathBuf,
    durable: bool,
}

impl RedbBackend {
    /// Opens or creates the database file at `path` and creates all tables.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Open` if the file cannot be opened, or a
    /// transaction error if the tables cannot be created.
    pub fn open(path: impl AsRef<Path>, durable: bool) -> Result<Self> {
        let path = path.as_ref();
        let db = Database::create(path).context(OpenSnafu { path: path.display().to_string() })?;
        let backend = Self { db, path: path.to_path_buf(), durable };

        let txn = backend.begin_write()?;
        for table in Table::all() {
            txn.open_table(definition(table)).context(OpenTableSnafu { table })?;
        }
        txn.commit().context(CommitSnafu)?;

        tracing::debug!(path = %path.display(), "Opened object store");
        Ok(backend)
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn begin_write(&self) -> Result<WriteTransaction> {
        let mut txn = self.db.begin_write().context(TransactionSnafu)?;
        txn.set_durability(if self.durable { Durability::Immediate } else { Durability::None });
        Ok(txn)
    }
}

impl KvBackend for RedbBackend {
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let txn = self.db.begin_read().context(TransactionSnafu)?;
        let t = txn.open_table(definition(table)).context(OpenTableSnafu { table })?;
        let value = t.get(key).context(StorageSnafu { table })?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    fn put(&self, table: Table, key: &[u8], value: &[u8]) -> Result<()> {
        let txn = self.begin_write()?;
        {
            let mut t = txn.open_table(definition(table)).context(OpenTableSnafu { table })?;
            t.insert(key, value).context(StorageSnafu { table })?;
        }
        txn.commit().context(CommitSnafu)
    }

    fn delete(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let txn = self.begin_write()?;
        let removed = {
            let mut t = txn.open_table(definition(table)).context(OpenTableSnafu { table })?;
            let removed = t.remove(key).context(StorageSnafu { table })?;
            removed.map(|v| v.value().to_vec())
        };
        txn.commit().context(CommitSnafu)?;
        Ok(removed)
    }

    fn for_each(&self, table: Table, visit: &mut Visitor<'_>) -> Result<()> {
        let txn = self.db.begin_read().context(TransactionSnafu)?;
        let t = txn.open_table(definition(table)).context(OpenTableSnafu { table })?;
        for entry in t.iter().context(StorageSnafu { table })? {
            let (key, value) = entry.context(StorageSnafu { table })?;
            visit(key.value(), value.value())?;
        }
        Ok(())
    }

    fn last_key(&self, table: Table) -> Result<Option<Vec<u8>>> {
        let txn = self.db.begin_read().context(TransactionSnafu)?;
        let t = txn.open_table(definition(table)).context(OpenTableSnafu { table })?;
        let last = t.last().context(StorageSnafu { table })?;
        Ok(last.map(|(k, _)| k.value().to_vec()))
    }

    fn len(&self, table: Table) -> Result<u64> {
        let txn = self.db.begin_read().context(TransactionSnafu)?;
        let t = txn.open_table(definition(table)).context(OpenTableSnafu { table })?;
        t.len().context(StorageSnafu { table })
    }
}
