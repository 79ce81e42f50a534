//! Store of verbatim source records.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
};

use snafu::ResultExt;
use taxostage_types::{Issue, VerbatimKey, VerbatimRecord, codec};

use crate::{
    backend::KvBackend,
    error::{CodecSnafu, CorruptedKeySnafu, Result},
    issues::IssueSink,
    tables::Table,
};

const TABLE: Table = Table::Verbatim;

/// Verbatim records keyed by a `u32` sequence.
///
/// Keys are stored big-endian so scans return records in insertion order.
/// The sequence resumes after the highest stored key when reopened.
pub struct VerbatimStore {
    backend: Arc<dyn KvBackend>,
    sequence: AtomicU32,
}

impl VerbatimStore {
    /// Opens the store, resuming the key sequence.
    ///
    /// # Errors
    ///
    /// Returns a storage error, or `StoreError::CorruptedKey` if the last key
    /// is not four bytes long.
    pub fn open(backend: Arc<dyn KvBackend>) -> Result<Self> {
        let last = match backend.last_key(TABLE)? {
            Some(key) => decode_key(&key)?,
            None => 0,
        };
        Ok(Self { backend, sequence: AtomicU32::new(last) })
    }

    /// Stores a record, assigning the next sequence key if it has none.
    ///
    /// # Errors
    ///
    /// Returns a storage or codec error.
    pub fn put(&self, record: &mut VerbatimRecord) -> Result<VerbatimKey> {
        let key = match record.key {
            Some(key) => key,
            None => {
                let key = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
                record.key = Some(key);
                key
            },
        };
        let bytes = codec::encode(record).context(CodecSnafu { table: TABLE })?;
        self.backend.put(TABLE, &key.to_be_bytes(), &bytes)?;
        Ok(key)
    }

    /// Returns the record with `key`.
    ///
    /// # Errors
    ///
    /// Returns a storage or codec error.
    pub fn get(&self, key: VerbatimKey) -> Result<Option<VerbatimRecord>> {
        match self.backend.get(TABLE, &key.to_be_bytes())? {
            Some(bytes) => Ok(Some(codec::decode(&bytes).context(CodecSnafu { table: TABLE })?)),
            None => Ok(None),
        }
    }

    /// Number of stored records.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn len(&self) -> Result<u64> {
        self.backend.len(TABLE)
    }

    /// Returns true if no record is stored.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Visits every record in key order.
    ///
    /// # Errors
    ///
    /// Returns a storage or codec error, or the first error of `visit`.
    pub fn for_each(&self, mut visit: impl FnMut(VerbatimRecord) -> Result<()>) -> Result<()> {
        self.backend.for_each(TABLE, &mut |_, bytes| {
            visit(codec::decode(bytes).context(CodecSnafu { table: TABLE })?)
        })
    }

    /// All records of the given row type, in key order.
    ///
    /// # Errors
    ///
    /// Returns a storage or codec error.
    pub fn by_type(&self, row_type: &str) -> Result<Vec<VerbatimRecord>> {
        let mut records = Vec::new();
        self.for_each(|record| {
            if record.row_type.as_deref() == Some(row_type) {
                records.push(record);
            }
            Ok(())
        })?;
        Ok(records)
    }

    /// Number of records flagged with `issue`.
    ///
    /// # Errors
    ///
    /// Returns a storage or codec error.
    pub fn count_issue(&self, issue: Issue) -> Result<usize> {
        let mut count = 0;
        self.for_each(|record| {
            count += usize::from(record.has_issue(issue));
            Ok(())
        })?;
        Ok(count)
    }
}

impl IssueSink for VerbatimStore {
    fn add_issues(&self, key: VerbatimKey, issues: &[Issue]) -> Result<()> {
        let Some(mut record) = self.get(key)? else {
            tracing::debug!(key, "Issue flagged on unknown verbatim record");
            return Ok(());
        };
        let before = record.issues.len();
        record.issues.extend(issues.iter().copied());
        if record.issues.len() != before {
            self.put(&mut record)?;
        }
        Ok(())
    }
}

impl fmt::Debug for VerbatimStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerbatimStore")
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

fn decode_key(key: &[u8]) -> Result<VerbatimKey> {
    let bytes: [u8; 4] = key.try_into().map_err(|_| {
        CorruptedKeySnafu { table: TABLE, message: format!("expected 4 bytes, got {}", key.len()) }
            .build()
    })?;
    Ok(u32::from_be_bytes(bytes))
}
