//! Generic object store for one entity kind.

use std::{
    fmt,
    marker::PhantomData,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use snafu::{OptionExt, ResultExt};
use taxostage_types::{IdGenerator, Issue, Record};

use crate::{
    backend::KvBackend,
    codec::{Codec, PostcardCodec},
    error::{CodecSnafu, CorruptedKeySnafu, MissingIdSnafu, Result},
    issues::IssueSink,
    tables::Table,
};

/// Durable map from record id to record for one entity kind.
///
/// Duplicate ids follow a first-writer-wins policy: [`create`](Self::create)
/// refuses to overwrite, flags `IdNotUnique` on the verbatim records of both
/// the stored and the incoming record, and counts the conflict.
pub struct MapStore<T, C = PostcardCodec> {
    kind: &'static str,
    table: Table,
    backend: Arc<dyn KvBackend>,
    codec: C,
    ids: Arc<IdGenerator>,
    issues: Option<Arc<dyn IssueSink>>,
    duplicates: AtomicU64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> MapStore<T, PostcardCodec>
where
    T: Record,
    PostcardCodec: Codec<T>,
{
    /// Creates a store over `table` using postcard encoding.
    pub fn new(
        kind: &'static str,
        table: Table,
        backend: Arc<dyn KvBackend>,
        ids: Arc<IdGenerator>,
    ) -> Self {
        Self::with_codec(kind, table, backend, ids, PostcardCodec)
    }
}

impl<T: Record, C: Codec<T>> MapStore<T, C> {
    /// Creates a store over `table` using a custom codec.
    pub fn with_codec(
        kind: &'static str,
        table: Table,
        backend: Arc<dyn KvBackend>,
        ids: Arc<IdGenerator>,
        codec: C,
    ) -> Self {
        Self {
            kind,
            table,
            backend,
            codec,
            ids,
            issues: None,
            duplicates: AtomicU64::new(0),
            _marker: PhantomData,
        }
    }

    /// Routes duplicate-id issues to `sink`.
    #[must_use]
    pub fn with_issue_sink(mut self, sink: Arc<dyn IssueSink>) -> Self {
        self.issues = Some(sink);
        self
    }

    /// Entity kind stored here, e.g. `"name"`.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// The id generator used for records without an id.
    pub fn id_generator(&self) -> &Arc<IdGenerator> {
        &self.ids
    }

    /// Number of rejected duplicate creates.
    pub fn duplicates(&self) -> u64 {
        self.duplicates.load(Ordering::Relaxed)
    }

    /// Stores a new record, assigning an id if it has none.
    ///
    /// Returns `false` and leaves the stored record untouched if the id is
    /// already in use.
    ///
    /// # Errors
    ///
    /// Returns a storage or codec error.
    pub fn create(&self, record: &mut T) -> Result<bool> {
        let id = match record.id() {
            Some(id) => id.to_string(),
            None => {
                let id = self.ids.next();
                record.set_id(Some(id.clone()));
                id
            },
        };

        if let Some(existing) = self.get(&id)? {
            self.duplicates.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(kind = self.kind, id = %id, "Duplicate record id, keeping first record");
            if let Some(sink) = &self.issues {
                sink.flag(existing.verbatim_key(), Issue::IdNotUnique)?;
                sink.flag(record.verbatim_key(), Issue::IdNotUnique)?;
            }
            return Ok(false);
        }

        self.put(&id, record)?;
        Ok(true)
    }

    /// Overwrites the stored record with the same id.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::MissingId` if the record has no id, or a storage
    /// or codec error.
    pub fn update(&self, record: &T) -> Result<()> {
        let id = record.id().context(MissingIdSnafu { kind: self.kind })?;
        self.put(id, record)
    }

    /// Stores `record` under `id` without any duplicate check.
    ///
    /// # Errors
    ///
    /// Returns a storage or codec error.
    pub fn put(&self, id: &str, record: &T) -> Result<()> {
        let bytes = self.codec.encode(record).context(CodecSnafu { table: self.table })?;
        self.backend.put(self.table, id.as_bytes(), &bytes)
    }

    /// Returns the record with `id`.
    ///
    /// # Errors
    ///
    /// Returns a storage or codec error.
    pub fn get(&self, id: &str) -> Result<Option<T>> {
        match self.backend.get(self.table, id.as_bytes())? {
            Some(bytes) => self.decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Removes and returns the record with `id`.
    ///
    /// # Errors
    ///
    /// Returns a storage or codec error.
    pub fn delete(&self, id: &str) -> Result<Option<T>> {
        match self.backend.delete(self.table, id.as_bytes())? {
            Some(bytes) => self.decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Returns true if a record with `id` exists.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn contains(&self, id: &str) -> Result<bool> {
        self.backend.contains(self.table, id.as_bytes())
    }

    /// Number of stored records.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn len(&self) -> Result<u64> {
        self.backend.len(self.table)
    }

    /// Returns true if the store holds no record.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Visits every record in id order.
    ///
    /// # Errors
    ///
    /// Returns a storage or codec error, or the first error of `visit`.
    pub fn for_each(&self, mut visit: impl FnMut(T) -> Result<()>) -> Result<()> {
        self.backend.for_each(self.table, &mut |_, bytes| visit(self.decode(bytes)?))
    }

    /// All records in id order.
    ///
    /// # Errors
    ///
    /// Returns a storage or codec error.
    pub fn values(&self) -> Result<Vec<T>> {
        let mut values = Vec::new();
        self.for_each(|record| {
            values.push(record);
            Ok(())
        })?;
        Ok(values)
    }

    /// All record ids in order.
    ///
    /// # Errors
    ///
    /// Returns a storage error, or `StoreError::CorruptedKey` for a non UTF-8 key.
    pub fn ids(&self) -> Result<Vec<String>> {
        let table = self.table;
        let mut ids = Vec::new();
        self.backend.for_each(table, &mut |key, _| {
            let id = std::str::from_utf8(key)
                .map_err(|e| CorruptedKeySnafu { table, message: e.to_string() }.build())?;
            ids.push(id.to_string());
            Ok(())
        })?;
        Ok(ids)
    }

    /// Moves the record stored under `old` to `new`, updating its id.
    ///
    /// Returns the moved record, or `None` if `old` does not exist.
    ///
    /// # Errors
    ///
    /// Returns a storage or codec error.
    pub fn rekey(&self, old: &str, new: &str) -> Result<Option<T>> {
        let Some(mut record) = self.delete(old)? else {
            return Ok(None);
        };
        record.set_id(Some(new.to_string()));
        self.put(new, &record)?;
        Ok(Some(record))
    }

    fn decode(&self, bytes: &[u8]) -> Result<T> {
        self.codec.decode(bytes).context(CodecSnafu { table: self.table })
    }
}

impl<T, C> fmt::Debug for MapStore<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapStore")
            .field("kind", &self.kind)
            .field("table", &self.table)
            .field("duplicates", &self.duplicates.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use parking_lot::Mutex;
    use taxostage_types::{Name, Rank, VerbatimKey};

    use super::*;
    use crate::backend::MemoryBackend;

    #[derive(Debug, Default)]
    struct RecordingSink(Mutex<Vec<(VerbatimKey, Issue)>>);

    impl IssueSink for RecordingSink {
        fn add_issues(&self, key: VerbatimKey, issues: &[Issue]) -> Result<()> {
            self.0.lock().extend(issues.iter().map(|i| (key, *i)));
            Ok(())
        }
    }

    fn name_store() -> (MapStore<Name>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let store = MapStore::new(
            "name",
            Table::Names,
            Arc::new(MemoryBackend::new()),
            Arc::new(IdGenerator::default()),
        )
        .with_issue_sink(sink.clone());
        (store, sink)
    }

    #[test]
    fn test_create_assigns_temporary_id() {
        let (store, _) = name_store();
        let mut name = Name::new("Abies alba", Rank::Species);
        assert!(store.create(&mut name).unwrap());
        assert_eq!(name.id.as_deref(), Some("~1"));
        assert_eq!(store.get("~1").unwrap(), Some(name));
    }

    #[test]
    fn test_duplicate_id_keeps_first_and_flags_both() {
        let (store, sink) = name_store();
        let mut first = Name::new("Abies alba", Rank::Species).with_id("n1");
        first.verbatim_key = Some(1);
        let mut second = Name::new("Pinus picea", Rank::Species).with_id("n1");
        second.verbatim_key = Some(2);

        assert!(store.create(&mut first).unwrap());
        assert!(!store.create(&mut second).unwrap());

        assert_eq!(store.get("n1").unwrap().unwrap().scientific_name, "Abies alba");
        assert_eq!(store.duplicates(), 1);
        assert_eq!(*sink.0.lock(), vec![(1, Issue::IdNotUnique), (2, Issue::IdNotUnique)]);
    }

    #[test]
    fn test_update_requires_id() {
        let (store, _) = name_store();
        let result = store.update(&Name::new("Abies alba", Rank::Species));
        assert!(matches!(result, Err(crate::StoreError::MissingId { kind: "name" })));
    }

    #[test]
    fn test_delete_and_contains() {
        let (store, _) = name_store();
        let mut name = Name::new("Abies alba", Rank::Species).with_id("n1");
        store.create(&mut name).unwrap();
        assert!(store.contains("n1").unwrap());
        assert_eq!(store.delete("n1").unwrap().map(|n| n.scientific_name), Some("Abies alba".into()));
        assert!(!store.contains("n1").unwrap());
        assert!(store.delete("n1").unwrap().is_none());
    }

    #[test]
    fn test_values_and_ids_in_order() {
        let (store, _) = name_store();
        for id in ["b", "a", "c"] {
            store.create(&mut Name::new(id, Rank::Genus).with_id(id)).unwrap();
        }
        assert_eq!(store.ids().unwrap(), ["a", "b", "c"]);
        let names: Vec<_> = store.values().unwrap().into_iter().map(|n| n.scientific_name).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert_eq!(store.len().unwrap(), 3);
    }

    #[test]
    fn test_rekey_moves_record() {
        let (store, _) = name_store();
        let mut name = Name::new("Abies", Rank::Genus);
        store.create(&mut name).unwrap();

        let moved = store.rekey("~1", "x1").unwrap().unwrap();
        assert_eq!(moved.id.as_deref(), Some("x1"));
        assert!(store.get("~1").unwrap().is_none());
        assert_eq!(store.get("x1").unwrap().unwrap().id.as_deref(), Some("x1"));
        assert!(store.rekey("missing", "x2").unwrap().is_none());
    }
}
