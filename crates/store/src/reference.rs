//! Reference store with citation deduplication.
//!
//! Equivalent citations from different source rows are collapsed into one
//! record: the first record claiming a normalized citation becomes the
//! canonical one and later ids are kept as aliases that resolve to it.

use std::sync::Arc;

use taxostage_types::{IdGenerator, Issue, Record, Reference, normalize::normalize_citation};

use crate::{
    backend::KvBackend,
    error::{CorruptedKeySnafu, Result},
    issues::IssueSink,
    map_store::MapStore,
    tables::Table,
};

/// Object store for [`Reference`] records plus a normalized-citation index.
#[derive(Debug)]
pub struct ReferenceStore {
    records: MapStore<Reference>,
    backend: Arc<dyn KvBackend>,
    issues: Option<Arc<dyn IssueSink>>,
}

impl ReferenceStore {
    /// Creates the store.
    pub fn new(
        backend: Arc<dyn KvBackend>,
        ids: Arc<IdGenerator>,
        issues: Option<Arc<dyn IssueSink>>,
    ) -> Self {
        let mut records = MapStore::new("reference", Table::References, Arc::clone(&backend), ids);
        if let Some(sink) = &issues {
            records = records.with_issue_sink(Arc::clone(sink));
        }
        Self { records, backend, issues }
    }

    /// Stores a reference, collapsing it into an existing one with an
    /// equivalent citation.
    ///
    /// Returns `false` only for a duplicate id. A collapsed reference keeps
    /// its own id as an alias of the canonical record.
    ///
    /// # Errors
    ///
    /// Returns a storage or codec error.
    pub fn create(&self, reference: &mut Reference) -> Result<bool> {
        if reference.id.is_none() {
            reference.set_id(Some(self.records.id_generator().next()));
        }
        let key = self.citation_key(reference)?;

        if let (Some(key), Some(id)) = (&key, reference.id.as_deref()) {
            if let Some(canonical) = self.lookup_citation(key)? {
                if canonical != id && !self.records.contains(id)? {
                    tracing::debug!(alias = %id, canonical = %canonical, "Collapsed duplicate citation");
                    self.backend.put(Table::ReferenceAliases, id.as_bytes(), canonical.as_bytes())?;
                    return Ok(true);
                }
            }
        }

        if !self.records.create(reference)? {
            return Ok(false);
        }
        if let (Some(key), Some(id)) = (key, reference.id.as_deref()) {
            self.backend.put(Table::ReferenceCitations, key.as_bytes(), id.as_bytes())?;
        }
        Ok(true)
    }

    /// Overwrites a stored reference and re-indexes its citation.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::MissingId` if the reference has no id, or a
    /// storage or codec error.
    pub fn update(&self, reference: &Reference) -> Result<()> {
        if let Some(id) = reference.id.as_deref() {
            if let Some(previous) = self.records.get(id)? {
                self.unindex(&previous)?;
            }
        }
        self.records.update(reference)?;
        if let (Some(key), Some(id)) = (self.citation_key(reference)?, reference.id.as_deref()) {
            if self.lookup_citation(&key)?.is_none() {
                self.backend.put(Table::ReferenceCitations, key.as_bytes(), id.as_bytes())?;
            }
        }
        Ok(())
    }

    /// Returns the reference with `id`, following aliases.
    ///
    /// # Errors
    ///
    /// Returns a storage or codec error.
    pub fn get(&self, id: &str) -> Result<Option<Reference>> {
        match self.canonical_id(id)? {
            Some(canonical) => self.records.get(&canonical),
            None => Ok(None),
        }
    }

    /// Resolves `id` to the id of the stored record it stands for.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn canonical_id(&self, id: &str) -> Result<Option<String>> {
        if self.records.contains(id)? {
            return Ok(Some(id.to_string()));
        }
        self.read_string(Table::ReferenceAliases, id)
    }

    /// Removes the reference with `id` and its citation entry.
    ///
    /// Aliases of the removed record are dropped as well.
    ///
    /// # Errors
    ///
    /// Returns a storage or codec error.
    pub fn delete(&self, id: &str) -> Result<Option<Reference>> {
        let Some(removed) = self.records.delete(id)? else {
            return Ok(None);
        };
        self.unindex(&removed)?;
        for alias in self.aliases_of(id)? {
            self.backend.delete(Table::ReferenceAliases, alias.as_bytes())?;
        }
        Ok(Some(removed))
    }

    /// Returns true if `id` resolves to a reference.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.canonical_id(id)?.is_some())
    }

    /// Finds the reference whose normalized citation equals that of `citation`.
    ///
    /// # Errors
    ///
    /// Returns a storage or codec error.
    pub fn by_citation(&self, citation: &str) -> Result<Option<Reference>> {
        let Some(key) = normalize_citation(citation) else {
            return Ok(None);
        };
        match self.lookup_citation(&key)? {
            Some(id) => self.records.get(&id),
            None => Ok(None),
        }
    }

    /// All stored references in id order; aliases are not repeated.
    ///
    /// # Errors
    ///
    /// Returns a storage or codec error.
    pub fn values(&self) -> Result<Vec<Reference>> {
        self.records.values()
    }

    /// All stored reference ids, aliases excluded.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn ids(&self) -> Result<Vec<String>> {
        self.records.ids()
    }

    /// Ids kept as aliases of a canonical reference.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn alias_ids(&self) -> Result<Vec<String>> {
        let mut aliases = Vec::new();
        self.backend.for_each(Table::ReferenceAliases, &mut |alias, _| {
            aliases.push(utf8(Table::ReferenceAliases, alias)?);
            Ok(())
        })?;
        Ok(aliases)
    }

    /// Number of rejected duplicate ids.
    pub fn duplicates(&self) -> u64 {
        self.records.duplicates()
    }

    /// Moves the reference stored under `old` to `new`, keeping the citation
    /// index and aliases pointing at it.
    ///
    /// # Errors
    ///
    /// Returns a storage or codec error.
    pub fn rekey(&self, old: &str, new: &str) -> Result<Option<Reference>> {
        let Some(moved) = self.records.rekey(old, new)? else {
            return Ok(None);
        };
        if let Some(key) = self.citation_key(&moved)? {
            if self.lookup_citation(&key)?.as_deref() == Some(old) {
                self.backend.put(Table::ReferenceCitations, key.as_bytes(), new.as_bytes())?;
            }
        }
        for alias in self.aliases_of(old)? {
            self.backend.put(Table::ReferenceAliases, alias.as_bytes(), new.as_bytes())?;
        }
        Ok(Some(moved))
    }

    /// Renames the alias `old` to `new`, keeping its canonical target.
    ///
    /// Returns false if `old` is not an alias.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn rekey_alias(&self, old: &str, new: &str) -> Result<bool> {
        let Some(canonical) = self.backend.delete(Table::ReferenceAliases, old.as_bytes())? else {
            return Ok(false);
        };
        self.backend.put(Table::ReferenceAliases, new.as_bytes(), &canonical)?;
        Ok(true)
    }

    fn citation_key(&self, reference: &Reference) -> Result<Option<String>> {
        let Some(citation) = reference.citation.as_deref() else {
            return Ok(None);
        };
        let key = normalize_citation(citation);
        if key.is_none() && !citation.trim().is_empty() {
            if let Some(sink) = &self.issues {
                sink.flag(reference.verbatim_key(), Issue::CitationUnparsed)?;
            }
        }
        Ok(key)
    }

    fn lookup_citation(&self, key: &str) -> Result<Option<String>> {
        self.read_string(Table::ReferenceCitations, key)
    }

    fn unindex(&self, reference: &Reference) -> Result<()> {
        let (Some(citation), Some(id)) = (reference.citation.as_deref(), reference.id.as_deref())
        else {
            return Ok(());
        };
        if let Some(key) = normalize_citation(citation) {
            if self.lookup_citation(&key)?.as_deref() == Some(id) {
                self.backend.delete(Table::ReferenceCitations, key.as_bytes())?;
            }
        }
        Ok(())
    }

    fn aliases_of(&self, canonical: &str) -> Result<Vec<String>> {
        let mut aliases = Vec::new();
        self.backend.for_each(Table::ReferenceAliases, &mut |alias, target| {
            if target == canonical.as_bytes() {
                aliases.push(utf8(Table::ReferenceAliases, alias)?);
            }
            Ok(())
        })?;
        Ok(aliases)
    }

    fn read_string(&self, table: Table, key: &str) -> Result<Option<String>> {
        match self.backend.get(table, key.as_bytes())? {
            Some(bytes) => utf8(table, &bytes).map(Some),
            None => Ok(None),
        }
    }
}

fn utf8(table: Table, bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| CorruptedKeySnafu { table, message: e.to_string() }.build())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use proptest::prelude::*;
    use taxostage_test_utils::strategies::arb_citation;

    use super::*;
    use crate::backend::MemoryBackend;

    fn store() -> ReferenceStore {
        ReferenceStore::new(Arc::new(MemoryBackend::new()), Arc::new(IdGenerator::default()), None)
    }

    #[test]
    fn test_same_citation_collapses_into_one_entry() {
        let refs = store();
        let mut r1 = Reference::new("r1", "Mill., 1768, Sp. Pl.");
        let mut r2 = Reference::new("r2", "Mill., 1768, Sp. Pl.");
        assert!(refs.create(&mut r1).unwrap());
        assert!(refs.create(&mut r2).unwrap());

        assert_eq!(refs.values().unwrap().len(), 1);
        let found = refs.by_citation("Mill., 1768, Sp. Pl.").unwrap().unwrap();
        assert_eq!(found.id.as_deref(), Some("r1"));
        assert_eq!(refs.get("r2").unwrap().unwrap().id.as_deref(), Some("r1"));
        assert_eq!(refs.canonical_id("r2").unwrap().as_deref(), Some("r1"));
    }

    #[test]
    fn test_citation_lookup_is_normalized() {
        let refs = store();
        refs.create(&mut Reference::new("r1", "Mill., 1768, Sp. Pl.")).unwrap();
        let found = refs.by_citation("MILL 1768 Sp Pl").unwrap();
        assert_eq!(found.and_then(|r| r.id).as_deref(), Some("r1"));
        assert!(refs.by_citation("L., 1753, Sp. Pl.").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let refs = store();
        assert!(refs.create(&mut Reference::new("r1", "L., 1753")).unwrap());
        assert!(!refs.create(&mut Reference::new("r1", "Mill., 1768")).unwrap());
        assert_eq!(refs.duplicates(), 1);
        assert!(refs.by_citation("Mill., 1768").unwrap().is_none());
    }

    #[test]
    fn test_update_reindexes_citation() {
        let refs = store();
        let mut r = Reference::new("r1", "L., 1753");
        refs.create(&mut r).unwrap();
        r.citation = Some("Linnaeus 1753".to_string());
        refs.update(&r).unwrap();

        assert!(refs.by_citation("L., 1753").unwrap().is_none());
        assert!(refs.by_citation("linnaeus, 1753").unwrap().is_some());
    }

    #[test]
    fn test_delete_drops_index_and_aliases() {
        let refs = store();
        refs.create(&mut Reference::new("r1", "L., 1753")).unwrap();
        refs.create(&mut Reference::new("r2", "L. 1753")).unwrap();
        assert!(refs.contains("r2").unwrap());

        refs.delete("r1").unwrap().unwrap();
        assert!(refs.by_citation("L., 1753").unwrap().is_none());
        assert!(!refs.contains("r2").unwrap());
    }

    #[test]
    fn test_rekey_follows_index_and_aliases() {
        let refs = store();
        let mut r = Reference { citation: Some("L., 1753".into()), ..Reference::default() };
        refs.create(&mut r).unwrap();
        refs.create(&mut Reference::new("alias", "L. 1753")).unwrap();

        refs.rekey("~1", "x1").unwrap().unwrap();
        assert_eq!(refs.by_citation("L., 1753").unwrap().unwrap().id.as_deref(), Some("x1"));
        assert_eq!(refs.canonical_id("alias").unwrap().as_deref(), Some("x1"));
    }

    #[test]
    fn test_rekey_alias_keeps_canonical_target() {
        let refs = store();
        refs.create(&mut Reference::new("r1", "L., 1753")).unwrap();
        refs.create(&mut Reference::new("~2", "L. 1753")).unwrap();
        assert_eq!(refs.alias_ids().unwrap(), ["~2"]);

        assert!(refs.rekey_alias("~2", "x2").unwrap());
        assert!(!refs.rekey_alias("~2", "x3").unwrap());
        assert!(!refs.rekey_alias("r1", "x4").unwrap());
        assert_eq!(refs.alias_ids().unwrap(), ["x2"]);
        assert_eq!(refs.canonical_id("x2").unwrap().as_deref(), Some("r1"));
        assert!(!refs.contains("~2").unwrap());
    }

    #[test]
    fn test_reference_without_citation() {
        let refs = store();
        let mut r = Reference::default();
        assert!(refs.create(&mut r).unwrap());
        assert_eq!(r.id.as_deref(), Some("~1"));
        assert!(refs.get("~1").unwrap().is_some());
    }

    proptest! {
        #[test]
        fn prop_case_and_punctuation_variants_collapse(citation in arb_citation()) {
            let refs = store();
            let variant = citation.to_uppercase().replace(", ", " ;  ");
            refs.create(&mut Reference::new("r1", citation.as_str())).unwrap();
            refs.create(&mut Reference::new("r2", variant.as_str())).unwrap();

            prop_assert_eq!(refs.ids().unwrap(), vec!["r1".to_string()]);
            let found = refs.by_citation(&variant).unwrap().and_then(|r| r.id);
            prop_assert_eq!(found.as_deref(), Some("r1"));
        }
    }
}
