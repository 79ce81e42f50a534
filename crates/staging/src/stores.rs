//! Name and usage stores layering the object store and the graph.
//!
//! Creating a record here also creates its node, and the name store keeps a
//! secondary index from normalized scientific name to name nodes.

use std::{collections::BTreeSet, sync::Arc};

use taxostage_graph::{GraphWrite, Label, LabelSet, NodeId, NodeProps, NodeRef, RelType};
use taxostage_store::{IssueSink, KvBackend, MapStore, SetIndex, Table};
use taxostage_types::{IdGenerator, Record, normalize::name_key};

use crate::{
    error::Result,
    model::{StagedName, StagedUsage},
};

// ============================================================================
// Names
// ============================================================================

/// Name records, their nodes and the scientific name index.
#[derive(Debug)]
pub struct NameStore {
    records: MapStore<StagedName>,
    index: SetIndex,
}

impl NameStore {
    pub(crate) fn new(
        backend: Arc<dyn KvBackend>,
        ids: Arc<IdGenerator>,
        issues: Arc<dyn IssueSink>,
    ) -> Self {
        Self {
            records: MapStore::new("name", Table::Names, Arc::clone(&backend), ids)
                .with_issue_sink(issues),
            index: SetIndex::new(Table::NameIndex, backend),
        }
    }

    /// Stores the name and creates its node with `labels` added to `NAME`.
    ///
    /// Assigns an id if the name has none. Returns `None` without creating a
    /// node if the id is taken; the conflict is flagged on both records.
    ///
    /// # Errors
    ///
    /// Returns a storage or graph error.
    pub fn create(
        &self,
        w: &mut dyn GraphWrite,
        name: &mut StagedName,
        labels: LabelSet,
    ) -> Result<Option<NodeRef>> {
        let id = match name.id() {
            Some(id) => id.to_string(),
            None => {
                let id = self.records.id_generator().next();
                name.set_id(Some(id.clone()));
                id
            },
        };
        if self.records.contains(&id)? {
            self.records.create(name)?;
            return Ok(None);
        }

        let node = w.create_node(LabelSet::of(Label::Name).union(labels), name.node_props())?;
        name.node = Some(node.id());
        self.records.put(&id, name)?;
        self.index.add(&name_key(&name.name.scientific_name), node.id().value())?;
        Ok(Some(node))
    }

    /// Overwrites a stored name, moving its index entry if the scientific
    /// name changed.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::MissingId` for a name without id, or a storage error.
    pub fn update(&self, name: &StagedName) -> Result<()> {
        if let (Some(id), Some(node)) = (name.id(), name.node) {
            if let Some(previous) = self.records.get(id)? {
                let old_key = name_key(&previous.name.scientific_name);
                let new_key = name_key(&name.name.scientific_name);
                if old_key != new_key {
                    self.index.remove(&old_key, node.value())?;
                    self.index.add(&new_key, node.value())?;
                }
            }
        }
        self.records.update(name)?;
        Ok(())
    }

    /// Returns the name with `id`.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn get(&self, id: &str) -> Result<Option<StagedName>> {
        Ok(self.records.get(id)?)
    }

    /// Removes the name with `id` and its index entry. The node is left to
    /// the caller.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn delete(&self, id: &str) -> Result<Option<StagedName>> {
        let removed = self.records.delete(id)?;
        if let Some(StagedName { name, node: Some(node) }) = &removed {
            self.index.remove(&name_key(&name.scientific_name), node.value())?;
        }
        Ok(removed)
    }

    /// Returns true if a name with `id` exists.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.records.contains(id)?)
    }

    /// Name nodes whose normalized scientific name equals that of
    /// `scientific_name`.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn nodes_by_name(&self, scientific_name: &str) -> Result<BTreeSet<NodeId>> {
        let ids = self.index.get(&name_key(scientific_name))?;
        Ok(ids.into_iter().map(NodeId::new).collect())
    }

    /// All names in id order.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn values(&self) -> Result<Vec<StagedName>> {
        Ok(self.records.values()?)
    }

    /// All name ids in order.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn ids(&self) -> Result<Vec<String>> {
        Ok(self.records.ids()?)
    }

    /// Number of stored names.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn len(&self) -> Result<u64> {
        Ok(self.records.len()?)
    }

    /// Returns true if no name is stored.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.records.is_empty()?)
    }

    /// Number of rejected duplicate ids.
    pub fn duplicates(&self) -> u64 {
        self.records.duplicates()
    }

    pub(crate) fn rekey(&self, old: &str, new: &str) -> Result<Option<StagedName>> {
        Ok(self.records.rekey(old, new)?)
    }

    pub(crate) fn put(&self, name: &StagedName) -> Result<()> {
        self.records.update(name)?;
        Ok(())
    }
}

// ============================================================================
// Usages
// ============================================================================

/// Usage records and their nodes.
#[derive(Debug)]
pub struct UsageStore {
    records: MapStore<StagedUsage>,
}

impl UsageStore {
    pub(crate) fn new(
        backend: Arc<dyn KvBackend>,
        ids: Arc<IdGenerator>,
        issues: Arc<dyn IssueSink>,
    ) -> Self {
        Self {
            records: MapStore::new("usage", Table::Usages, backend, ids).with_issue_sink(issues),
        }
    }

    /// Stores the usage, creates its node and links it to `name_node`.
    ///
    /// The node is labelled `SYNONYM` or `TAXON` by status. Returns `None`
    /// without creating a node if the id is taken; the conflict is flagged on
    /// both records.
    ///
    /// # Errors
    ///
    /// Returns a storage or graph error.
    pub fn create(
        &self,
        w: &mut dyn GraphWrite,
        usage: &mut StagedUsage,
        name_node: NodeId,
    ) -> Result<Option<NodeRef>> {
        let id = match usage.id() {
            Some(id) => id.to_string(),
            None => {
                let id = self.records.id_generator().next();
                usage.set_id(Some(id.clone()));
                id
            },
        };
        if self.records.contains(&id)? {
            self.records.create(usage)?;
            return Ok(None);
        }

        let label = if usage.is_synonym() { Label::Synonym } else { Label::Taxon };
        let node = w.create_node(LabelSet::of(label), NodeProps::with_id(id.as_str()))?;
        w.create_edge(node.id(), name_node, RelType::HasName, Default::default())?;
        usage.node = Some(node.id());
        usage.name_node = Some(name_node);
        self.records.put(&id, usage)?;
        Ok(Some(node))
    }

    /// Overwrites a stored usage.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::MissingId` for a usage without id, or a storage error.
    pub fn update(&self, usage: &StagedUsage) -> Result<()> {
        self.records.update(usage)?;
        Ok(())
    }

    /// Returns the usage with `id`.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn get(&self, id: &str) -> Result<Option<StagedUsage>> {
        Ok(self.records.get(id)?)
    }

    /// Removes the usage with `id`. The node is left to the caller.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn delete(&self, id: &str) -> Result<Option<StagedUsage>> {
        Ok(self.records.delete(id)?)
    }

    /// Returns true if a usage with `id` exists.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.records.contains(id)?)
    }

    /// All usages in id order.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn values(&self) -> Result<Vec<StagedUsage>> {
        Ok(self.records.values()?)
    }

    /// All usage ids in order.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn ids(&self) -> Result<Vec<String>> {
        Ok(self.records.ids()?)
    }

    /// Number of stored usages.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn len(&self) -> Result<u64> {
        Ok(self.records.len()?)
    }

    /// Returns true if no usage is stored.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.records.is_empty()?)
    }

    /// Number of rejected duplicate ids.
    pub fn duplicates(&self) -> u64 {
        self.records.duplicates()
    }

    pub(crate) fn rekey(&self, old: &str, new: &str) -> Result<Option<StagedUsage>> {
        Ok(self.records.rekey(old, new)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use taxostage_graph::{Direction, GraphDb};
    use taxostage_store::{MemoryBackend, VerbatimStore};
    use taxostage_test_utils::{TestDir, fixtures};
    use taxostage_types::{Name, Rank};

    use super::*;

    struct Fixture {
        _dir: TestDir,
        graph: GraphDb,
        names: NameStore,
        usages: UsageStore,
    }

    fn fixture() -> Fixture {
        let dir = TestDir::new();
        let graph = GraphDb::open(dir.graph_file(), false).unwrap();
        let backend: Arc<dyn KvBackend> = Arc::new(MemoryBackend::new());
        let ids = Arc::new(IdGenerator::default());
        let verbatim = Arc::new(VerbatimStore::open(Arc::clone(&backend)).unwrap());
        Fixture {
            names: NameStore::new(Arc::clone(&backend), Arc::clone(&ids), verbatim.clone()),
            usages: UsageStore::new(backend, ids, verbatim),
            graph,
            _dir: dir,
        }
    }

    #[test]
    fn test_name_create_indexes_node() {
        let f = fixture();
        let mut tx = f.graph.begin().unwrap();
        let mut name = StagedName::new(fixtures::species("Abies  alba", "Mill."));
        let node = f.names.create(&mut tx, &mut name, LabelSet::EMPTY).unwrap().unwrap();
        tx.commit().unwrap();

        assert_eq!(name.name.id.as_deref(), Some("~1"));
        assert_eq!(name.node, Some(node.id()));
        assert_eq!(f.names.nodes_by_name("Abies alba").unwrap(), BTreeSet::from([node.id()]));
        assert_eq!(f.names.get("~1").unwrap().unwrap().node, Some(node.id()));
    }

    #[test]
    fn test_duplicate_name_creates_no_node() {
        let f = fixture();
        let mut tx = f.graph.begin().unwrap();
        let mut first = StagedName::new(Name::new("Abies alba", Rank::Species).with_id("n1"));
        let mut second = StagedName::new(Name::new("Pinus picea", Rank::Species).with_id("n1"));
        assert!(f.names.create(&mut tx, &mut first, LabelSet::EMPTY).unwrap().is_some());
        assert!(f.names.create(&mut tx, &mut second, LabelSet::EMPTY).unwrap().is_none());

        assert_eq!(tx.nodes_with_label(Label::Name).len(), 1);
        assert_eq!(f.names.duplicates(), 1);
        assert!(f.names.nodes_by_name("Pinus picea").unwrap().is_empty());
    }

    #[test]
    fn test_name_update_moves_index_entry() {
        let f = fixture();
        let mut tx = f.graph.begin().unwrap();
        let mut name = StagedName::new(Name::new("Abies alba", Rank::Species).with_id("n1"));
        let node = f.names.create(&mut tx, &mut name, LabelSet::EMPTY).unwrap().unwrap().id();

        name.name.scientific_name = "Abies nordmanniana".to_string();
        f.names.update(&name).unwrap();
        assert!(f.names.nodes_by_name("Abies alba").unwrap().is_empty());
        assert!(f.names.nodes_by_name("Abies nordmanniana").unwrap().contains(&node));

        f.names.delete("n1").unwrap().unwrap();
        assert!(f.names.nodes_by_name("Abies nordmanniana").unwrap().is_empty());
    }

    #[test]
    fn test_usage_create_links_name() {
        let f = fixture();
        let mut tx = f.graph.begin().unwrap();
        let mut name = StagedName::new(Name::new("Pinus picea", Rank::Species).with_id("n1"));
        let name_node = f.names.create(&mut tx, &mut name, LabelSet::EMPTY).unwrap().unwrap().id();

        let mut usage = StagedUsage::new(fixtures::synonym("u1", "Pinus picea"));
        usage.usage.name = None;
        let node = f.usages.create(&mut tx, &mut usage, name_node).unwrap().unwrap().id();

        assert!(tx.has_label(node, Label::Synonym).unwrap());
        let edge = tx.single_edge(node, RelType::HasName, Direction::Outgoing).unwrap().unwrap();
        assert_eq!(edge.end, name_node);
        let stored = f.usages.get("u1").unwrap().unwrap();
        assert_eq!(stored.node, Some(node));
        assert_eq!(stored.name_node, Some(name_node));
    }
}
