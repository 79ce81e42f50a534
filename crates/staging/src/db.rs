//! The staging engine facade.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::RwLock;
use snafu::ResultExt;
use taxostage_graph::{
    GraphDb, GraphWrite, Label, LabelSet, Mode, NodeId, NodeRef, Transaction,
};
use taxostage_store::{
    IssueSink, JournaledBackend, KvBackend, MapStore, RedbBackend, ReferenceStore, Table,
    VerbatimStore,
};
use taxostage_types::{
    IdGenerator, Issue, Record, StagingConfig, TypeMaterial, VerbatimKey, VerbatimRecord,
};

use crate::{
    error::{ConfigSnafu, IoSnafu, Result, UsageWithoutNameSnafu},
    journal::ObjectJournal,
    model::{StagedName, StagedUsage},
    pipeline::{self, CancelToken, NodeBatchProcessor, PipelineLimits},
    stores::{NameStore, UsageStore},
};

/// File name of the object store inside the staging directory.
pub const OBJECTS_FILE: &str = "objects.redb";

/// File name of the graph store inside the staging directory.
pub const GRAPH_FILE: &str = "graph.redb";

/// Staging store of one import attempt of one dataset.
///
/// Combines the object stores holding full records with the graph holding
/// one node per name and usage. Both live in one directory that is removed
/// by [`close_and_delete`](Self::close_and_delete).
///
/// The engine is single-writer. Graph access is serialized by the graph
/// store; methods taking a [`Transaction`] must not be called while another
/// transaction of the same engine is open on the same thread.
///
/// Name, usage, reference and type material writes made while a
/// transaction is open are rolled back with it. Verbatim rows and issue
/// flags are kept.
pub struct StagingDb {
    dataset_key: u32,
    attempt: u32,
    dir: PathBuf,
    config: StagingConfig,
    pub(crate) graph: GraphDb,
    pub(crate) dev_null: NodeId,
    pub(crate) verbatim: Arc<VerbatimStore>,
    pub(crate) names: NameStore,
    pub(crate) usages: UsageStore,
    pub(crate) references: ReferenceStore,
    pub(crate) type_material: MapStore<TypeMaterial>,
    pub(crate) ids: Arc<IdGenerator>,
    pub(crate) id_mapping: RwLock<HashMap<String, String>>,
    cancel: CancelToken,
}

impl StagingDb {
    /// Creates the staging directory `{scratch}/{dataset_key}/{attempt}` and
    /// opens a store in it.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the directory or
    /// store files cannot be created.
    pub fn create(
        scratch: impl AsRef<Path>,
        dataset_key: u32,
        attempt: u32,
        config: StagingConfig,
    ) -> Result<Self> {
        let dir = scratch.as_ref().join(dataset_key.to_string()).join(attempt.to_string());
        Self::open(dir, dataset_key, attempt, config)
    }

    /// Opens the store in `dir`, creating missing files.
    ///
    /// Reopening an existing directory resumes the id and verbatim key
    /// sequences after the stored records.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the store files
    /// cannot be opened.
    #[tracing::instrument(skip(dir, config), fields(dir = %dir.as_ref().display()))]
    pub fn open(
        dir: impl AsRef<Path>,
        dataset_key: u32,
        attempt: u32,
        config: StagingConfig,
    ) -> Result<Self> {
        config.validate().context(ConfigSnafu)?;
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).context(IoSnafu { path: dir.display().to_string() })?;

        let raw: Arc<dyn KvBackend> =
            Arc::new(RedbBackend::open(dir.join(OBJECTS_FILE), config.durable_commits)?);
        let journaled = Arc::new(JournaledBackend::new(Arc::clone(&raw)));
        let graph = GraphDb::open(dir.join(GRAPH_FILE), config.durable_commits)?
            .with_hooks(Arc::new(ObjectJournal::new(Arc::clone(&journaled))));
        let dev_null = graph.begin()?.dev_null();
        let ids = Arc::new(IdGenerator::new(config.temporary_id_prefix.clone()));
        let verbatim = Arc::new(VerbatimStore::open(raw)?);
        let backend: Arc<dyn KvBackend> = journaled;
        let issues: Arc<dyn IssueSink> = verbatim.clone();

        let db = Self {
            dataset_key,
            attempt,
            names: NameStore::new(Arc::clone(&backend), Arc::clone(&ids), Arc::clone(&issues)),
            usages: UsageStore::new(Arc::clone(&backend), Arc::clone(&ids), Arc::clone(&issues)),
            references: ReferenceStore::new(
                Arc::clone(&backend),
                Arc::clone(&ids),
                Some(Arc::clone(&issues)),
            ),
            type_material: MapStore::new(
                "type material",
                Table::TypeMaterial,
                backend,
                Arc::clone(&ids),
            )
            .with_issue_sink(issues),
            verbatim,
            graph,
            dev_null,
            ids,
            id_mapping: RwLock::new(HashMap::new()),
            cancel: CancelToken::new(),
            config,
            dir,
        };
        db.ids.resume_after(db.all_ids()?);

        tracing::info!(dataset = dataset_key, attempt, "Opened staging store");
        Ok(db)
    }

    /// Closes both stores, flushing pending bulk data.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::FlushFailed` if bulk data cannot be written.
    pub fn close(self) -> Result<()> {
        self.graph.close()?;
        tracing::debug!(dataset = self.dataset_key, attempt = self.attempt, "Closed staging store");
        Ok(())
    }

    /// Closes the store and deletes its directory.
    ///
    /// The directory is removed even if closing failed; the close error is
    /// returned afterwards.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be removed, or the
    /// close error.
    pub fn close_and_delete(self) -> Result<()> {
        let dir = self.dir.clone();
        let closed = self.close();
        if dir.exists() {
            std::fs::remove_dir_all(&dir).context(IoSnafu { path: dir.display().to_string() })?;
            tracing::debug!(dir = %dir.display(), "Deleted staging store");
        }
        closed
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Key of the dataset being imported.
    pub fn dataset_key(&self) -> u32 {
        self.dataset_key
    }

    /// Import attempt number.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Directory holding the store files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Active configuration.
    pub fn config(&self) -> &StagingConfig {
        &self.config
    }

    /// The graph store.
    pub fn graph(&self) -> &GraphDb {
        &self.graph
    }

    /// Name records and the name index.
    pub fn names(&self) -> &NameStore {
        &self.names
    }

    /// Usage records.
    pub fn usages(&self) -> &UsageStore {
        &self.usages
    }

    /// Reference records.
    pub fn references(&self) -> &ReferenceStore {
        &self.references
    }

    /// Type material records.
    pub fn type_material(&self) -> &MapStore<TypeMaterial> {
        &self.type_material
    }

    /// Verbatim source records.
    pub fn verbatim(&self) -> &VerbatimStore {
        &self.verbatim
    }

    /// Generator of record ids shared by all stores.
    pub fn id_generator(&self) -> &IdGenerator {
        &self.ids
    }

    /// The node standing in for related taxa outside the dataset.
    pub fn dev_null(&self) -> NodeId {
        self.dev_null
    }

    /// Token interrupting running batch traversals.
    pub fn cancellation(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Number of live graph nodes.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::WrongMode` on a closed store.
    pub fn size(&self) -> Result<usize> {
        Ok(self.graph.node_count()?)
    }

    /// Begins a graph transaction.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::WrongMode` unless in transactional mode.
    pub fn begin(&self) -> Result<Transaction<'_>> {
        Ok(self.graph.begin()?)
    }

    // ========================================================================
    // Mode
    // ========================================================================

    /// Switches the graph to bulk mode for the initial load.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph file cannot be reopened.
    pub fn start_batch_mode(&self) -> Result<()> {
        Ok(self.graph.start_bulk()?)
    }

    /// Returns true while the graph is in bulk mode.
    pub fn is_batch_mode(&self) -> bool {
        self.graph.mode() == Mode::Bulk
    }

    /// Flushes bulk data and returns to transactional mode.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::FlushFailed` if the data cannot be written; the
    /// graph store is closed in that case.
    pub fn end_batch_mode(&self) -> Result<()> {
        Ok(self.graph.end_bulk()?)
    }

    // ========================================================================
    // Verbatim
    // ========================================================================

    /// Stores a verbatim record, assigning the next key if it has none.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn put(&self, record: &mut VerbatimRecord) -> Result<VerbatimKey> {
        Ok(self.verbatim.put(record)?)
    }

    /// Returns the verbatim record with `key`.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn get_verbatim(&self, key: VerbatimKey) -> Result<Option<VerbatimRecord>> {
        Ok(self.verbatim.get(key)?)
    }

    /// Flags `issues` on the verbatim record `key`, if given.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn add_issues(&self, key: Option<VerbatimKey>, issues: &[Issue]) -> Result<()> {
        match key {
            Some(key) => Ok(self.verbatim.add_issues(key, issues)?),
            None => Ok(()),
        }
    }

    /// Verbatim records of one row type, in key order.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn verbatim_by_type(&self, row_type: &str) -> Result<Vec<VerbatimRecord>> {
        Ok(self.verbatim.by_type(row_type)?)
    }

    // ========================================================================
    // Names and usages
    // ========================================================================

    /// Creates a name and, unless it is a bare name, a usage with a
    /// `HAS_NAME` edge between their nodes.
    ///
    /// Uses the bulk writer in bulk mode and one transaction otherwise.
    /// See [`create_name_and_usage_with`](Self::create_name_and_usage_with).
    ///
    /// # Errors
    ///
    /// Returns a storage or graph error, or `UsageWithoutName`.
    pub fn create_name_and_usage(&self, usage: &mut StagedUsage) -> Result<Option<NodeRef>> {
        if self.is_batch_mode() {
            let mut writer = self.graph.bulk()?;
            self.create_name_and_usage_with(&mut writer, usage)
        } else {
            self.graph.write(|tx| self.create_name_and_usage_with(tx, usage))
        }
    }

    /// Creates a name and its usage through `w`.
    ///
    /// A usage without id gets a generated one. The embedded name is detached
    /// from the usage and stored on its own, taking the usage id, verbatim
    /// key and origin where it has none. A
    /// synthetic verbatim record is created for a usage without one.
    ///
    /// Returns the name node, or `None` if the name id was taken. If only the
    /// usage id was taken, the name is kept, no usage node is created and the
    /// usage id is reset to `None`.
    ///
    /// # Errors
    ///
    /// Returns a storage or graph error, or `UsageWithoutName`.
    pub fn create_name_and_usage_with(
        &self,
        w: &mut dyn GraphWrite,
        usage: &mut StagedUsage,
    ) -> Result<Option<NodeRef>> {
        let Some(mut name) = usage.usage.name.take() else {
            return UsageWithoutNameSnafu { id: usage.id().unwrap_or("-").to_string() }.fail();
        };
        if usage.usage.verbatim_key.is_none() {
            let mut synthetic = VerbatimRecord::synthetic();
            usage.usage.verbatim_key = Some(self.verbatim.put(&mut synthetic)?);
        }
        if usage.usage.id.is_none() {
            usage.set_id(Some(self.ids.next()));
        }
        if name.id.is_none() {
            name.id = usage.usage.id.clone();
        }
        if name.verbatim_key.is_none() {
            name.verbatim_key = usage.usage.verbatim_key;
            name.origin = usage.usage.origin;
        }

        let bare = usage.usage.is_bare_name();
        let labels = if bare { LabelSet::of(Label::BareName) } else { LabelSet::EMPTY };
        let mut staged = StagedName::new(name);
        let Some(name_node) = self.names.create(w, &mut staged, labels)? else {
            tracing::debug!(usage = ?usage.id(), "Skipping usage without name node");
            usage.usage.name = Some(staged.name);
            return Ok(None);
        };
        usage.name_node = Some(name_node.id());

        if !bare && self.usages.create(w, usage, name_node.id())?.is_none() {
            usage.set_id(None);
        }
        Ok(Some(name_node))
    }

    /// Deletes a name or usage node with its record and every edge touching it.
    ///
    /// # Errors
    ///
    /// Returns a storage or graph error.
    pub fn remove(&self, tx: &mut Transaction<'_>, node: NodeId) -> Result<()> {
        let labels = tx.labels(node)?;
        let id = tx.props(node)?.id.clone();
        if labels.contains(Label::Name) {
            self.names.delete(&id)?;
        } else if labels.contains(Label::Taxon) || labels.contains(Label::Synonym) {
            self.usages.delete(&id)?;
        }
        let edges = tx.incident_edges(node).len();
        tx.detach_delete(node)?;
        tracing::debug!(node = %node, labels = %labels, edges, "Removed node");
        Ok(())
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Applies `processor` to every node with `label`, or every node, in
    /// batches of `batch_size` nodes with one transaction per batch.
    ///
    /// Returns the number of processed nodes.
    ///
    /// # Errors
    ///
    /// Returns `StagingError::Pipeline` if the traversal failed; batches
    /// committed before the failure stay committed.
    #[tracing::instrument(skip(self, processor), fields(dataset = self.dataset_key))]
    pub fn process<P>(
        &self,
        label: Option<Label>,
        batch_size: usize,
        processor: &mut P,
    ) -> Result<usize>
    where
        P: NodeBatchProcessor + ?Sized,
    {
        let nodes = self.graph.read(|tx| {
            Ok::<_, crate::StagingError>(match label {
                Some(label) => tx.nodes_with_label(label),
                None => tx.node_ids(),
            })
        })?;
        let limits = PipelineLimits {
            batch_size,
            timeout: self.config.batch_timeout,
            capacity: self.config.queue_capacity,
        };
        let total = pipeline::run(&self.graph, nodes, limits, &self.cancel, processor)?;
        tracing::info!(?label, total, "Processed nodes");
        Ok(total)
    }

    /// Like [`process`](Self::process) with the configured batch size.
    ///
    /// # Errors
    ///
    /// Returns `StagingError::Pipeline` if the traversal failed.
    pub fn process_all<P>(&self, label: Option<Label>, processor: &mut P) -> Result<usize>
    where
        P: NodeBatchProcessor + ?Sized,
    {
        self.process(label, self.config.batch_size, processor)
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    /// Writes the indented text tree of all usages.
    ///
    /// # Errors
    ///
    /// Returns a graph or write error.
    pub fn print_tree(&self, out: &mut dyn std::io::Write) -> Result<()> {
        Ok(self.graph.read(|tx| taxostage_graph::printer::print_tree(tx, out))?)
    }

    /// Writes the whole graph in DOT format.
    ///
    /// # Errors
    ///
    /// Returns a graph or write error.
    pub fn print_dot(&self, out: &mut dyn std::io::Write) -> Result<()> {
        Ok(self.graph.read(|tx| taxostage_graph::printer::print_dot(tx, out))?)
    }

    /// Writes `tree.txt` and `graph.dot` into the staging directory.
    ///
    /// # Errors
    ///
    /// Returns an I/O or graph error.
    pub fn dump(&self) -> Result<()> {
        for (file, dot) in [("tree.txt", false), ("graph.dot", true)] {
            let path = self.dir.join(file);
            let mut out = std::io::BufWriter::new(
                std::fs::File::create(&path).context(IoSnafu { path: path.display().to_string() })?,
            );
            if dot { self.print_dot(&mut out)? } else { self.print_tree(&mut out)? }
            std::io::Write::flush(&mut out).context(IoSnafu { path: path.display().to_string() })?;
            tracing::info!(path = %path.display(), "Dumped staging graph");
        }
        Ok(())
    }

    pub(crate) fn all_ids(&self) -> Result<Vec<String>> {
        let mut ids = self.names.ids()?;
        ids.extend(self.usages.ids()?);
        ids.extend(self.references.ids()?);
        ids.extend(self.references.alias_ids()?);
        ids.extend(self.type_material.ids()?);
        Ok(ids)
    }
}

impl std::fmt::Debug for StagingDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingDb")
            .field("dataset_key", &self.dataset_key)
            .field("attempt", &self.attempt)
            .field("dir", &self.dir)
            .field("mode", &self.graph.mode())
            .finish_non_exhaustive()
    }
}
