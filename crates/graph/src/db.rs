//! The graph store and its write modes.
//!
//! A [`GraphDb`] is always in exactly one [`Mode`]. Switching modes flushes
//! pending data, drops the graph file handle and reopens the file from disk,
//! so no write path ever stays open across a switch.

use std::{
    collections::BTreeSet,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use snafu::ResultExt;

use crate::{
    bulk::BulkWriter,
    data::{GraphData, NodeSlot},
    error::{FlushFailedSnafu, Result, WrongModeSnafu},
    hooks::TxHooks,
    model::{EdgeId, Label, LabelSet, NodeId, NodeProps},
    persist::GraphFile,
    txn::Transaction,
};

/// Write mode of the graph store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Write-only appends, no transactions and no reads.
    Bulk,
    /// Atomic read/write transactions.
    Transactional,
    /// The store has been shut down.
    Closed,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Bulk => "bulk",
            Mode::Transactional => "transactional",
            Mode::Closed => "closed",
        })
    }
}

// ============================================================================
// Open graph
// ============================================================================

/// Graph data loaded from an open graph file.
#[derive(Debug)]
pub(crate) struct OpenGraph {
    pub(crate) data: GraphData,
    pub(crate) file: GraphFile,
    pub(crate) dev_null: NodeId,
    /// Rows written by the bulk writer and not yet persisted.
    pub(crate) pending_nodes: BTreeSet<NodeId>,
    pub(crate) pending_edges: BTreeSet<EdgeId>,
}

impl OpenGraph {
    fn open(path: &Path, durable: bool) -> Result<Self> {
        let file = GraphFile::open(path, durable)?;
        let mut data = file.load()?;

        let dev_null = match data.nodes_with_label(Label::DevNull).first() {
            Some(node) => *node,
            None => {
                let node = data.insert_node(NodeSlot {
                    labels: LabelSet::of(Label::DevNull),
                    props: NodeProps::default(),
                });
                file.persist(&data, &BTreeSet::from([node]), &BTreeSet::new())?;
                node
            },
        };

        Ok(Self {
            data,
            file,
            dev_null,
            pending_nodes: BTreeSet::new(),
            pending_edges: BTreeSet::new(),
        })
    }

    fn flush(&mut self) -> Result<()> {
        if self.pending_nodes.is_empty() && self.pending_edges.is_empty() {
            return Ok(());
        }
        self.file.persist(&self.data, &self.pending_nodes, &self.pending_edges)?;
        tracing::debug!(
            nodes = self.pending_nodes.len(),
            edges = self.pending_edges.len(),
            "Flushed bulk data"
        );
        self.pending_nodes.clear();
        self.pending_edges.clear();
        Ok(())
    }
}

#[derive(Debug)]
struct State {
    mode: Mode,
    graph: Option<OpenGraph>,
}

// ============================================================================
// GraphDb
// ============================================================================

/// Property graph of name and usage nodes persisted in one redb file.
///
/// Only one [`Transaction`] or [`BulkWriter`] exists at a time; acquiring one
/// blocks while another is alive. Mode switches and [`close`](Self::close)
/// block the same way, so they must not be called by a thread holding a
/// transaction or writer.
#[derive(Debug)]
pub struct GraphDb {
    path: PathBuf,
    durable: bool,
    state: Mutex<State>,
    hooks: Option<Arc<dyn TxHooks>>,
}

impl GraphDb {
    /// Opens or creates the graph file at `path` in transactional mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or read.
    #[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, durable: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let graph = OpenGraph::open(&path, durable)?;
        tracing::info!(nodes = graph.data.node_count(), "Opened graph store");
        Ok(Self {
            path,
            durable,
            state: Mutex::new(State { mode: Mode::Transactional, graph: Some(graph) }),
            hooks: None,
        })
    }

    /// Notifies `hooks` at the boundaries of every later transaction.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn TxHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Path of the graph file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current mode.
    pub fn mode(&self) -> Mode {
        self.state.lock().mode
    }

    /// Number of live nodes, the dev-null node included. Available in both
    /// open modes.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::WrongMode` on a closed store.
    pub fn node_count(&self) -> Result<usize> {
        let state = self.state.lock();
        match &state.graph {
            Some(graph) => Ok(graph.data.node_count()),
            None => WrongModeSnafu { expected: Mode::Transactional, actual: state.mode }.fail(),
        }
    }

    /// Begins a transaction.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::WrongMode` unless the store is in transactional mode.
    pub fn begin(&self) -> Result<Transaction<'_>> {
        let graph = self.lock_in(Mode::Transactional)?;
        Ok(Transaction::new(graph, self.hooks.clone()))
    }

    /// Runs `f` in a transaction and commits it if `f` succeeds.
    ///
    /// # Errors
    ///
    /// Returns the error of `f`, or the commit error.
    pub fn write<R, E>(&self, f: impl FnOnce(&mut Transaction<'_>) -> Result<R, E>) -> Result<R, E>
    where
        E: From<crate::GraphError>,
    {
        let mut tx = self.begin()?;
        let value = f(&mut tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Runs `f` in a transaction that is rolled back afterwards.
    ///
    /// # Errors
    ///
    /// Returns the error of `f`, or `GraphError::WrongMode`.
    pub fn read<R, E>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<R, E>) -> Result<R, E>
    where
        E: From<crate::GraphError>,
    {
        let tx = self.begin()?;
        f(&tx)
    }

    /// Returns the bulk writer.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::WrongMode` unless the store is in bulk mode.
    pub fn bulk(&self) -> Result<BulkWriter<'_>> {
        self.lock_in(Mode::Bulk).map(BulkWriter::new)
    }

    /// Switches to bulk mode. Does nothing if already in bulk mode.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::WrongMode` on a closed store, or an error
    /// reopening the file.
    #[tracing::instrument(skip(self), fields(path = %self.path.display()))]
    pub fn start_bulk(&self) -> Result<()> {
        let mut state = self.state.lock();
        match state.mode {
            Mode::Bulk => return Ok(()),
            Mode::Closed => {
                return WrongModeSnafu { expected: Mode::Transactional, actual: Mode::Closed }
                    .fail();
            },
            Mode::Transactional => {},
        }

        // Transactions persist on commit, so nothing is pending here.
        state.graph = None;
        state.mode = Mode::Closed;
        state.graph = Some(OpenGraph::open(&self.path, self.durable)?);
        state.mode = Mode::Bulk;
        tracing::info!("Switched to bulk mode");
        Ok(())
    }

    /// Flushes bulk data and switches to transactional mode. Does nothing if
    /// already in transactional mode.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::FlushFailed` if the bulk data cannot be written;
    /// the store is closed in that case. Returns `GraphError::WrongMode` on a
    /// closed store.
    #[tracing::instrument(skip(self), fields(path = %self.path.display()))]
    pub fn end_bulk(&self) -> Result<()> {
        let mut state = self.state.lock();
        match state.mode {
            Mode::Transactional => return Ok(()),
            Mode::Closed => {
                return WrongModeSnafu { expected: Mode::Bulk, actual: Mode::Closed }.fail();
            },
            Mode::Bulk => {},
        }

        Self::shut_down(&mut state)?;
        state.graph = Some(OpenGraph::open(&self.path, self.durable)?);
        state.mode = Mode::Transactional;
        tracing::info!("Switched to transactional mode");
        Ok(())
    }

    /// Flushes pending bulk data and closes the graph file.
    ///
    /// Closing a closed store does nothing.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::FlushFailed` if bulk data cannot be written. The
    /// store is closed regardless.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        Self::shut_down(&mut state)
    }

    /// Drops the open graph, flushing pending bulk rows first. The file handle
    /// is released even when the flush fails.
    fn shut_down(state: &mut State) -> Result<()> {
        let previous = std::mem::replace(&mut state.mode, Mode::Closed);
        let Some(mut graph) = state.graph.take() else {
            return Ok(());
        };
        let flushed = if previous == Mode::Bulk { graph.flush() } else { Ok(()) };
        drop(graph);
        flushed.context(FlushFailedSnafu)
    }

    fn lock_in(&self, expected: Mode) -> Result<MappedMutexGuard<'_, OpenGraph>> {
        let state = self.state.lock();
        let actual = state.mode;
        MutexGuard::try_map(state, |s| if s.mode == expected { s.graph.as_mut() } else { None })
            .map_err(|_| WrongModeSnafu { expected, actual }.build())
    }
}

impl Drop for GraphDb {
    fn drop(&mut self) {
        if let Err(error) = Self::shut_down(self.state.get_mut()) {
            tracing::error!(path = %self.path.display(), %error, "Failed to close graph store");
        }
    }
}
