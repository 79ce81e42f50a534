//! Ties object store writes to graph transactions.

use std::sync::Arc;

use taxostage_graph::TxHooks;
use taxostage_store::JournaledBackend;

/// Opens an undo journal on the record backend when a graph transaction
/// begins, keeps the writes on commit and rewinds them on rollback.
///
/// Verbatim rows and their issue flags are written through the plain
/// backend and survive a rollback.
#[derive(Debug)]
pub(crate) struct ObjectJournal {
    backend: Arc<JournaledBackend>,
}

impl ObjectJournal {
    pub(crate) fn new(backend: Arc<JournaledBackend>) -> Self {
        Self { backend }
    }
}

impl TxHooks for ObjectJournal {
    fn begun(&self) {
        self.backend.begin();
    }

    fn committed(&self) {
        self.backend.discard();
    }

    fn rolled_back(&self) {
        match self.backend.rewind() {
            Ok(0) => {},
            Ok(undone) => tracing::debug!(undone, "Rolled back object store writes"),
            Err(error) => {
                tracing::error!(%error, "Failed to roll back object store writes");
            },
        }
    }
}
