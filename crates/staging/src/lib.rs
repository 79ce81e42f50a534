//! Normalization staging engine for taxonomic checklists.
//!
//! A [`StagingDb`] holds one import attempt of one dataset. Full records live
//! in object stores; the graph keeps one node per name and per usage and the
//! relationships between them. The engine provides:
//! - composite creation of names and usages, in bulk or transactional mode
//! - relationship assignment with tolerant conflict handling
//! - name lookups backed by a scientific name index
//! - the batch traversal [`pipeline`] used by downstream exporters
//! - the consistency pass [`StagingDb::sync`]
//! - the final rewrite of temporary ids
//!
//! Record writes made inside a graph transaction are undone when it rolls
//! back, so a failed pipeline batch leaves neither nodes nor records behind.
//!
//! Data-quality problems never abort an import. They are logged and flagged
//! as issues on the verbatim record the entity was read from.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod db;
mod error;
mod ids;
mod journal;
mod model;
pub mod pipeline;
mod reads;
mod relations;
mod stores;
mod sync;
#[cfg(test)]
mod test_support;

pub use db::{GRAPH_FILE, OBJECTS_FILE, StagingDb};
pub use error::{Result, StagingError};
pub use model::{RankedUsage, StagedName, StagedUsage};
pub use pipeline::{BoxError, CancelToken, NodeBatchProcessor, PipelineError, from_fn};
pub use stores::{NameStore, UsageStore};
pub use sync::SyncReport;
