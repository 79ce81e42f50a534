//! Durable object stores for the taxostage staging engine.
//!
//! Heavyweight records live here rather than on graph nodes. The crate
//! provides:
//! - [`KvBackend`] with a redb file backend and an in-memory backend, and
//!   [`JournaledBackend`] undoing writes of a rolled-back transaction
//! - [`MapStore`], a generic id → record store with duplicate detection
//! - [`ReferenceStore`], deduplicating literature references by citation
//! - [`VerbatimStore`], holding source rows and their issue flags
//! - [`SetIndex`], a string → id-set secondary index

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod codec;
mod error;
mod issues;
mod map_store;
mod reference;
mod set_index;
mod tables;
mod verbatim;

pub use backend::{JournaledBackend, KvBackend, MemoryBackend, RedbBackend};
pub use codec::{Codec, PostcardCodec};
pub use error::{Result, StoreError};
pub use issues::IssueSink;
pub use map_store::MapStore;
pub use reference::ReferenceStore;
pub use set_index::SetIndex;
pub use tables::Table;
pub use verbatim::VerbatimStore;
