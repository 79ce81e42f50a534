//! Domain types for the taxostage normalization staging engine.
//!
//! This crate provides the vocabulary shared by every other crate:
//! - Records kept in the object store ([`Name`], [`Usage`], [`VerbatimRecord`],
//!   [`Reference`], [`TypeMaterial`])
//! - Relationship records materialized from graph edges
//! - The [`IdGenerator`] issuing temporary and final record ids
//! - The postcard [`codec`] and the text normalization used for index keys
//! - [`StagingConfig`]

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod config;
pub mod id;
pub mod name;
pub mod normalize;
pub mod record;
pub mod reference;
pub mod relation;
pub mod usage;
pub mod verbatim;
pub mod vocab;

pub use config::{ConfigError, StagingConfig};
pub use id::IdGenerator;
pub use name::Name;
pub use record::{Record, VerbatimKey};
pub use reference::{Reference, TypeMaterial};
pub use relation::{NameRelation, SpeciesInteraction, TaxonConceptRelation};
pub use usage::{Classification, Usage, UsageKind};
pub use verbatim::VerbatimRecord;
pub use vocab::{
    Issue, NomCode, NomRelType, Origin, Rank, SpeciesInteractionType, TaxonConceptRelType,
    TaxonomicStatus,
};
