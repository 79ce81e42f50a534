//! Relationship records materialized from graph edges.

use serde::{Deserialize, Serialize};

use crate::{
    record::VerbatimKey,
    vocab::{NomRelType, SpeciesInteractionType, TaxonConceptRelType},
};

/// Nomenclatural relation between two names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRelation {
    /// Relation type.
    pub rel_type: NomRelType,
    /// Id of the source name.
    pub name_id: String,
    /// Id of the related name.
    pub related_name_id: String,
    /// Reference the relation was published in.
    pub reference_id: Option<String>,
    /// Source row the relation was read from.
    pub verbatim_key: Option<VerbatimKey>,
    /// Free-text remarks.
    pub remarks: Option<String>,
}

/// Relation between two taxon concepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonConceptRelation {
    /// Relation type.
    pub rel_type: TaxonConceptRelType,
    /// Id of the source usage.
    pub taxon_id: String,
    /// Id of the related usage.
    pub related_taxon_id: String,
    /// Reference the relation was published in.
    pub reference_id: Option<String>,
    /// Source row the relation was read from.
    pub verbatim_key: Option<VerbatimKey>,
    /// Free-text remarks.
    pub remarks: Option<String>,
}

/// Ecological interaction between two taxa.
///
/// The related taxon may be unknown to the dataset, in which case only its
/// scientific name is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeciesInteraction {
    /// Interaction type.
    pub interaction_type: SpeciesInteractionType,
    /// Id of the source usage.
    pub taxon_id: String,
    /// Id of the related usage, when it exists in the dataset.
    pub related_taxon_id: Option<String>,
    /// Scientific name of the related taxon as given by the source.
    pub related_scientific_name: Option<String>,
    /// Reference the interaction was published in.
    pub reference_id: Option<String>,
    /// Source row the interaction was read from.
    pub verbatim_key: Option<VerbatimKey>,
    /// Free-text remarks.
    pub remarks: Option<String>,
}
