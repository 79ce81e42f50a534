//! Controlled vocabularies shared by names, usages and relation records.
//!
//! All enums serialize as their variant index through postcard, so variants
//! must only ever be appended.

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Rank
// ============================================================================

/// Taxonomic rank, ordered from the highest rank to the lowest.
///
/// `Unranked` sorts last and is never considered higher or lower than any
/// other rank.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Rank {
    /// Domain or superkingdom.
    Domain,
    /// Kingdom.
    Kingdom,
    /// Phylum or division.
    Phylum,
    /// Class.
    Class,
    /// Order.
    Order,
    /// Superfamily.
    Superfamily,
    /// Family.
    Family,
    /// Subfamily.
    Subfamily,
    /// Tribe.
    Tribe,
    /// Genus.
    Genus,
    /// Subgenus.
    Subgenus,
    /// Section (botanical infrageneric rank).
    Section,
    /// Species.
    Species,
    /// Subspecies.
    Subspecies,
    /// Variety.
    Variety,
    /// Form.
    Form,
    /// No rank given.
    #[default]
    Unranked,
}

impl Rank {
    /// Ranks with a fixed place in a flat classification, highest first.
    pub const CLASSIFICATION: [Rank; 11] = [
        Rank::Domain,
        Rank::Kingdom,
        Rank::Phylum,
        Rank::Class,
        Rank::Order,
        Rank::Superfamily,
        Rank::Family,
        Rank::Subfamily,
        Rank::Tribe,
        Rank::Genus,
        Rank::Subgenus,
    ];

    /// Returns true if `self` is strictly above `other` in the hierarchy.
    pub fn is_higher_than(self, other: Rank) -> bool {
        self != Rank::Unranked && other != Rank::Unranked && self < other
    }

    /// Returns true for species and every rank below it.
    pub fn is_species_or_below(self) -> bool {
        self != Rank::Unranked && self >= Rank::Species
    }

    /// Lowercase rank name as used in text dumps.
    pub fn name(self) -> &'static str {
        match self {
            Rank::Domain => "domain",
            Rank::Kingdom => "kingdom",
            Rank::Phylum => "phylum",
            Rank::Class => "class",
            Rank::Order => "order",
            Rank::Superfamily => "superfamily",
            Rank::Family => "family",
            Rank::Subfamily => "subfamily",
            Rank::Tribe => "tribe",
            Rank::Genus => "genus",
            Rank::Subgenus => "subgenus",
            Rank::Section => "section",
            Rank::Species => "species",
            Rank::Subspecies => "subspecies",
            Rank::Variety => "variety",
            Rank::Form => "form",
            Rank::Unranked => "unranked",
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Nomenclature
// ============================================================================

/// Nomenclatural code governing a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NomCode {
    /// International Code of Nomenclature for algae, fungi, and plants.
    Botanical,
    /// International Code of Zoological Nomenclature.
    Zoological,
    /// International Code of Nomenclature of Prokaryotes.
    Bacterial,
    /// International Code of Virus Classification and Nomenclature.
    Virus,
    /// International Code of Nomenclature for Cultivated Plants.
    Cultivars,
}

/// Nomenclatural relation between two names, stored as a graph edge type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NomRelType {
    /// The target name is the basionym of the source name.
    Basionym,
    /// The source name is a spelling correction of the target name.
    SpellingCorrection,
    /// The source name is a later homonym of the target name.
    LaterHomonym,
    /// The source name replaces the target name (nomen novum).
    ReplacementName,
    /// The source name is conserved against the target name.
    Conserved,
    /// The source name is based on the same type as the target name.
    Homotypic,
    /// The source name is the type of the target name.
    Type,
}

// ============================================================================
// Taxonomic status and origin
// ============================================================================

/// Taxonomic status of a usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaxonomicStatus {
    /// Accepted taxon.
    Accepted,
    /// Accepted, but placement or circumscription is doubtful.
    ProvisionallyAccepted,
    /// Synonym of one or more accepted taxa.
    Synonym,
    /// Synonym whose accepted taxon cannot be determined unambiguously.
    AmbiguousSynonym,
    /// Name misapplied to another taxon.
    Misapplied,
    /// Name without taxonomic placement.
    BareName,
}

impl TaxonomicStatus {
    /// Returns true for any of the synonym statuses.
    pub fn is_synonym(self) -> bool {
        matches!(
            self,
            TaxonomicStatus::Synonym | TaxonomicStatus::AmbiguousSynonym | TaxonomicStatus::Misapplied
        )
    }

    /// Returns true for accepted and provisionally accepted taxa.
    pub fn is_taxon(self) -> bool {
        matches!(self, TaxonomicStatus::Accepted | TaxonomicStatus::ProvisionallyAccepted)
    }

    /// Returns true for a name without placement.
    pub fn is_bare_name(self) -> bool {
        self == TaxonomicStatus::BareName
    }
}

/// How a record came into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Origin {
    /// Read directly from a source row.
    #[default]
    Source,
    /// Created from a denormalized classification column.
    DenormedClassification,
    /// Created from an implicit name (e.g. the genus of a species).
    ImplicitName,
    /// Created from a verbatim parent reference.
    VerbatimParent,
    /// Created from a verbatim accepted reference.
    VerbatimAccepted,
    /// Created from a verbatim basionym reference.
    VerbatimBasionym,
    /// Created to repair the hierarchy or a missing record.
    Other,
}

// ============================================================================
// Issues
// ============================================================================

/// Data-quality flag recorded on a verbatim record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Issue {
    /// Another record of the same kind already uses this id.
    IdNotUnique,
    /// The record had a parent that was replaced by another one.
    MultipleParents,
    /// The name is part of a basionym chain that had to be cut.
    ChainedBasionym,
    /// The record's name matched more than one existing usage.
    NameNotUnique,
    /// The parent id does not resolve to an existing record.
    ParentIdInvalid,
    /// The accepted id does not resolve to an existing record.
    AcceptedIdInvalid,
    /// A synonym declared a parent, which has been moved or ignored.
    SynonymParent,
    /// A relation points back to the record itself.
    SelfReferencedRelation,
    /// A reference id does not resolve to an existing reference.
    ReferenceIdInvalid,
    /// The same name appears more than once.
    DuplicateName,
    /// The taxonomic status was derived from the graph, not given.
    DerivedTaxonomicStatus,
    /// A citation could not be normalized into a usable key.
    CitationUnparsed,
    /// A basionym id does not resolve to an existing name.
    BasionymIdInvalid,
    /// The verbatim record was created by the engine, not read from a source.
    SyntheticRecord,
    /// A name relation points to a name id that does not exist.
    RelatedNameMissing,
    /// A taxon relation points to a taxon id that does not exist.
    RelatedTaxonMissing,
}

impl Issue {
    /// Upper snake case name used in logs and dumps.
    pub fn name(self) -> &'static str {
        match self {
            Issue::IdNotUnique => "ID_NOT_UNIQUE",
            Issue::MultipleParents => "MULTIPLE_PARENTS",
            Issue::ChainedBasionym => "CHAINED_BASIONYM",
            Issue::NameNotUnique => "NAME_NOT_UNIQUE",
            Issue::ParentIdInvalid => "PARENT_ID_INVALID",
            Issue::AcceptedIdInvalid => "ACCEPTED_ID_INVALID",
            Issue::SynonymParent => "SYNONYM_PARENT",
            Issue::SelfReferencedRelation => "SELF_REFERENCED_RELATION",
            Issue::ReferenceIdInvalid => "REFERENCE_ID_INVALID",
            Issue::DuplicateName => "DUPLICATE_NAME",
            Issue::DerivedTaxonomicStatus => "DERIVED_TAXONOMIC_STATUS",
            Issue::CitationUnparsed => "CITATION_UNPARSED",
            Issue::BasionymIdInvalid => "BASIONYM_ID_INVALID",
            Issue::SyntheticRecord => "SYNTHETIC_RECORD",
            Issue::RelatedNameMissing => "RELATED_NAME_MISSING",
            Issue::RelatedTaxonMissing => "RELATED_TAXON_MISSING",
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Taxon relations
// ============================================================================

/// Relation between two taxon concepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaxonConceptRelType {
    /// Both concepts are the same.
    Equals,
    /// The source concept includes the target concept.
    Includes,
    /// The source concept is included in the target concept.
    IncludedIn,
    /// The concepts partially overlap.
    Overlaps,
    /// The concepts do not overlap.
    Excludes,
}

/// Ecological interaction between two species.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpeciesInteractionType {
    /// Unspecified interaction.
    RelatedTo,
    /// The source eats the target.
    Eats,
    /// The source is eaten by the target.
    EatenBy,
    /// The source is a parasite of the target.
    ParasiteOf,
    /// The source is a host of the target.
    HostOf,
    /// The source pollinates the target.
    Pollinates,
    /// The source is a symbiont of the target.
    SymbiontOf,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_order_is_top_down() {
        assert!(Rank::Kingdom.is_higher_than(Rank::Family));
        assert!(Rank::Genus.is_higher_than(Rank::Species));
        assert!(!Rank::Species.is_higher_than(Rank::Genus));
        assert!(!Rank::Species.is_higher_than(Rank::Species));
    }

    #[test]
    fn test_unranked_is_incomparable() {
        assert!(!Rank::Unranked.is_higher_than(Rank::Species));
        assert!(!Rank::Kingdom.is_higher_than(Rank::Unranked));
        assert!(!Rank::Unranked.is_species_or_below());
    }

    #[test]
    fn test_status_groups() {
        assert!(TaxonomicStatus::Misapplied.is_synonym());
        assert!(TaxonomicStatus::ProvisionallyAccepted.is_taxon());
        assert!(!TaxonomicStatus::BareName.is_taxon());
        assert!(!TaxonomicStatus::BareName.is_synonym());
    }

    #[test]
    fn test_issue_names() {
        assert_eq!(Issue::IdNotUnique.to_string(), "ID_NOT_UNIQUE");
        assert_eq!(Issue::ChainedBasionym.to_string(), "CHAINED_BASIONYM");
    }
}
