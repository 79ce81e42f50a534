//! Ready-made records for tests.

use taxostage_types::{Name, Rank, TaxonomicStatus, Usage, VerbatimRecord};

/// A species name with authorship.
pub fn species(scientific_name: &str, authorship: &str) -> Name {
    Name::new(scientific_name, Rank::Species).with_authorship(authorship)
}

/// An accepted taxon with the given id, name and rank.
pub fn taxon(id: &str, scientific_name: &str, rank: Rank) -> Usage {
    Usage::taxon(Name::new(scientific_name, rank)).with_id(id)
}

/// A synonym with the given id and species name.
pub fn synonym(id: &str, scientific_name: &str) -> Usage {
    Usage::synonym(Name::new(scientific_name, Rank::Species)).with_id(id)
}

/// A bare name usage with the given id.
pub fn bare_name(id: &str, scientific_name: &str, rank: Rank) -> Usage {
    Usage::with_status(Name::new(scientific_name, rank), TaxonomicStatus::BareName).with_id(id)
}

/// A taxon source row as a Darwin Core archive would provide it.
pub fn taxon_row(line: u64, taxon_id: &str, scientific_name: &str) -> VerbatimRecord {
    let mut v = VerbatimRecord::new(line, "taxa.txt", "dwc:Taxon");
    v.insert("dwc:taxonID", taxon_id);
    v.insert("dwc:scientificName", scientific_name);
    v
}
