//! Parsed scientific names.

use serde::{Deserialize, Serialize};

use crate::{
    normalize::{HYBRID_MARKER, normalize_whitespace},
    record::{Record, VerbatimKey},
    vocab::{NomCode, Origin, Rank},
};

/// A parsed scientific name.
///
/// Names are stored in the object store keyed by [`Name::id`] and mirrored by
/// exactly one graph node carrying the id, the scientific name, the
/// authorship and the rank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Name {
    /// Record id, unique among names of one dataset.
    pub id: Option<String>,
    /// Source row this name was derived from.
    pub verbatim_key: Option<VerbatimKey>,
    /// Full scientific name without authorship.
    pub scientific_name: String,
    /// Authorship as given by the source.
    pub authorship: Option<String>,
    /// Rank of the name.
    pub rank: Rank,
    /// Governing nomenclatural code.
    pub code: Option<NomCode>,
    /// Monomial for names above species rank.
    pub uninomial: Option<String>,
    /// Genus part of a bi- or trinomial.
    pub genus: Option<String>,
    /// Infrageneric epithet, e.g. a subgenus.
    pub infrageneric_epithet: Option<String>,
    /// Species epithet.
    pub specific_epithet: Option<String>,
    /// Lowest epithet of an infraspecific name.
    pub infraspecific_epithet: Option<String>,
    /// Reference the name was published in.
    pub published_in_id: Option<String>,
    /// Page within the publishing reference.
    pub published_in_page: Option<String>,
    /// Id of the representative name of this name's homotypic group.
    pub homotypic_name_id: Option<String>,
    /// How the record was created.
    pub origin: Origin,
    /// Free-text remarks.
    pub remarks: Option<String>,
}

impl Name {
    /// Creates a name from its scientific name and rank.
    pub fn new(scientific_name: impl Into<String>, rank: Rank) -> Self {
        Self { scientific_name: scientific_name.into(), rank, ..Self::default() }
    }

    /// Sets the authorship.
    #[must_use]
    pub fn with_authorship(mut self, authorship: impl Into<String>) -> Self {
        self.authorship = Some(authorship.into());
        self
    }

    /// Sets the record id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Returns true if the name carries a hybrid marker.
    pub fn is_hybrid(&self) -> bool {
        self.scientific_name.starts_with(HYBRID_MARKER)
    }

    /// Scientific name followed by the authorship, if any.
    pub fn label(&self) -> String {
        match self.authorship.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
            Some(authorship) => {
                normalize_whitespace(&format!("{} {authorship}", self.scientific_name))
            },
            None => normalize_whitespace(&self.scientific_name),
        }
    }
}

impl Record for Name {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn verbatim_key(&self) -> Option<VerbatimKey> {
        self.verbatim_key
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_label_with_authorship() {
        let name = Name::new("Abies alba", Rank::Species).with_authorship("Mill.");
        assert_eq!(name.label(), "Abies alba Mill.");
    }

    #[test]
    fn test_label_ignores_blank_authorship() {
        let name = Name::new("Abies  alba", Rank::Species).with_authorship("  ");
        assert_eq!(name.label(), "Abies alba");
    }

    #[test]
    fn test_hybrid_detection() {
        assert!(Name::new("× Abies alba", Rank::Species).is_hybrid());
        assert!(!Name::new("Abies alba", Rank::Species).is_hybrid());
    }
}
