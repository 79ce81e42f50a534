//! Taxonomic placements of names.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    name::Name,
    record::{Record, VerbatimKey},
    vocab::{Origin, Rank, TaxonomicStatus},
};

/// Kind of a usage, derived from its [`TaxonomicStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsageKind {
    /// Accepted taxon.
    Taxon,
    /// Synonym of one or more accepted taxa.
    Synonym,
    /// Name without placement.
    BareName,
}

/// A taxonomic placement of a [`Name`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Record id, unique among usages of one dataset.
    pub id: Option<String>,
    /// Source row this usage was derived from.
    pub verbatim_key: Option<VerbatimKey>,
    /// The placed name. Detached into the name store when persisted.
    pub name: Option<Name>,
    /// Taxonomic status.
    pub status: TaxonomicStatus,
    /// Cached id of the parent taxon; only meaningful for taxa.
    pub parent_id: Option<String>,
    /// Reference the placement is based on.
    pub according_to_id: Option<String>,
    /// How the record was created.
    pub origin: Origin,
    /// Free-text remarks.
    pub remarks: Option<String>,
}

impl Usage {
    /// Creates an accepted taxon for `name`.
    pub fn taxon(name: Name) -> Self {
        Self::with_status(name, TaxonomicStatus::Accepted)
    }

    /// Creates a synonym for `name`.
    pub fn synonym(name: Name) -> Self {
        Self::with_status(name, TaxonomicStatus::Synonym)
    }

    /// Creates a bare name usage for `name`.
    pub fn bare_name(name: Name) -> Self {
        Self::with_status(name, TaxonomicStatus::BareName)
    }

    /// Creates a usage of `name` with the given status.
    pub fn with_status(name: Name, status: TaxonomicStatus) -> Self {
        Self {
            id: None,
            verbatim_key: None,
            name: Some(name),
            status,
            parent_id: None,
            according_to_id: None,
            origin: Origin::Source,
            remarks: None,
        }
    }

    /// Sets the record id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Kind of this usage.
    pub fn kind(&self) -> UsageKind {
        if self.status.is_bare_name() {
            UsageKind::BareName
        } else if self.status.is_synonym() {
            UsageKind::Synonym
        } else {
            UsageKind::Taxon
        }
    }

    /// Returns true if the usage is a synonym.
    pub fn is_synonym(&self) -> bool {
        self.kind() == UsageKind::Synonym
    }

    /// Returns true if the usage is a bare name.
    pub fn is_bare_name(&self) -> bool {
        self.kind() == UsageKind::BareName
    }

    /// Turns a taxon into a synonym with the given status.
    ///
    /// Synonyms have no parent, so the cached parent id is dropped.
    pub fn convert_to_synonym(&mut self, status: TaxonomicStatus) {
        debug_assert!(status.is_synonym());
        self.status = status;
        self.parent_id = None;
    }
}

impl Record for Usage {
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

// ============================================================================
// Classification
// ============================================================================

/// Flat higher classification as given in denormalized source rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    names: BTreeMap<Rank, String>,
}

impl Classification {
    /// Creates an empty classification.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the name at `rank`. Ranks outside [`Rank::CLASSIFICATION`] are ignored.
    pub fn set(&mut self, rank: Rank, name: impl Into<String>) {
        if Rank::CLASSIFICATION.contains(&rank) {
            self.names.insert(rank, name.into());
        }
    }

    /// Returns the name at `rank`.
    pub fn get(&self, rank: Rank) -> Option<&str> {
        self.names.get(&rank).map(String::as_str)
    }

    /// Removes `rank` and every rank below it.
    pub fn clear_rank_and_below(&mut self, rank: Rank) {
        self.names.retain(|r, _| r.is_higher_than(rank));
    }

    /// Returns true if no rank is set.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterates ranks and names from the highest rank down.
    pub fn iter(&self) -> impl Iterator<Item = (Rank, &str)> {
        self.names.iter().map(|(r, n)| (*r, n.as_str()))
    }
}
