//! Node, edge and label types of the staging graph.

use std::fmt;

use serde::{Deserialize, Serialize};
use taxostage_types::{NomRelType, Rank, SpeciesInteractionType, TaxonConceptRelType, VerbatimKey};

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! define_index {
    (
        $(#[$meta:meta])*
        $name:ident, $prefix:expr
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Creates an index from its raw value.
            #[inline]
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the raw value.
            #[inline]
            pub const fn value(self) -> u64 {
                self.0
            }

            #[inline]
            pub(crate) fn slot(self) -> usize {
                // Arena indices are issued from `Vec::len`, so they fit in usize.
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }
    };
}

define_index!(
    /// Dense index of a node in the node table.
    NodeId, "n"
);

define_index!(
    /// Dense index of an edge in the edge table.
    EdgeId, "e"
);

/// Reference to a freshly created node.
///
/// A `Bulk` reference was issued by the bulk writer: the node exists and can
/// be linked, but nothing about it can be read until transactional mode
/// resumes and the reference is resolved by
/// [`Transaction::resolve`](crate::Transaction::resolve).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    /// Placeholder issued in bulk mode.
    Bulk(u64),
    /// Node created inside a transaction.
    Live(NodeId),
}

impl NodeRef {
    /// The node index, usable as an edge endpoint in either mode.
    pub fn id(self) -> NodeId {
        match self {
            NodeRef::Bulk(raw) => NodeId::new(raw),
            NodeRef::Live(id) => id,
        }
    }

    /// Returns true for a bulk-mode placeholder.
    pub fn is_bulk(self) -> bool {
        matches!(self, NodeRef::Bulk(_))
    }
}

impl From<NodeRef> for NodeId {
    fn from(node: NodeRef) -> Self {
        node.id()
    }
}

// ============================================================================
// Labels
// ============================================================================

/// Node label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Label {
    /// A name node.
    Name,
    /// An accepted taxon usage.
    Taxon,
    /// A synonym usage.
    Synonym,
    /// Any usage, accepted or synonym. Derived by the consistency pass.
    Usage,
    /// A name without any usage.
    BareName,
    /// A taxon without parent. Derived by the consistency pass.
    Root,
    /// A name that is the basionym of another name. Derived by the consistency pass.
    Basionym,
    /// Sink for relations whose target is outside the dataset.
    DevNull,
}

impl Label {
    /// All labels in bit order.
    pub const ALL: [Label; 8] = [
        Label::Name,
        Label::Taxon,
        Label::Synonym,
        Label::Usage,
        Label::BareName,
        Label::Root,
        Label::Basionym,
        Label::DevNull,
    ];

    const fn bit(self) -> u16 {
        1 << (self as u16)
    }

    /// Upper case label name used in dumps.
    pub fn name(self) -> &'static str {
        match self {
            Label::Name => "NAME",
            Label::Taxon => "TAXON",
            Label::Synonym => "SYNONYM",
            Label::Usage => "USAGE",
            Label::BareName => "BARE_NAME",
            Label::Root => "ROOT",
            Label::Basionym => "BASIONYM",
            Label::DevNull => "DEV_NULL",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Set of labels of one node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSet(u16);

impl LabelSet {
    /// The empty set.
    pub const EMPTY: LabelSet = LabelSet(0);

    /// Set holding one label.
    pub const fn of(label: Label) -> Self {
        LabelSet(label.bit())
    }

    /// Returns the set with `label` added.
    #[must_use]
    pub const fn with(self, label: Label) -> Self {
        LabelSet(self.0 | label.bit())
    }

    /// Returns true if `label` is in the set.
    pub const fn contains(self, label: Label) -> bool {
        self.0 & label.bit() != 0
    }

    /// Union of both sets.
    #[must_use]
    pub const fn union(self, other: LabelSet) -> Self {
        LabelSet(self.0 | other.0)
    }

    /// Labels of `self` that are not in `other`.
    #[must_use]
    pub const fn difference(self, other: LabelSet) -> Self {
        LabelSet(self.0 & !other.0)
    }

    /// Returns true if no label is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterates the labels in bit order.
    pub fn iter(self) -> impl Iterator<Item = Label> {
        Label::ALL.into_iter().filter(move |l| self.contains(*l))
    }
}

impl FromIterator<Label> for LabelSet {
    fn from_iter<I: IntoIterator<Item = Label>>(iter: I) -> Self {
        iter.into_iter().fold(LabelSet::EMPTY, LabelSet::with)
    }
}

impl From<Label> for LabelSet {
    fn from(label: Label) -> Self {
        LabelSet::of(label)
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.iter().map(Label::name).collect();
        f.write_str(&names.join(":"))
    }
}

// ============================================================================
// Relationship types
// ============================================================================

/// Edge type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RelType {
    /// Parent taxon → child taxon.
    ParentOf,
    /// Synonym usage → accepted usage.
    SynonymOf,
    /// Usage → its name. Exactly one per usage, never deleted on its own.
    HasName,
    /// Name → its basionym.
    HasBasionym,
    /// Name → the name it corrects the spelling of.
    SpellingCorrectionOf,
    /// Name → the earlier homonym.
    LaterHomonymOf,
    /// Name → the name it replaces.
    ReplacementNameOf,
    /// Name → the name it is conserved against.
    ConservedAgainst,
    /// Name → a homotypic name.
    HomotypicWith,
    /// Name → the name it is the type of.
    TypeOf,
    /// Usage → usage (or the dev-null node) it interacts with.
    SpeciesInteraction,
    /// Usage → related taxon concept.
    TaxonConceptRelation,
}

impl RelType {
    /// Every edge type.
    pub const ALL: [RelType; 12] = [
        RelType::ParentOf,
        RelType::SynonymOf,
        RelType::HasName,
        RelType::HasBasionym,
        RelType::SpellingCorrectionOf,
        RelType::LaterHomonymOf,
        RelType::ReplacementNameOf,
        RelType::ConservedAgainst,
        RelType::HomotypicWith,
        RelType::TypeOf,
        RelType::SpeciesInteraction,
        RelType::TaxonConceptRelation,
    ];

    /// Edge type storing the nomenclatural relation `rel`.
    pub fn from_nom(rel: NomRelType) -> Self {
        match rel {
            NomRelType::Basionym => RelType::HasBasionym,
            NomRelType::SpellingCorrection => RelType::SpellingCorrectionOf,
            NomRelType::LaterHomonym => RelType::LaterHomonymOf,
            NomRelType::ReplacementName => RelType::ReplacementNameOf,
            NomRelType::Conserved => RelType::ConservedAgainst,
            NomRelType::Homotypic => RelType::HomotypicWith,
            NomRelType::Type => RelType::TypeOf,
        }
    }

    /// Nomenclatural relation stored by this edge type, if any.
    pub fn to_nom(self) -> Option<NomRelType> {
        Some(match self {
            RelType::HasBasionym => NomRelType::Basionym,
            RelType::SpellingCorrectionOf => NomRelType::SpellingCorrection,
            RelType::LaterHomonymOf => NomRelType::LaterHomonym,
            RelType::ReplacementNameOf => NomRelType::ReplacementName,
            RelType::ConservedAgainst => NomRelType::Conserved,
            RelType::HomotypicWith => NomRelType::Homotypic,
            RelType::TypeOf => NomRelType::Type,
            _ => return None,
        })
    }

    /// Returns true for edges between name nodes.
    pub fn is_name_relation(self) -> bool {
        self.to_nom().is_some()
    }

    /// Upper snake case name used in dumps.
    pub fn name(self) -> &'static str {
        match self {
            RelType::ParentOf => "PARENT_OF",
            RelType::SynonymOf => "SYNONYM_OF",
            RelType::HasName => "HAS_NAME",
            RelType::HasBasionym => "HAS_BASIONYM",
            RelType::SpellingCorrectionOf => "SPELLING_CORRECTION_OF",
            RelType::LaterHomonymOf => "LATER_HOMONYM_OF",
            RelType::ReplacementNameOf => "REPLACEMENT_NAME_OF",
            RelType::ConservedAgainst => "CONSERVED_AGAINST",
            RelType::HomotypicWith => "HOMOTYPIC_WITH",
            RelType::TypeOf => "TYPE_OF",
            RelType::SpeciesInteraction => "SPECIES_INTERACTION",
            RelType::TaxonConceptRelation => "TAXON_CONCEPT_RELATION",
        }
    }
}

impl fmt::Display for RelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Direction of an edge relative to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    /// Edges starting at the node.
    Outgoing,
    /// Edges ending at the node.
    Incoming,
    /// Edges in either direction.
    Both,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Outgoing => "outgoing",
            Direction::Incoming => "incoming",
            Direction::Both => "both",
        })
    }
}

// ============================================================================
// Properties
// ============================================================================

/// Lightweight properties kept on a node.
///
/// Name nodes carry the scientific name, authorship and rank; usage nodes
/// only their record id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeProps {
    /// Id of the backing record in the object store.
    pub id: String,
    /// Scientific name, for name nodes.
    pub scientific_name: Option<String>,
    /// Authorship, for name nodes.
    pub authorship: Option<String>,
    /// Rank, for name nodes.
    pub rank: Option<Rank>,
}

impl NodeProps {
    /// Properties holding only a record id.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self { id: id.into(), ..Self::default() }
    }
}

/// Properties kept on an edge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeProps {
    /// Reference the relation was published in.
    pub reference_id: Option<String>,
    /// Source row the relation was read from.
    pub verbatim_key: Option<VerbatimKey>,
    /// Free-text remarks.
    pub remarks: Option<String>,
    /// Scientific name of a related taxon outside the dataset.
    pub scientific_name: Option<String>,
    /// Subtype of a species interaction edge.
    pub interaction: Option<SpeciesInteractionType>,
    /// Subtype of a taxon concept relation edge.
    pub concept: Option<TaxonConceptRelType>,
}

impl EdgeProps {
    /// Returns true if no property is set.
    pub fn is_empty(&self) -> bool {
        *self == EdgeProps::default()
    }
}

/// Snapshot of one edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    /// Edge index.
    pub id: EdgeId,
    /// Start node.
    pub start: NodeId,
    /// End node.
    pub end: NodeId,
    /// Edge type.
    pub rel: RelType,
    /// Edge properties.
    pub props: EdgeProps,
}

impl Edge {
    /// The endpoint opposite to `node`.
    pub fn other(&self, node: NodeId) -> NodeId {
        if self.start == node { self.end } else { self.start }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_label_set_operations() {
        let set = LabelSet::of(Label::Taxon).with(Label::Usage);
        assert!(set.contains(Label::Taxon));
        assert!(set.contains(Label::Usage));
        assert!(!set.contains(Label::Root));

        let diff = set.difference(LabelSet::of(Label::Taxon));
        assert_eq!(diff.iter().collect::<Vec<_>>(), [Label::Usage]);
        assert_eq!(set.to_string(), "TAXON:USAGE");
    }

    #[test]
    fn test_label_set_from_iter() {
        let set: LabelSet = [Label::Name, Label::Basionym, Label::Name].into_iter().collect();
        assert_eq!(set.iter().count(), 2);
        assert!(LabelSet::EMPTY.is_empty());
    }

    #[test]
    fn test_nom_rel_mapping_round_trips() {
        for rel in [
            NomRelType::Basionym,
            NomRelType::SpellingCorrection,
            NomRelType::LaterHomonym,
            NomRelType::ReplacementName,
            NomRelType::Conserved,
            NomRelType::Homotypic,
            NomRelType::Type,
        ] {
            assert_eq!(RelType::from_nom(rel).to_nom(), Some(rel));
        }
        assert_eq!(RelType::ParentOf.to_nom(), None);
        assert!(!RelType::HasName.is_name_relation());
    }

    #[test]
    fn test_node_ref_id() {
        assert_eq!(NodeRef::Bulk(7).id(), NodeId::new(7));
        assert!(NodeRef::Bulk(7).is_bulk());
        assert!(!NodeRef::Live(NodeId::new(7)).is_bulk());
    }

    #[test]
    fn test_edge_other() {
        let edge = Edge {
            id: EdgeId::new(0),
            start: NodeId::new(1),
            end: NodeId::new(2),
            rel: RelType::ParentOf,
            props: EdgeProps::default(),
        };
        assert_eq!(edge.other(NodeId::new(1)), NodeId::new(2));
        assert_eq!(edge.other(NodeId::new(2)), NodeId::new(1));
    }
}
