//! Records as kept by the staging engine.

use serde::{Deserialize, Serialize};
use taxostage_graph::{NodeId, NodeProps};
use taxostage_types::{
    Classification, Name, Rank, Record, TaxonomicStatus, Usage, VerbatimKey,
};

/// A name plus the node representing it in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedName {
    /// The name record.
    pub name: Name,
    /// Name node, set once the node exists.
    pub node: Option<NodeId>,
}

impl StagedName {
    /// Wraps a name that has no node yet.
    pub fn new(name: Name) -> Self {
        Self { name, node: None }
    }

    /// Graph properties of the name node.
    pub(crate) fn node_props(&self) -> NodeProps {
        NodeProps {
            id: self.name.id.clone().unwrap_or_default(),
            scientific_name: Some(self.name.scientific_name.clone()),
            authorship: self.name.authorship.clone(),
            rank: Some(self.name.rank),
        }
    }
}

impl Record for StagedName {
    fn id(&self) -> Option<&str> {
        self.name.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.name.id = id;
    }

    fn verbatim_key(&self) -> Option<VerbatimKey> {
        self.name.verbatim_key
    }
}

/// A usage plus its graph nodes and the flat classification it came with.
///
/// The embedded [`Usage::name`] is only set while the usage is created or
/// when read through [`usage_with_name`](crate::StagingDb::usage_with_name);
/// stored records keep the name in the name store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedUsage {
    /// The usage record.
    pub usage: Usage,
    /// Usage node, set once the node exists.
    pub node: Option<NodeId>,
    /// Node of the usage's name.
    pub name_node: Option<NodeId>,
    /// Denormalized higher classification from the source row.
    pub classification: Classification,
}

impl StagedUsage {
    /// Wraps a usage that has no node yet.
    pub fn new(usage: Usage) -> Self {
        Self { usage, node: None, name_node: None, classification: Classification::default() }
    }

    /// Usage of `name` with the given status.
    pub fn with_status(name: Name, status: TaxonomicStatus) -> Self {
        Self::new(Usage::with_status(name, status))
    }

    /// Returns true for a synonym.
    pub fn is_synonym(&self) -> bool {
        self.usage.is_synonym()
    }
}

impl From<Usage> for StagedUsage {
    fn from(usage: Usage) -> Self {
        Self::new(usage)
    }
}

impl Record for StagedUsage {
    fn id(&self) -> Option<&str> {
        self.usage.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.usage.id = id;
    }

    fn verbatim_key(&self) -> Option<VerbatimKey> {
        self.usage.verbatim_key
    }
}

/// A usage node with the name it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedUsage {
    /// Usage node.
    pub usage_node: NodeId,
    /// Name node.
    pub name_node: NodeId,
    /// Id of the usage record.
    pub usage_id: String,
    /// Scientific name.
    pub scientific_name: String,
    /// Authorship.
    pub authorship: Option<String>,
    /// Rank.
    pub rank: Rank,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use taxostage_types::codec;

    use super::*;

    #[test]
    fn test_name_node_props() {
        let staged = StagedName::new(
            Name::new("Abies alba", Rank::Species).with_authorship("Mill.").with_id("n1"),
        );
        let props = staged.node_props();
        assert_eq!(props.id, "n1");
        assert_eq!(props.scientific_name.as_deref(), Some("Abies alba"));
        assert_eq!(props.authorship.as_deref(), Some("Mill."));
        assert_eq!(props.rank, Some(Rank::Species));
    }

    #[test]
    fn test_staged_usage_codec() {
        let mut staged = StagedUsage::with_status(
            Name::new("Abies", Rank::Genus),
            TaxonomicStatus::ProvisionallyAccepted,
        );
        staged.node = Some(NodeId::new(4));
        staged.classification.set(Rank::Family, "Pinaceae");
        staged.usage.name = None;

        let bytes = codec::encode(&staged).unwrap();
        let decoded: StagedUsage = codec::decode(&bytes).unwrap();
        assert_eq!(decoded, staged);
        assert_eq!(decoded.classification.get(Rank::Family), Some("Pinaceae"));
    }

    #[test]
    fn test_record_ids_delegate() {
        let mut staged = StagedUsage::from(Usage::synonym(Name::new("Pinus picea", Rank::Species)));
        assert!(staged.is_synonym());
        staged.set_id(Some("u1".into()));
        assert_eq!(staged.usage.id.as_deref(), Some("u1"));
        assert_eq!(Record::id(&staged), Some("u1"));
    }
}
