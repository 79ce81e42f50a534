//! Creating and reading relationships between usages and names.

use snafu::OptionExt;
use taxostage_graph::{
    Direction, Edge, EdgeId, EdgeProps, GraphWrite, Label, LabelSet, NodeId, RelType, Transaction,
};
use taxostage_types::{
    Issue, NameRelation, NomRelType, Record, SpeciesInteraction, TaxonConceptRelation,
    TaxonomicStatus,
};

use crate::{
    StagingDb,
    error::{Result, UnexpectedEdgeSnafu},
};

impl StagingDb {
    /// Creates an edge through `w`, in either graph mode.
    ///
    /// # Errors
    ///
    /// Returns a graph error.
    pub fn create_rel(
        &self,
        w: &mut dyn GraphWrite,
        from: NodeId,
        to: NodeId,
        rel: RelType,
        props: EdgeProps,
    ) -> Result<EdgeId> {
        Ok(w.create_edge(from, to, rel, props)?)
    }

    /// Makes `parent` the parent of `child`.
    ///
    /// Self-loops are ignored and an existing edge from `parent` is kept. Any
    /// other parent is replaced; the override is logged and flagged as
    /// `MULTIPLE_PARENTS` on the child.
    ///
    /// # Errors
    ///
    /// Returns a storage or graph error.
    pub fn assign_parent(
        &self,
        tx: &mut Transaction<'_>,
        parent: NodeId,
        child: NodeId,
    ) -> Result<()> {
        if parent == child {
            tracing::debug!(node = %child, "Ignoring self parent");
            return Ok(());
        }
        let existing = tx.edges(child, RelType::ParentOf, Direction::Incoming);
        if existing.iter().any(|e| e.start == parent) && existing.len() == 1 {
            return Ok(());
        }

        let mut replaced = Vec::new();
        for edge in existing {
            if edge.start != parent {
                tx.delete_edge(edge.id)?;
                replaced.push(edge.start);
            }
        }
        if tx.degree(child, RelType::ParentOf, Direction::Incoming) == 0 {
            tx.create_edge(parent, child, RelType::ParentOf, EdgeProps::default())?;
        }
        if !replaced.is_empty() {
            tracing::warn!(
                child = %self.label_of(tx, child),
                old = ?replaced.iter().map(|n| self.label_of(tx, *n)).collect::<Vec<_>>(),
                new = %self.label_of(tx, parent),
                "Usage has already a parent, overriding"
            );
            self.flag_usage(tx, child, Issue::MultipleParents)?;
        }
        Ok(())
    }

    /// Makes `synonym` a synonym of `accepted`.
    ///
    /// Returns false without change if both usages share one name node or
    /// the relation exists already. Otherwise the synonym is relabelled and its record converted, and its
    /// parent moves to the accepted usage unless that has one already.
    ///
    /// # Errors
    ///
    /// Returns `MissingName`, or a storage or graph error.
    pub fn create_synonym_rel(
        &self,
        tx: &mut Transaction<'_>,
        synonym: NodeId,
        accepted: NodeId,
    ) -> Result<bool> {
        if self.usage_name_node(tx, synonym)? == self.usage_name_node(tx, accepted)? {
            tracing::debug!(synonym = %synonym, accepted = %accepted, "Usages share a name, no synonym relation");
            return Ok(false);
        }
        let existing = tx.edges(synonym, RelType::SynonymOf, Direction::Outgoing);
        if existing.iter().any(|edge| edge.end == accepted) {
            tracing::debug!(synonym = %synonym, accepted = %accepted, "Synonym relation exists");
            return Ok(false);
        }
        tx.create_edge(synonym, accepted, RelType::SynonymOf, EdgeProps::default())?;
        tx.remove_labels(synonym, LabelSet::of(Label::Taxon))?;
        tx.add_labels(synonym, LabelSet::of(Label::Synonym))?;

        let parents = tx.edges(synonym, RelType::ParentOf, Direction::Incoming);
        match parents.as_slice() {
            [] => {},
            [edge] => {
                tx.delete_edge(edge.id)?;
                if tx.degree(accepted, RelType::ParentOf, Direction::Incoming) == 0 {
                    self.assign_parent(tx, edge.start, accepted)?;
                }
            },
            many => {
                tracing::error!(synonym = %synonym, parents = many.len(), "Synonym has multiple parents");
                self.flag_usage(tx, synonym, Issue::MultipleParents)?;
            },
        }

        if let Some(mut usage) = self.usages.get(&tx.props(synonym)?.id)? {
            if !usage.is_synonym() {
                usage.usage.convert_to_synonym(TaxonomicStatus::Synonym);
                self.usages.update(&usage)?;
            }
        }
        Ok(true)
    }

    /// Creates the edge of a nomenclatural relation between two names.
    ///
    /// Returns `None` and flags the relation's verbatim record if a name is
    /// unknown or both ids point at the same name.
    ///
    /// # Errors
    ///
    /// Returns a storage or graph error.
    pub fn create_name_rel(
        &self,
        w: &mut dyn GraphWrite,
        rel: &NameRelation,
    ) -> Result<Option<EdgeId>> {
        let from = self.names.get(&rel.name_id)?.and_then(|n| n.node);
        let to = self.names.get(&rel.related_name_id)?.and_then(|n| n.node);
        let (Some(from), Some(to)) = (from, to) else {
            let issue = if rel.rel_type == NomRelType::Basionym {
                Issue::BasionymIdInvalid
            } else {
                Issue::RelatedNameMissing
            };
            tracing::debug!(name = %rel.name_id, related = %rel.related_name_id, "Name relation to unknown name");
            self.add_issues(rel.verbatim_key, &[issue])?;
            return Ok(None);
        };
        if from == to {
            self.add_issues(rel.verbatim_key, &[Issue::SelfReferencedRelation])?;
            return Ok(None);
        }
        let props = EdgeProps {
            reference_id: rel.reference_id.clone(),
            verbatim_key: rel.verbatim_key,
            remarks: rel.remarks.clone(),
            ..EdgeProps::default()
        };
        Ok(Some(w.create_edge(from, to, RelType::from_nom(rel.rel_type), props)?))
    }

    /// Creates the edge of a taxon concept relation between two usages.
    ///
    /// Returns `None` and flags `RELATED_TAXON_MISSING` if a usage is unknown.
    ///
    /// # Errors
    ///
    /// Returns a storage or graph error.
    pub fn create_concept_rel(
        &self,
        w: &mut dyn GraphWrite,
        rel: &TaxonConceptRelation,
    ) -> Result<Option<EdgeId>> {
        let from = self.usages.get(&rel.taxon_id)?.and_then(|u| u.node);
        let to = self.usages.get(&rel.related_taxon_id)?.and_then(|u| u.node);
        let (Some(from), Some(to)) = (from, to) else {
            self.add_issues(rel.verbatim_key, &[Issue::RelatedTaxonMissing])?;
            return Ok(None);
        };
        let props = EdgeProps {
            reference_id: rel.reference_id.clone(),
            verbatim_key: rel.verbatim_key,
            remarks: rel.remarks.clone(),
            concept: Some(rel.rel_type),
            ..EdgeProps::default()
        };
        Ok(Some(w.create_edge(from, to, RelType::TaxonConceptRelation, props)?))
    }

    /// Creates the edge of a species interaction.
    ///
    /// A related taxon outside the dataset is represented by the dev-null
    /// node; its scientific name stays on the edge.
    ///
    /// # Errors
    ///
    /// Returns a storage or graph error.
    pub fn create_species_interaction(
        &self,
        w: &mut dyn GraphWrite,
        rel: &SpeciesInteraction,
    ) -> Result<Option<EdgeId>> {
        let Some(from) = self.usages.get(&rel.taxon_id)?.and_then(|u| u.node) else {
            self.add_issues(rel.verbatim_key, &[Issue::RelatedTaxonMissing])?;
            return Ok(None);
        };
        let related = match &rel.related_taxon_id {
            Some(id) => self.usages.get(id)?.and_then(|u| u.node),
            None => None,
        };
        if related.is_none() && rel.related_taxon_id.is_some() {
            self.add_issues(rel.verbatim_key, &[Issue::RelatedTaxonMissing])?;
        }
        let props = EdgeProps {
            reference_id: rel.reference_id.clone(),
            verbatim_key: rel.verbatim_key,
            remarks: rel.remarks.clone(),
            scientific_name: rel.related_scientific_name.clone(),
            interaction: Some(rel.interaction_type),
            ..EdgeProps::default()
        };
        let to = related.unwrap_or(self.dev_null);
        Ok(Some(w.create_edge(from, to, RelType::SpeciesInteraction, props)?))
    }

    /// All nomenclatural relations touching a name node.
    ///
    /// # Errors
    ///
    /// Returns a graph error.
    pub fn name_relations(
        &self,
        tx: &Transaction<'_>,
        name_node: NodeId,
    ) -> Result<Vec<NameRelation>> {
        tx.incident_edges(name_node)
            .iter()
            .filter(|e| e.rel.is_name_relation())
            .map(|e| self.to_name_relation(tx, e))
            .collect()
    }

    /// Reads a name relation edge back into a record.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedEdge` for an edge of another type.
    pub fn to_name_relation(&self, tx: &Transaction<'_>, edge: &Edge) -> Result<NameRelation> {
        let rel_type = edge.rel.to_nom().context(UnexpectedEdgeSnafu {
            edge: edge.id,
            rel: edge.rel,
            expected: "name relation",
        })?;
        Ok(NameRelation {
            rel_type,
            name_id: tx.props(edge.start)?.id.clone(),
            related_name_id: tx.props(edge.end)?.id.clone(),
            reference_id: edge.props.reference_id.clone(),
            verbatim_key: edge.props.verbatim_key,
            remarks: edge.props.remarks.clone(),
        })
    }

    /// Reads a taxon concept relation edge back into a record.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedEdge` for an edge of another type.
    pub fn to_concept_relation(
        &self,
        tx: &Transaction<'_>,
        edge: &Edge,
    ) -> Result<TaxonConceptRelation> {
        let rel_type = edge
            .props
            .concept
            .filter(|_| edge.rel == RelType::TaxonConceptRelation)
            .context(UnexpectedEdgeSnafu {
                edge: edge.id,
                rel: edge.rel,
                expected: "taxon concept relation",
            })?;
        Ok(TaxonConceptRelation {
            rel_type,
            taxon_id: tx.props(edge.start)?.id.clone(),
            related_taxon_id: tx.props(edge.end)?.id.clone(),
            reference_id: edge.props.reference_id.clone(),
            verbatim_key: edge.props.verbatim_key,
            remarks: edge.props.remarks.clone(),
        })
    }

    /// Reads a species interaction edge back into a record.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedEdge` for an edge of another type.
    pub fn to_species_interaction(
        &self,
        tx: &Transaction<'_>,
        edge: &Edge,
    ) -> Result<SpeciesInteraction> {
        let interaction_type = edge
            .props
            .interaction
            .filter(|_| edge.rel == RelType::SpeciesInteraction)
            .context(UnexpectedEdgeSnafu {
                edge: edge.id,
                rel: edge.rel,
                expected: "species interaction",
            })?;
        let related_taxon_id = if tx.has_label(edge.end, Label::DevNull)? {
            None
        } else {
            Some(tx.props(edge.end)?.id.clone())
        };
        Ok(SpeciesInteraction {
            interaction_type,
            taxon_id: tx.props(edge.start)?.id.clone(),
            related_taxon_id,
            related_scientific_name: edge.props.scientific_name.clone(),
            reference_id: edge.props.reference_id.clone(),
            verbatim_key: edge.props.verbatim_key,
            remarks: edge.props.remarks.clone(),
        })
    }

    /// Flags `issue` on the verbatim record of the usage behind `node`.
    pub(crate) fn flag_usage(&self, tx: &Transaction<'_>, node: NodeId, issue: Issue) -> Result<()> {
        let id = &tx.props(node)?.id;
        if let Some(usage) = self.usages.get(id)? {
            self.add_issues(usage.verbatim_key(), &[issue])?;
        }
        Ok(())
    }

    /// Flags `issue` on the verbatim record of the name behind `node`.
    pub(crate) fn flag_name(&self, tx: &Transaction<'_>, node: NodeId, issue: Issue) -> Result<()> {
        let id = &tx.props(node)?.id;
        if let Some(name) = self.names.get(id)? {
            self.add_issues(name.verbatim_key(), &[issue])?;
        }
        Ok(())
    }

    /// Scientific name and authorship of a usage or name node, for logs.
    pub(crate) fn label_of(&self, tx: &Transaction<'_>, node: NodeId) -> String {
        let name_node = match tx.has_label(node, Label::Name) {
            Ok(true) => node,
            _ => match self.usage_name_node(tx, node) {
                Ok(name_node) => name_node,
                Err(_) => return node.to_string(),
            },
        };
        match tx.props(name_node) {
            Ok(props) => match (&props.scientific_name, &props.authorship) {
                (Some(name), Some(author)) => format!("{name} {author}"),
                (Some(name), None) => name.clone(),
                _ => node.to_string(),
            },
            Err(_) => node.to_string(),
        }
    }
}
