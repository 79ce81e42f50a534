//! Read accessors joining graph nodes with their records.

use std::collections::{BTreeSet, HashSet, VecDeque};

use snafu::OptionExt;
use taxostage_graph::{Direction, Label, NodeId, RelType, Transaction};
use taxostage_types::{
    Issue, Rank, VerbatimKey,
    normalize::{HYBRID_MARKER, hybrid_variant},
};

use crate::{
    StagingDb,
    error::{MissingNameSnafu, MissingRecordSnafu, Result},
    model::{RankedUsage, StagedName, StagedUsage},
};

impl StagingDb {
    /// The name node linked to a usage node by its `HAS_NAME` edge.
    ///
    /// # Errors
    ///
    /// Returns `MissingName` if the usage has no name, or
    /// `GraphError::Multiplicity` if it has several.
    pub fn usage_name_node(&self, tx: &Transaction<'_>, usage: NodeId) -> Result<NodeId> {
        let edge = tx
            .single_edge(usage, RelType::HasName, Direction::Outgoing)?
            .context(MissingNameSnafu { node: usage })?;
        Ok(edge.end)
    }

    /// The name record of a name node.
    ///
    /// # Errors
    ///
    /// Returns `MissingRecord` if no name is stored for the node.
    pub fn name_by_node(&self, tx: &Transaction<'_>, node: NodeId) -> Result<StagedName> {
        let id = &tx.props(node)?.id;
        self.names.get(id)?.context(MissingRecordSnafu { kind: "name", node })
    }

    /// The name record of a usage node.
    ///
    /// # Errors
    ///
    /// Returns `MissingName` or `MissingRecord`.
    pub fn name_by_usage(&self, tx: &Transaction<'_>, usage: NodeId) -> Result<StagedName> {
        let name_node = self.usage_name_node(tx, usage)?;
        self.name_by_node(tx, name_node)
    }

    /// The usage record of a usage node, without its name.
    ///
    /// # Errors
    ///
    /// Returns `MissingRecord` if no usage is stored for the node.
    pub fn usage_by_node(&self, tx: &Transaction<'_>, node: NodeId) -> Result<StagedUsage> {
        let id = &tx.props(node)?.id;
        self.usages.get(id)?.context(MissingRecordSnafu { kind: "usage", node })
    }

    /// The usage record of a usage node with its name attached.
    ///
    /// # Errors
    ///
    /// Returns `MissingName` or `MissingRecord`.
    pub fn usage_with_name(&self, tx: &Transaction<'_>, node: NodeId) -> Result<StagedUsage> {
        let mut usage = self.usage_by_node(tx, node)?;
        let name = self.name_by_usage(tx, node)?;
        usage.name_node = name.node;
        usage.usage.name = Some(name.name);
        Ok(usage)
    }

    /// Like [`usage_with_name`](Self::usage_with_name), looked up by usage id.
    ///
    /// # Errors
    ///
    /// Returns `MissingName` or `MissingRecord`.
    pub fn usage_with_name_by_id(
        &self,
        tx: &Transaction<'_>,
        id: &str,
    ) -> Result<Option<StagedUsage>> {
        match self.usages.get(id)?.and_then(|u| u.node) {
            Some(node) => self.usage_with_name(tx, node).map(Some),
            None => Ok(None),
        }
    }

    /// Usage nodes pointing at a name node.
    pub fn usage_nodes_by_name(&self, tx: &Transaction<'_>, name_node: NodeId) -> Vec<NodeId> {
        tx.related(name_node, RelType::HasName, Direction::Incoming)
    }

    /// Usage nodes whose name matches `scientific_name`.
    ///
    /// A name without hybrid marker also matches its `× ` variant. With a
    /// `rank`, only names of that rank match, plus unranked names if
    /// `include_unranked` is set. With an `authorship`, only names with equal
    /// authorship ignoring case match.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn usages_by_name(
        &self,
        tx: &Transaction<'_>,
        scientific_name: &str,
        authorship: Option<&str>,
        rank: Option<Rank>,
        include_unranked: bool,
    ) -> Result<BTreeSet<NodeId>> {
        let mut names = self.names.nodes_by_name(scientific_name)?;
        if !scientific_name.starts_with(HYBRID_MARKER) {
            names.extend(self.names.nodes_by_name(&hybrid_variant(scientific_name))?);
        }

        let mut usages = BTreeSet::new();
        for name in names {
            let Ok(props) = tx.props(name) else {
                continue;
            };
            if let Some(rank) = rank {
                let actual = props.rank.unwrap_or(Rank::Unranked);
                if actual != rank && !(include_unranked && actual == Rank::Unranked) {
                    continue;
                }
            }
            if let Some(authorship) = authorship {
                let matches = props
                    .authorship
                    .as_deref()
                    .is_some_and(|a| a.to_lowercase() == authorship.to_lowercase());
                if !matches {
                    continue;
                }
            }
            usages.extend(self.usage_nodes_by_name(tx, name));
        }
        Ok(usages)
    }

    /// The only usage matching name, authorship and rank exactly.
    ///
    /// Several matches flag `NAME_NOT_UNIQUE` on `verbatim_key` and yield
    /// `None`.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn usage_by_name_unique(
        &self,
        tx: &Transaction<'_>,
        scientific_name: &str,
        authorship: Option<&str>,
        rank: Option<Rank>,
        verbatim_key: Option<VerbatimKey>,
    ) -> Result<Option<NodeId>> {
        let matches = self.usages_by_name(tx, scientific_name, authorship, rank, false)?;
        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.into_iter().next()),
            count => {
                tracing::warn!(
                    name = scientific_name,
                    authorship = authorship.unwrap_or(""),
                    count,
                    "Scientific name is not unique"
                );
                self.add_issues(verbatim_key, &[Issue::NameNotUnique])?;
                Ok(None)
            },
        }
    }

    /// Name nodes no usage points at.
    pub fn bare_name_nodes(&self, tx: &Transaction<'_>) -> Vec<NodeId> {
        tx.nodes_with_label(Label::Name)
            .into_iter()
            .filter(|n| tx.degree(*n, RelType::HasName, Direction::Incoming) == 0)
            .collect()
    }

    /// Summary of a usage node and its name.
    ///
    /// # Errors
    ///
    /// Returns `MissingName` or a graph error.
    pub fn ranked_usage(&self, tx: &Transaction<'_>, usage: NodeId) -> Result<RankedUsage> {
        let name_node = self.usage_name_node(tx, usage)?;
        let name = tx.props(name_node)?;
        Ok(RankedUsage {
            usage_node: usage,
            name_node,
            usage_id: tx.props(usage)?.id.clone(),
            scientific_name: name.scientific_name.clone().unwrap_or_default(),
            authorship: name.authorship.clone(),
            rank: name.rank.unwrap_or(Rank::Unranked),
        })
    }

    /// Accepted usages of a synonym; several for a pro parte synonym.
    ///
    /// # Errors
    ///
    /// Returns `MissingName` or a graph error.
    pub fn accepted(&self, tx: &Transaction<'_>, synonym: NodeId) -> Result<Vec<RankedUsage>> {
        tx.related(synonym, RelType::SynonymOf, Direction::Outgoing)
            .into_iter()
            .map(|n| self.ranked_usage(tx, n))
            .collect()
    }

    /// Synonyms pointing at an accepted usage.
    ///
    /// # Errors
    ///
    /// Returns `MissingName` or a graph error.
    pub fn synonyms(&self, tx: &Transaction<'_>, accepted: NodeId) -> Result<Vec<RankedUsage>> {
        tx.related(accepted, RelType::SynonymOf, Direction::Incoming)
            .into_iter()
            .map(|n| self.ranked_usage(tx, n))
            .collect()
    }

    /// Ancestors of a usage, nearest first.
    ///
    /// Follows the first incoming `PARENT_OF` edge at every level and stops
    /// at a root or when a node repeats.
    ///
    /// # Errors
    ///
    /// Returns `MissingName` or a graph error.
    pub fn parents(&self, tx: &Transaction<'_>, child: NodeId) -> Result<Vec<RankedUsage>> {
        let mut seen = HashSet::from([child]);
        let mut parents = Vec::new();
        let mut current = child;
        while let Some(parent) =
            tx.related(current, RelType::ParentOf, Direction::Incoming).first().copied()
        {
            if !seen.insert(parent) {
                tracing::warn!(node = %child, cycle_at = %parent, "Parent cycle");
                break;
            }
            parents.push(self.ranked_usage(tx, parent)?);
            current = parent;
        }
        Ok(parents)
    }

    /// Direct children of a usage.
    ///
    /// # Errors
    ///
    /// Returns `MissingName` or a graph error.
    pub fn children(&self, tx: &Transaction<'_>, parent: NodeId) -> Result<Vec<RankedUsage>> {
        tx.related(parent, RelType::ParentOf, Direction::Outgoing)
            .into_iter()
            .map(|n| self.ranked_usage(tx, n))
            .collect()
    }

    /// Name nodes connected to `name_node` by basionym edges in either
    /// direction, `name_node` included, in id order.
    pub fn homotypic_group(&self, tx: &Transaction<'_>, name_node: NodeId) -> Vec<NodeId> {
        let mut group = BTreeSet::from([name_node]);
        let mut queue = VecDeque::from([name_node]);
        while let Some(node) = queue.pop_front() {
            for other in tx.related(node, RelType::HasBasionym, Direction::Both) {
                if group.insert(other) {
                    queue.push_back(other);
                }
            }
        }
        group.into_iter().collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use taxostage_graph::GraphWrite;
    use taxostage_test_utils::{TestDir, fixtures};
    use taxostage_types::{Name, Usage, VerbatimRecord};

    use super::*;
    use crate::test_support::{add_usage, open_db};

    #[test]
    fn test_usage_with_name_attaches_name() {
        let dir = TestDir::new();
        let db = open_db(&dir);
        let (usage, name) = add_usage(&db, fixtures::taxon("u1", "Abies alba", Rank::Species));

        let tx = db.begin().unwrap();
        assert_eq!(db.usage_name_node(&tx, usage).unwrap(), name);
        let full = db.usage_with_name(&tx, usage).unwrap();
        assert_eq!(full.usage.name.unwrap().scientific_name, "Abies alba");
        assert_eq!(full.name_node, Some(name));
        assert_eq!(db.usage_nodes_by_name(&tx, name), vec![usage]);
        assert!(db.usage_with_name_by_id(&tx, "missing").unwrap().is_none());
    }

    #[test]
    fn test_usages_by_name_filters() {
        let dir = TestDir::new();
        let db = open_db(&dir);
        let (mill, _) = add_usage(
            &db,
            Usage::taxon(fixtures::species("Abies alba", "Mill.")).with_id("u1"),
        );
        let (unranked, _) = add_usage(
            &db,
            Usage::taxon(Name::new("Abies alba", Rank::Unranked)).with_id("u2"),
        );
        let (hybrid, _) = add_usage(
            &db,
            Usage::taxon(Name::new("× Abies alba", Rank::Species)).with_id("u3"),
        );

        let tx = db.begin().unwrap();
        let all = db.usages_by_name(&tx, "Abies alba", None, None, false).unwrap();
        assert_eq!(all, BTreeSet::from([mill, unranked, hybrid]));

        let species = db.usages_by_name(&tx, "Abies alba", None, Some(Rank::Species), false).unwrap();
        assert_eq!(species, BTreeSet::from([mill, hybrid]));

        let with_unranked =
            db.usages_by_name(&tx, "Abies alba", None, Some(Rank::Species), true).unwrap();
        assert_eq!(with_unranked.len(), 3);

        let by_author = db.usages_by_name(&tx, "Abies alba", Some("mill."), None, false).unwrap();
        assert_eq!(by_author, BTreeSet::from([mill]));

        let hybrid_only = db.usages_by_name(&tx, "× Abies alba", None, None, false).unwrap();
        assert_eq!(hybrid_only, BTreeSet::from([hybrid]));
    }

    #[test]
    fn test_ambiguous_name_flags_issue() {
        let dir = TestDir::new();
        let db = open_db(&dir);
        add_usage(&db, fixtures::taxon("u1", "Abies alba", Rank::Species));
        add_usage(&db, fixtures::taxon("u2", "Abies alba", Rank::Species));
        let key = db.put(&mut VerbatimRecord::new(9, "taxa.txt", "dwc:Taxon")).unwrap();

        let tx = db.begin().unwrap();
        let found =
            db.usage_by_name_unique(&tx, "Abies alba", None, Some(Rank::Species), Some(key)).unwrap();
        assert!(found.is_none());
        drop(tx);
        assert!(db.get_verbatim(key).unwrap().unwrap().has_issue(Issue::NameNotUnique));
    }

    #[test]
    fn test_parents_nearest_first_and_cycle_safe() {
        let dir = TestDir::new();
        let db = open_db(&dir);
        let (family, _) = add_usage(&db, fixtures::taxon("f", "Pinaceae", Rank::Family));
        let (genus, _) = add_usage(&db, fixtures::taxon("g", "Abies", Rank::Genus));
        let (species, _) = add_usage(&db, fixtures::taxon("s", "Abies alba", Rank::Species));

        let mut tx = db.begin().unwrap();
        db.assign_parent(&mut tx, family, genus).unwrap();
        db.assign_parent(&mut tx, genus, species).unwrap();
        let names: Vec<_> =
            db.parents(&tx, species).unwrap().into_iter().map(|p| p.scientific_name).collect();
        assert_eq!(names, ["Abies", "Pinaceae"]);

        tx.create_edge(species, family, RelType::ParentOf, Default::default()).unwrap();
        assert_eq!(db.parents(&tx, species).unwrap().len(), 2);
        assert_eq!(db.children(&tx, family).unwrap()[0].usage_id, "g");
    }

    #[test]
    fn test_bare_names_and_homotypic_group() {
        let dir = TestDir::new();
        let db = open_db(&dir);
        let (_, alba) = add_usage(&db, fixtures::taxon("u1", "Abies alba", Rank::Species));
        let (_, picea) = add_usage(&db, fixtures::synonym("u2", "Pinus picea"));
        let mut bare = crate::model::StagedUsage::new(fixtures::bare_name("b1", "Abies x", Rank::Species));
        let bare_node = db.create_name_and_usage(&mut bare).unwrap().unwrap().id();

        let mut tx = db.begin().unwrap();
        tx.create_edge(alba, picea, RelType::HasBasionym, Default::default()).unwrap();
        assert_eq!(db.bare_name_nodes(&tx), vec![bare_node]);
        assert_eq!(db.homotypic_group(&tx, picea), vec![alba, picea]);
        assert_eq!(db.homotypic_group(&tx, bare_node), vec![bare_node]);
    }
}
