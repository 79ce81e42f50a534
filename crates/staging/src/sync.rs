//! Consistency pass run once the graph is complete.
//!
//! Each step runs in its own transaction. Dirty data is absorbed: conflicts
//! are logged and flagged on verbatim records, only structural violations
//! such as a usage with two names abort the pass.

use std::collections::HashSet;

use taxostage_graph::{Direction, Edge, GraphWrite, Label, LabelSet, NodeId, RelType, Transaction};
use taxostage_types::{Issue, TaxonomicStatus};

use crate::{StagingDb, error::Result};

/// Counts of the changes made by [`StagingDb::sync`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Basionym edges removed to break chains.
    pub chained_basionyms: usize,
    /// Taxa labelled as roots.
    pub roots: usize,
    /// Nodes labelled as usages.
    pub usages: usize,
    /// Names labelled as bare names.
    pub bare_names: usize,
    /// Names labelled as basionyms.
    pub basionyms: usize,
    /// Taxa whose cached parent id changed.
    pub parents_updated: usize,
    /// Taxa that had more than one parent.
    pub multiple_parents: usize,
    /// Usage records converted into synonyms.
    pub converted_synonyms: usize,
    /// Names whose homotypic name id changed.
    pub homotypic_names: usize,
}

impl StagingDb {
    /// Derives labels and cached record fields from the graph.
    ///
    /// Ends batch mode first if it is still active.
    ///
    /// # Errors
    ///
    /// Returns a storage or graph error, including a multiplicity error for a
    /// usage with more than one name.
    #[tracing::instrument(skip(self), fields(dataset = self.dataset_key()))]
    pub fn sync(&self) -> Result<SyncReport> {
        if self.is_batch_mode() {
            self.end_batch_mode()?;
        }
        let mut report = SyncReport::default();

        report.chained_basionyms = self.cut_chained_basionyms()?;
        report.roots = self.graph.write(|tx| self.label_roots(tx))?;
        tracing::info!(count = report.roots, "Labelled root nodes");
        (report.usages, report.bare_names) = self.graph.write(|tx| self.label_usages(tx))?;
        tracing::info!(count = report.usages, bare = report.bare_names, "Labelled usage nodes");
        report.basionyms = self.graph.write(|tx| self.label_basionyms(tx))?;
        tracing::info!(count = report.basionyms, "Labelled basionym nodes");
        self.graph.write(|tx| self.update_taxa(tx, &mut report))?;
        self.graph.write(|tx| self.update_synonyms(tx, &mut report))?;
        report.homotypic_names = self.graph.write(|tx| self.update_homotypic_names(tx))?;

        tracing::info!(?report, "Synced object store with graph");
        Ok(report)
    }

    // ========================================================================
    // Chained basionyms
    // ========================================================================

    fn cut_chained_basionyms(&self) -> Result<usize> {
        let mut cut = 0;
        loop {
            let removed = self.graph.write(|tx| self.cut_chained_basionym_round(tx))?;
            if removed == 0 {
                break;
            }
            cut += removed;
        }
        if cut > 0 {
            tracing::warn!(count = cut, "Removed chained basionym relations");
        }
        Ok(cut)
    }

    /// Cuts every chain that shares no node with a chain cut before in this round.
    fn cut_chained_basionym_round(&self, tx: &mut Transaction<'_>) -> Result<usize> {
        let mut touched = HashSet::new();
        let mut removed = 0;
        for first in tx.edges_of_type(RelType::HasBasionym) {
            let Some(second) = tx
                .edges(first.end, RelType::HasBasionym, Direction::Outgoing)
                .into_iter()
                .next()
            else {
                continue;
            };
            let nodes = [first.start, first.end, second.end];
            if nodes.iter().any(|n| touched.contains(n)) {
                continue;
            }
            touched.extend(nodes);

            let b1_uses = tx.degree(first.end, RelType::HasBasionym, Direction::Incoming);
            let b2_uses = tx.degree(second.end, RelType::HasBasionym, Direction::Incoming);
            let drop = if b1_uses < b2_uses { first } else { second };
            self.cut_basionym(tx, &drop)?;
            removed += 1;
        }
        Ok(removed)
    }

    fn cut_basionym(&self, tx: &mut Transaction<'_>, edge: &Edge) -> Result<()> {
        tracing::warn!(
            name = %self.label_of(tx, edge.start),
            basionym = %self.label_of(tx, edge.end),
            "Chained basionym, removing relation"
        );
        tx.delete_edge(edge.id)?;
        self.flag_name(tx, edge.start, Issue::ChainedBasionym)?;
        self.flag_name(tx, edge.end, Issue::ChainedBasionym)?;
        Ok(())
    }

    // ========================================================================
    // Labels
    // ========================================================================

    fn label_roots(&self, tx: &mut Transaction<'_>) -> Result<usize> {
        let mut count = 0;
        for node in tx.nodes_with_label(Label::Taxon) {
            if tx.degree(node, RelType::ParentOf, Direction::Incoming) == 0 {
                count += usize::from(set_label(tx, node, Label::Root, true)?);
            }
        }
        for node in tx.nodes_with_label(Label::Root) {
            let root = tx.has_label(node, Label::Taxon)?
                && tx.degree(node, RelType::ParentOf, Direction::Incoming) == 0;
            if !root {
                set_label(tx, node, Label::Root, false)?;
            }
        }
        Ok(count)
    }

    fn label_usages(&self, tx: &mut Transaction<'_>) -> Result<(usize, usize)> {
        let mut usages = 0;
        for label in [Label::Taxon, Label::Synonym] {
            for node in tx.nodes_with_label(label) {
                usages += usize::from(set_label(tx, node, Label::Usage, true)?);
            }
        }
        let mut bare = 0;
        for node in tx.nodes_with_label(Label::Name) {
            let unused = tx.degree(node, RelType::HasName, Direction::Incoming) == 0;
            if set_label(tx, node, Label::BareName, unused)? && unused {
                bare += 1;
            }
        }
        Ok((usages, bare))
    }

    fn label_basionyms(&self, tx: &mut Transaction<'_>) -> Result<usize> {
        let mut count = 0;
        for node in tx.nodes_with_label(Label::Name) {
            let basionym = tx.degree(node, RelType::HasBasionym, Direction::Incoming) > 0;
            if set_label(tx, node, Label::Basionym, basionym)? && basionym {
                count += 1;
            }
        }
        Ok(count)
    }

    // ========================================================================
    // Cached record fields
    // ========================================================================

    fn update_taxa(&self, tx: &mut Transaction<'_>, report: &mut SyncReport) -> Result<()> {
        for node in tx.nodes_with_label(Label::Taxon) {
            self.usage_name_node(tx, node)?;
            let Some(mut usage) = self.usages.get(&tx.props(node)?.id)? else {
                tracing::warn!(node = %node, "Taxon node without usage record");
                continue;
            };

            let parents = tx.edges(node, RelType::ParentOf, Direction::Incoming);
            if parents.len() > 1 {
                tracing::warn!(
                    taxon = %self.label_of(tx, node),
                    parents = parents.len(),
                    "Multiple parents found, keeping the first"
                );
                for extra in &parents[1..] {
                    tx.delete_edge(extra.id)?;
                }
                self.add_issues(usage.usage.verbatim_key, &[Issue::MultipleParents])?;
                report.multiple_parents += 1;
            }
            let parent_id = match parents.first() {
                Some(edge) => Some(tx.props(edge.start)?.id.clone()),
                None => None,
            };
            if usage.usage.parent_id != parent_id {
                usage.usage.parent_id = parent_id;
                self.usages.update(&usage)?;
                report.parents_updated += 1;
            }
        }
        Ok(())
    }

    fn update_synonyms(&self, tx: &mut Transaction<'_>, report: &mut SyncReport) -> Result<()> {
        for node in tx.nodes_with_label(Label::Synonym) {
            self.usage_name_node(tx, node)?;
            let Some(mut usage) = self.usages.get(&tx.props(node)?.id)? else {
                tracing::warn!(node = %node, "Synonym node without usage record");
                continue;
            };
            if !usage.is_synonym() {
                tracing::warn!(
                    usage = ?usage.usage.id,
                    name = %self.label_of(tx, node),
                    "Taxon to synonym conversion needed"
                );
                usage.usage.convert_to_synonym(TaxonomicStatus::Synonym);
                self.usages.update(&usage)?;
                self.add_issues(usage.usage.verbatim_key, &[Issue::DerivedTaxonomicStatus])?;
                report.converted_synonyms += 1;
            }
        }
        Ok(())
    }

    /// Points every name of a basionym group at the basionym.
    fn update_homotypic_names(&self, tx: &mut Transaction<'_>) -> Result<usize> {
        let mut count = 0;
        for basionym in tx.nodes_with_label(Label::Basionym) {
            let key = tx.props(basionym)?.id.clone();
            let mut group = tx.related(basionym, RelType::HasBasionym, Direction::Incoming);
            group.push(basionym);
            for node in group {
                let id = &tx.props(node)?.id;
                let Some(mut name) = self.names.get(id)? else {
                    continue;
                };
                if name.name.homotypic_name_id.as_deref() != Some(key.as_str()) {
                    name.name.homotypic_name_id = Some(key.clone());
                    self.names.put(&name)?;
                    count += 1;
                }
            }
        }
        Ok(count)
    }
}

/// Adds or removes `label`; returns true if the node changed.
fn set_label(tx: &mut Transaction<'_>, node: NodeId, label: Label, present: bool) -> Result<bool> {
    if tx.has_label(node, label)? == present {
        return Ok(false);
    }
    if present {
        tx.add_labels(node, LabelSet::of(label))?;
    } else {
        tx.remove_labels(node, LabelSet::of(label))?;
    }
    Ok(true)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use taxostage_graph::EdgeProps;
    use taxostage_test_utils::{TestDir, fixtures};
    use taxostage_types::Rank;

    use super::*;
    use crate::test_support::{add_bare_name, add_usage, open_db};

    #[test]
    fn test_labels_roots_usages_and_basionyms() {
        let dir = TestDir::new();
        let db = open_db(&dir);
        let (genus, _) = add_usage(&db, fixtures::taxon("g", "Abies", Rank::Genus));
        let (species, alba) = add_usage(&db, fixtures::taxon("s", "Abies alba", Rank::Species));
        let picea = add_bare_name(&db, fixtures::bare_name("b", "Pinus picea", Rank::Species));
        db.graph()
            .write(|tx| {
                db.assign_parent(tx, genus, species)?;
                db.create_rel(tx, alba, picea, RelType::HasBasionym, EdgeProps::default())?;
                tx.add_labels(species, LabelSet::of(Label::Root))?;
                Ok::<_, crate::StagingError>(())
            })
            .unwrap();

        let report = db.sync().unwrap();
        assert_eq!(report.roots, 1);
        assert_eq!(report.usages, 2);
        assert_eq!(report.basionyms, 1);

        let tx = db.begin().unwrap();
        assert!(tx.has_label(genus, Label::Root).unwrap());
        assert!(!tx.has_label(species, Label::Root).unwrap());
        assert!(tx.has_label(species, Label::Usage).unwrap());
        assert!(tx.has_label(picea, Label::Basionym).unwrap());
        assert!(tx.has_label(picea, Label::BareName).unwrap());
        assert!(!tx.has_label(alba, Label::BareName).unwrap());
        drop(tx);

        assert_eq!(db.usages().get("s").unwrap().unwrap().usage.parent_id.as_deref(), Some("g"));
        assert_eq!(db.usages().get("g").unwrap().unwrap().usage.parent_id, None);
        assert_eq!(db.names().get("s").unwrap().unwrap().name.homotypic_name_id.as_deref(), Some("b"));
        assert_eq!(db.names().get("b").unwrap().unwrap().name.homotypic_name_id.as_deref(), Some("b"));
    }

    #[test]
    fn test_sync_is_idempotent() {
        let dir = TestDir::new();
        let db = open_db(&dir);
        let (genus, _) = add_usage(&db, fixtures::taxon("g", "Abies", Rank::Genus));
        let (species, _) = add_usage(&db, fixtures::taxon("s", "Abies alba", Rank::Species));
        db.graph().write(|tx| db.assign_parent(tx, genus, species)).unwrap();

        db.sync().unwrap();
        assert_eq!(db.sync().unwrap(), SyncReport::default());
    }

    #[test]
    fn test_synonym_label_converts_record() {
        let dir = TestDir::new();
        let db = open_db(&dir);
        let (node, _) = add_usage(&db, fixtures::taxon("u", "Pinus picea", Rank::Species));
        db.graph()
            .write(|tx| {
                tx.set_labels(node, LabelSet::of(Label::Synonym))?;
                Ok::<_, crate::StagingError>(())
            })
            .unwrap();

        let report = db.sync().unwrap();
        assert_eq!(report.converted_synonyms, 1);
        let usage = db.usages().get("u").unwrap().unwrap();
        assert!(usage.is_synonym());
        let verbatim = db.get_verbatim(usage.usage.verbatim_key.unwrap()).unwrap().unwrap();
        assert!(verbatim.has_issue(Issue::DerivedTaxonomicStatus));
    }

    #[test]
    fn test_chained_basionym_cut_once() {
        let dir = TestDir::new();
        let db = open_db(&dir);
        let (_, a) = add_usage(&db, fixtures::taxon("a", "Abies alba", Rank::Species));
        let (_, b) = add_usage(&db, fixtures::taxon("b", "Pinus alba", Rank::Species));
        let (_, c) = add_usage(&db, fixtures::taxon("c", "Picea alba", Rank::Species));
        let (_, d) = add_usage(&db, fixtures::taxon("d", "Larix alba", Rank::Species));
        db.graph()
            .write(|tx| {
                // d → c gives c two incoming edges, so a → b is the edge to drop
                for (from, to) in [(a, b), (b, c), (d, c)] {
                    db.create_rel(tx, from, to, RelType::HasBasionym, EdgeProps::default())?;
                }
                Ok::<_, crate::StagingError>(())
            })
            .unwrap();

        let report = db.sync().unwrap();
        assert_eq!(report.chained_basionyms, 1);
        let tx = db.begin().unwrap();
        assert_eq!(tx.degree(a, RelType::HasBasionym, Direction::Outgoing), 0);
        assert_eq!(tx.degree(c, RelType::HasBasionym, Direction::Incoming), 2);
        drop(tx);

        let key = db.names().get("a").unwrap().unwrap().name.verbatim_key.unwrap();
        assert!(db.get_verbatim(key).unwrap().unwrap().has_issue(Issue::ChainedBasionym));
    }

    #[test]
    fn test_basionym_cycle_broken() {
        let dir = TestDir::new();
        let db = open_db(&dir);
        let names: Vec<_> = ["Abies alba", "Pinus alba", "Picea alba"]
            .iter()
            .enumerate()
            .map(|(i, n)| add_usage(&db, fixtures::taxon(&format!("n{i}"), n, Rank::Species)).1)
            .collect();
        db.graph()
            .write(|tx| {
                for i in 0..names.len() {
                    let next = names[(i + 1) % names.len()];
                    db.create_rel(tx, names[i], next, RelType::HasBasionym, EdgeProps::default())?;
                }
                Ok::<_, crate::StagingError>(())
            })
            .unwrap();

        let report = db.sync().unwrap();
        assert!(report.chained_basionyms >= 2);
        let tx = db.begin().unwrap();
        for edge in tx.edges_of_type(RelType::HasBasionym) {
            assert_eq!(tx.degree(edge.end, RelType::HasBasionym, Direction::Outgoing), 0);
        }
    }
}
