//! Provisional usages and the final identifier rewrite.

use std::collections::{BTreeMap, HashMap};

use taxostage_graph::{GraphWrite, Transaction};
use taxostage_types::{Name, Origin, Rank, Record, TaxonomicStatus, Usage, VerbatimRecord};

use crate::{
    StagingDb,
    error::Result,
    model::{RankedUsage, StagedUsage},
};

/// Verbatim terms copied from the source of a provisional usage.
const PARENT_TERMS: [&str; 2] = ["dwc:parentNameUsageID", "dwc:parentNameUsage"];

impl StagingDb {
    /// Creates a provisionally accepted taxon for `name`, using `source` as a
    /// template for its classification.
    ///
    /// Only the source classification above `exclude_rank` is copied. The
    /// parent terms of the source row are copied to a new verbatim record so
    /// the parent can be resolved later. Ids are generated.
    ///
    /// Returns `None` if no node could be created for the name.
    ///
    /// # Errors
    ///
    /// Returns a storage or graph error.
    pub fn create_provisional_usage_from_source(
        &self,
        w: &mut dyn GraphWrite,
        origin: Origin,
        mut name: Name,
        source: Option<&StagedUsage>,
        exclude_rank: Rank,
    ) -> Result<Option<RankedUsage>> {
        name.origin = origin;
        let mut usage = Usage::with_status(name.clone(), TaxonomicStatus::ProvisionallyAccepted);
        usage.origin = origin;
        let mut staged = StagedUsage::new(usage);

        if let Some(source) = source {
            staged.classification = source.classification.clone();
            staged.classification.clear_rank_and_below(exclude_rank);

            let source_terms = match source.verbatim_key() {
                Some(key) => self.get_verbatim(key)?,
                None => None,
            };
            if let Some(source_terms) = source_terms {
                let mut copy = VerbatimRecord::default();
                for term in PARENT_TERMS {
                    if let Some(value) = source_terms.get(term) {
                        copy.insert(term, value);
                    }
                }
                staged.usage.verbatim_key = Some(self.put(&mut copy)?);
            }
        }

        let Some(name_node) = self.create_name_and_usage_with(w, &mut staged)? else {
            return Ok(None);
        };
        let (Some(usage_node), Some(usage_id)) = (staged.node, staged.usage.id.clone()) else {
            return Ok(None);
        };
        tracing::debug!(usage = %usage_id, name = %name.scientific_name, ?origin, "Created provisional usage");
        Ok(Some(RankedUsage {
            usage_node,
            name_node: name_node.id(),
            usage_id,
            scientific_name: name.scientific_name,
            authorship: name.authorship,
            rank: name.rank,
        }))
    }

    /// Switches the id generator to the shortest final prefix no stored id
    /// starts with.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn update_id_generators(&self) -> Result<String> {
        let prefix = self.ids.rewrite_prefix(self.config().final_id_prefix, self.all_ids()?);
        tracing::info!(
            dataset = self.dataset_key(),
            %prefix,
            "Name/usage id generator updated with unique prefix"
        );
        Ok(prefix)
    }

    /// Replaces every temporary id with a final one.
    ///
    /// Records are moved to their new keys in every store, node properties
    /// are updated, and pointers between records and on edges follow. The
    /// old → new mapping stays available through
    /// [`resolve_id`](Self::resolve_id).
    ///
    /// Returns the number of ids rewritten.
    ///
    /// # Errors
    ///
    /// Returns a storage or graph error.
    #[tracing::instrument(skip(self), fields(dataset = self.dataset_key()))]
    pub fn rewrite_temporary_ids(&self) -> Result<usize> {
        if self.ids.is_temporary(&self.ids.prefix()) {
            self.update_id_generators()?;
        }

        let mut mapping = BTreeMap::new();
        for id in self.all_ids()? {
            if self.ids.is_temporary(&id) && !mapping.contains_key(&id) {
                let new = self.ids.next();
                mapping.insert(id, new);
            }
        }
        if mapping.is_empty() {
            tracing::debug!("No temporary ids to rewrite");
            return Ok(0);
        }

        for (old, new) in &mapping {
            self.names.rekey(old, new)?;
            self.usages.rekey(old, new)?;
            if self.references.rekey(old, new)?.is_none() {
                self.references.rekey_alias(old, new)?;
            }
            self.type_material.rekey(old, new)?;
        }
        let lookup = |id: &mut Option<String>| {
            if let Some(new) = id.as_deref().and_then(|old| mapping.get(old)) {
                *id = Some(new.clone());
                true
            } else {
                false
            }
        };

        for mut name in self.names.values()? {
            let published = lookup(&mut name.name.published_in_id);
            let homotypic = lookup(&mut name.name.homotypic_name_id);
            if published || homotypic {
                self.names.put(&name)?;
            }
        }
        for mut usage in self.usages.values()? {
            let parent = lookup(&mut usage.usage.parent_id);
            let according_to = lookup(&mut usage.usage.according_to_id);
            if parent || according_to {
                self.usages.update(&usage)?;
            }
        }
        for mut material in self.type_material.values()? {
            let name = lookup(&mut material.name_id);
            let reference = lookup(&mut material.reference_id);
            if name || reference {
                self.type_material.update(&material)?;
            }
        }
        self.graph.write(|tx| rewrite_graph_ids(tx, &mapping))?;

        let count = mapping.len();
        self.id_mapping.write().extend(mapping);
        tracing::info!(count, "Rewrote temporary ids");
        Ok(count)
    }

    /// The final id of a rewritten temporary id.
    pub fn resolve_id(&self, old: &str) -> Option<String> {
        self.id_mapping.read().get(old).cloned()
    }

    /// Logs the number of duplicate ids rejected by each store.
    pub fn report_duplicates(&self) {
        let counts = [
            ("name", self.names.duplicates()),
            ("usage", self.usages.duplicates()),
            ("reference", self.references.duplicates()),
            ("type material", self.type_material.duplicates()),
        ];
        for (kind, count) in counts {
            if count > 0 {
                tracing::warn!(
                    kind,
                    count,
                    "Dataset contains duplicate ids, only the first record is used"
                );
            }
        }
    }
}

fn rewrite_graph_ids(tx: &mut Transaction<'_>, mapping: &BTreeMap<String, String>) -> Result<()> {
    let mut nodes = HashMap::new();
    for node in tx.node_ids() {
        let props = tx.props(node)?;
        if let Some(new) = mapping.get(&props.id) {
            let mut props = props.clone();
            props.id = new.clone();
            nodes.insert(node, props);
        }
    }
    for (node, props) in nodes {
        tx.set_node_props(node, props)?;
    }
    for edge in tx.all_edges() {
        let new = edge.props.reference_id.as_deref().and_then(|id| mapping.get(id)).cloned();
        if let Some(new) = new {
            let mut props = edge.props;
            props.reference_id = Some(new);
            tx.set_edge_props(edge.id, props)?;
        }
    }
    Ok(())
}
