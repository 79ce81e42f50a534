//! redb persistence of the node and edge tables.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use redb::{Database, Durability, ReadableTable, TableDefinition, WriteTransaction};
use snafu::ResultExt;
use taxostage_types::codec;

use crate::{
    data::{EdgeSlot, GraphData, NodeSlot},
    error::{BeginStorageSnafu, CodecSnafu, CommitSnafu, OpenSnafu, OpenTableSnafu, Result, StorageSnafu},
    model::{EdgeId, NodeId},
};

const NODES: TableDefinition<u64, &[u8]> = TableDefinition::new("nodes");
const EDGES: TableDefinition<u64, &[u8]> = TableDefinition::new("edges");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const NEXT_NODE: &str = "next_node";
const NEXT_EDGE: &str = "next_edge";

/// The graph file. Holds no data in memory; see [`GraphData`].
#[derive(Debug)]
pub(crate) struct GraphFile {
    db: Database,
    path: PathBuf,
    durable: bool,
}

impl GraphFile {
    pub(crate) fn open(path: &Path, durable: bool) -> Result<Self> {
        let db = Database::create(path).context(OpenSnafu { path: path.display().to_string() })?;
        let file = Self { db, path: path.to_path_buf(), durable };

        let txn = file.begin_write()?;
        txn.open_table(NODES).context(OpenTableSnafu)?;
        txn.open_table(EDGES).context(OpenTableSnafu)?;
        txn.open_table(META).context(OpenTableSnafu)?;
        txn.commit().context(CommitSnafu)?;
        Ok(file)
    }

    /// Reads every stored node and edge.
    pub(crate) fn load(&self) -> Result<GraphData> {
        let txn = self.db.begin_read().context(BeginStorageSnafu)?;
        let mut data = GraphData::default();

        let nodes = txn.open_table(NODES).context(OpenTableSnafu)?;
        for entry in nodes.iter().context(StorageSnafu)? {
            let (key, value) = entry.context(StorageSnafu)?;
            let slot: NodeSlot = codec::decode(value.value()).context(CodecSnafu)?;
            data.restore_node(NodeId::new(key.value()), slot);
        }

        let edges = txn.open_table(EDGES).context(OpenTableSnafu)?;
        for entry in edges.iter().context(StorageSnafu)? {
            let (key, value) = entry.context(StorageSnafu)?;
            let slot: EdgeSlot = codec::decode(value.value()).context(CodecSnafu)?;
            data.restore_edge(EdgeId::new(key.value()), slot);
        }

        let meta = txn.open_table(META).context(OpenTableSnafu)?;
        let next_node = meta.get(NEXT_NODE).context(StorageSnafu)?.map_or(0, |v| v.value());
        let next_edge = meta.get(NEXT_EDGE).context(StorageSnafu)?.map_or(0, |v| v.value());
        data.pad(next_node, next_edge);

        tracing::debug!(
            path = %self.path.display(),
            nodes = data.node_count(),
            edges = data.edge_count(),
            "Loaded graph"
        );
        Ok(data)
    }

    /// Writes the listed rows in one write transaction. Ids no longer present
    /// in `data` are removed from the file.
    pub(crate) fn persist(
        &self,
        data: &GraphData,
        nodes: &BTreeSet<NodeId>,
        edges: &BTreeSet<EdgeId>,
    ) -> Result<()> {
        let txn = self.begin_write()?;
        {
            let mut table = txn.open_table(NODES).context(OpenTableSnafu)?;
            for id in nodes {
                match data.node(*id) {
                    Some(slot) => {
                        let bytes = codec::encode(slot).context(CodecSnafu)?;
                        table.insert(id.value(), bytes.as_slice()).context(StorageSnafu)?;
                    },
                    None => {
                        table.remove(id.value()).context(StorageSnafu)?;
                    },
                }
            }

            let mut table = txn.open_table(EDGES).context(OpenTableSnafu)?;
            for id in edges {
                match data.edge_slot(*id) {
                    Some(slot) => {
                        let bytes = codec::encode(slot).context(CodecSnafu)?;
                        table.insert(id.value(), bytes.as_slice()).context(StorageSnafu)?;
                    },
                    None => {
                        table.remove(id.value()).context(StorageSnafu)?;
                    },
                }
            }

            let mut meta = txn.open_table(META).context(OpenTableSnafu)?;
            meta.insert(NEXT_NODE, data.next_node_id().value()).context(StorageSnafu)?;
            meta.insert(NEXT_EDGE, data.next_edge_id().value()).context(StorageSnafu)?;
        }
        txn.commit().context(CommitSnafu)
    }

    fn begin_write(&self) -> Result<WriteTransaction> {
        let mut txn = self.db.begin_write().context(BeginStorageSnafu)?;
        txn.set_durability(if self.durable { Durability::Immediate } else { Durability::None });
        Ok(txn)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use taxostage_test_utils::TestDir;

    use super::*;
    use crate::model::{EdgeProps, Label, LabelSet, NodeProps, RelType};

    #[test]
    fn test_persist_and_load_keeps_tombstones() {
        let dir = TestDir::new();
        let path = dir.graph_file();

        let mut data = GraphData::default();
        let a = data.insert_node(NodeSlot {
            labels: LabelSet::of(Label::Taxon),
            props: NodeProps::with_id("a"),
        });
        let b = data.insert_node(NodeSlot {
            labels: LabelSet::of(Label::Taxon),
            props: NodeProps::with_id("b"),
        });
        let c = data.insert_node(NodeSlot {
            labels: LabelSet::of(Label::Name),
            props: NodeProps::with_id("c"),
        });
        let e = data.insert_edge(EdgeSlot {
            start: a,
            end: b,
            rel: RelType::ParentOf,
            props: EdgeProps::default(),
        });

        {
            let file = GraphFile::open(&path, false).unwrap();
            let nodes = data.node_ids().collect();
            let edges = data.edge_ids().collect();
            file.persist(&data, &nodes, &edges).unwrap();
            data.remove_node(c);
            file.persist(&data, &BTreeSet::from([c]), &BTreeSet::new()).unwrap();
        }

        let file = GraphFile::open(&path, false).unwrap();
        let loaded = file.load().unwrap();
        assert_eq!(loaded.node_count(), 2);
        assert_eq!(loaded.next_node_id(), NodeId::new(3));
        assert!(!loaded.contains_node(c));
        assert_eq!(loaded.edges(b, RelType::ParentOf, crate::Direction::Incoming), [e]);
    }
}
