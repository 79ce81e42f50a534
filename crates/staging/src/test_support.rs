//! Helpers shared by the unit tests of this crate.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]

use taxostage_graph::NodeId;
use taxostage_test_utils::{TestDir, init_tracing, test_staging_config};
use taxostage_types::Usage;

use crate::{StagingDb, model::StagedUsage};

pub(crate) fn open_db(dir: &TestDir) -> StagingDb {
    init_tracing();
    StagingDb::create(dir.path(), 1, 1, test_staging_config()).unwrap()
}

/// Creates the usage and returns its usage and name nodes.
pub(crate) fn add_usage(db: &StagingDb, usage: Usage) -> (NodeId, NodeId) {
    let mut staged = StagedUsage::new(usage);
    let name_node = db.create_name_and_usage(&mut staged).unwrap().unwrap().id();
    (staged.node.unwrap(), name_node)
}

/// Creates a bare name and returns its name node.
pub(crate) fn add_bare_name(db: &StagingDb, usage: Usage) -> NodeId {
    let mut staged = StagedUsage::new(usage);
    db.create_name_and_usage(&mut staged).unwrap().unwrap().id()
}
