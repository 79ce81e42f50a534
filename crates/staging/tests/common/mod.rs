//! Shared helpers for staging engine integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]

use taxostage_graph::NodeId;
use taxostage_staging::{StagedUsage, StagingDb};
use taxostage_test_utils::{TestDir, init_tracing, test_staging_config};
use taxostage_types::{Usage, VerbatimRecord};

/// Opens a fresh staging store for dataset 1, attempt 1.
pub fn open(dir: &TestDir) -> StagingDb {
    init_tracing();
    StagingDb::create(dir.path(), 1, 1, test_staging_config()).unwrap()
}

/// Loads a usage in the current mode and returns its usage and name nodes.
pub fn load(db: &StagingDb, usage: Usage) -> (NodeId, NodeId) {
    let mut staged = StagedUsage::new(usage);
    let name = db.create_name_and_usage(&mut staged).unwrap().unwrap();
    (staged.node.expect("usage node"), name.id())
}

/// Loads a usage read from `row` and returns its usage node.
pub fn load_from_row(db: &StagingDb, mut row: VerbatimRecord, mut usage: Usage) -> NodeId {
    usage.verbatim_key = Some(db.put(&mut row).unwrap());
    load(db, usage).0
}

/// Returns true if `issue` is flagged on the verbatim record of usage `id`.
pub fn usage_has_issue(db: &StagingDb, id: &str, issue: taxostage_types::Issue) -> bool {
    let usage = db.usages().get(id).unwrap().expect("usage record");
    let key = usage.usage.verbatim_key.expect("verbatim key");
    db.get_verbatim(key).unwrap().expect("verbatim record").has_issue(issue)
}
