//! Batch traversal over a loaded staging store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::disallowed_methods)]

mod common;

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use common::{load, open};
use taxostage_graph::{GraphWrite, Label, LabelSet, NodeId, Transaction};
use taxostage_staging::{
    BoxError, NodeBatchProcessor, PipelineError, StagingDb, StagingError, from_fn,
};
use taxostage_test_utils::{TestDir, assert_eventually, fixtures};
use taxostage_types::Rank;

/// Records visited nodes and commit notifications, failing at one node.
#[derive(Default)]
struct Recorder {
    visited: Vec<NodeId>,
    commits: Vec<usize>,
    fail_at: Option<usize>,
}

impl NodeBatchProcessor for Recorder {
    fn process(&mut self, tx: &mut Transaction<'_>, node: NodeId) -> Result<(), BoxError> {
        if self.fail_at == Some(self.visited.len()) {
            return Err(format!("cannot export node {node}").into());
        }
        tx.add_labels(node, LabelSet::of(Label::Root))?;
        self.visited.push(node);
        Ok(())
    }

    fn commit_batch(&mut self, total: usize) {
        self.commits.push(total);
    }
}

/// Sleeps on every node and publishes the committed total.
struct Throttled {
    committed: Arc<AtomicUsize>,
}

impl NodeBatchProcessor for Throttled {
    fn process(&mut self, _tx: &mut Transaction<'_>, _node: NodeId) -> Result<(), BoxError> {
        std::thread::sleep(Duration::from_millis(20));
        Ok(())
    }

    fn commit_batch(&mut self, total: usize) {
        self.committed.store(total, Ordering::SeqCst);
    }
}

fn load_taxa(db: &StagingDb, count: usize) -> Vec<NodeId> {
    (0..count)
        .map(|i| {
            let usage = fixtures::taxon(&format!("t{i}"), &format!("Abies sp{i}"), Rank::Species);
            load(db, usage).0
        })
        .collect()
}

fn roots(db: &StagingDb) -> usize {
    db.begin().unwrap().nodes_with_label(Label::Root).len()
}

#[test]
fn test_every_usage_visited_once() {
    let dir = TestDir::new();
    let db = open(&dir);
    let taxa = load_taxa(&db, 10);

    let mut recorder = Recorder::default();
    let total = db.process(Some(Label::Taxon), 3, &mut recorder).unwrap();

    assert_eq!(total, 10);
    assert_eq!(recorder.visited, taxa);
    assert_eq!(recorder.commits, vec![3, 6, 9, 10]);
    assert_eq!(roots(&db), 10);
}

#[test]
fn test_name_nodes_traversed_with_configured_batch_size() {
    let dir = TestDir::new();
    let db = open(&dir);
    load_taxa(&db, 5);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut processor = from_fn(move |tx: &mut Transaction<'_>, node| {
        let name = tx.props(node)?.scientific_name.clone().unwrap_or_default();
        sink.lock().unwrap().push(name);
        Ok(())
    });
    assert_eq!(db.process_all(Some(Label::Name), &mut processor).unwrap(), 5);
    assert_eq!(seen.lock().unwrap().len(), 5);
    assert!(seen.lock().unwrap().iter().all(|n| n.starts_with("Abies sp")));
}

#[test]
fn test_failing_node_rolls_back_its_batch() {
    let dir = TestDir::new();
    let db = open(&dir);
    load_taxa(&db, 9);

    let mut recorder = Recorder { fail_at: Some(4), ..Recorder::default() };
    let err = db.process(Some(Label::Taxon), 3, &mut recorder).unwrap_err();

    let StagingError::Pipeline { source } = err else {
        panic!("expected a pipeline error");
    };
    assert!(matches!(source, PipelineError::Callback { committed: 3, .. }));
    assert_eq!(recorder.commits, vec![3]);
    assert_eq!(roots(&db), 3);
}

#[test]
fn test_failing_batch_reverts_record_updates() {
    let dir = TestDir::new();
    let db = open(&dir);
    load_taxa(&db, 6);

    let mut seen = 0;
    let mut processor = from_fn(|tx: &mut Transaction<'_>, node| {
        let id = tx.props(node)?.id.clone();
        let mut staged = db.usages().get(&id)?.ok_or("missing usage")?;
        staged.usage.remarks = Some("exported".into());
        db.usages().update(&staged)?;
        seen += 1;
        if seen == 5 {
            return Err("export failed".into());
        }
        Ok(())
    });
    assert!(db.process(Some(Label::Taxon), 3, &mut processor).is_err());

    let exported: Vec<bool> = (0..6)
        .map(|i| db.usages().get(&format!("t{i}")).unwrap().unwrap().usage.remarks.is_some())
        .collect();
    assert_eq!(exported, [true, true, true, false, false, false]);
}

#[test]
fn test_cancellation_keeps_committed_batches() {
    let dir = TestDir::new();
    let db = open(&dir);
    load_taxa(&db, 9);

    let cancel = db.cancellation();
    let mut count = 0;
    let mut processor = from_fn(move |_tx: &mut Transaction<'_>, _node| {
        count += 1;
        if count == 4 {
            cancel.cancel();
        }
        Ok(())
    });
    let err = db.process(Some(Label::Taxon), 3, &mut processor).unwrap_err();
    let StagingError::Pipeline { source } = err else {
        panic!("expected a pipeline error");
    };
    assert!(matches!(source, PipelineError::Cancelled { committed: 3 }));

    db.cancellation().reset();
    assert_eq!(db.process(Some(Label::Taxon), 3, &mut Recorder::default()).unwrap(), 9);
}

#[test]
fn test_cancel_from_host_thread_stops_running_pipeline() {
    let dir = TestDir::new();
    let db = open(&dir);
    load_taxa(&db, 40);

    let committed = Arc::new(AtomicUsize::new(0));
    let cancel = db.cancellation();
    let result = std::thread::scope(|scope| {
        let worker = scope.spawn(|| {
            let mut processor = Throttled { committed: Arc::clone(&committed) };
            db.process(Some(Label::Taxon), 2, &mut processor)
        });
        assert!(assert_eventually(Duration::from_secs(10), || {
            committed.load(Ordering::SeqCst) >= 2
        }));
        cancel.cancel();
        worker.join().unwrap()
    });

    let StagingError::Pipeline { source } = result.unwrap_err() else {
        panic!("expected a pipeline error");
    };
    let PipelineError::Cancelled { committed: at_cancel } = source else {
        panic!("expected cancellation");
    };
    assert!(at_cancel >= 2);
    assert!(at_cancel < 40);
    assert_eq!(at_cancel % 2, 0);
    db.cancellation().reset();
}

#[test]
fn test_empty_label_processes_nothing() {
    let dir = TestDir::new();
    let db = open(&dir);
    load_taxa(&db, 2);

    let mut recorder = Recorder::default();
    assert_eq!(db.process(Some(Label::Synonym), 3, &mut recorder).unwrap(), 0);
    assert!(recorder.commits.is_empty());
}
