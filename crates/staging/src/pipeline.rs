//! Batch traversal of graph nodes.
//!
//! ## Architecture
//!
//! The calling thread acts as producer: it splits a snapshot of node ids into
//! fixed-size batches and offers them to a bounded queue. A scoped consumer
//! thread takes batches, opens one transaction per batch, applies the
//! [`NodeBatchProcessor`] to every node and commits. The producer ends the
//! stream with a poison message.
//!
//! Failures stop both sides:
//! - queue space not freed within the batch timeout: [`PipelineError::Backpressure`]
//! - the [`CancelToken`] fired: [`PipelineError::Cancelled`]
//! - the processor failed: [`PipelineError::Callback`], the batch is rolled back
//!
//! Batches committed before the failure stay committed. Every error reports
//! how many nodes that covers.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use snafu::Snafu;
use taxostage_graph::{GraphDb, GraphError, NodeId, Transaction};

/// Error type returned by node processors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Granularity at which a blocked producer re-checks cancellation.
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// Errors aborting a batch traversal.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PipelineError {
    /// The consumer did not free queue space in time.
    #[snafu(display(
        "Batch {batch} of {size} nodes could not be queued within the timeout ({committed} nodes committed)"
    ))]
    Backpressure {
        /// Index of the stalled batch.
        batch: usize,
        /// Nodes in the stalled batch.
        size: usize,
        /// Nodes committed before the failure.
        committed: usize,
    },

    /// The traversal was cancelled.
    #[snafu(display("Batch processing cancelled ({committed} nodes committed)"))]
    Cancelled {
        /// Nodes committed before the cancellation.
        committed: usize,
    },

    /// The node processor failed; its batch was rolled back.
    #[snafu(display("Node processor failed ({committed} nodes committed): {source}"))]
    Callback {
        /// Nodes committed before the failure.
        committed: usize,
        /// Processor error.
        source: BoxError,
    },

    /// Opening or committing a batch transaction failed.
    #[snafu(display("Batch transaction failed ({committed} nodes committed): {source}"))]
    Graph {
        /// Nodes committed before the failure.
        committed: usize,
        /// Graph error.
        source: GraphError,
    },

    /// The consumer thread panicked.
    #[snafu(display("Batch consumer panicked ({committed} nodes committed)"))]
    ConsumerPanicked {
        /// Nodes committed before the panic.
        committed: usize,
    },
}

impl PipelineError {
    /// Nodes committed before the traversal stopped.
    pub fn committed(&self) -> usize {
        match self {
            PipelineError::Backpressure { committed, .. }
            | PipelineError::Cancelled { committed }
            | PipelineError::Callback { committed, .. }
            | PipelineError::Graph { committed, .. }
            | PipelineError::ConsumerPanicked { committed } => *committed,
        }
    }
}

// ============================================================================
// Processor
// ============================================================================

/// Per-node operation applied by a batch traversal.
///
/// Runs on the consumer thread inside the batch transaction. Implementations
/// must not open transactions of their own: the graph lock is held for the
/// whole batch.
pub trait NodeBatchProcessor: Send {
    /// Processes one node. An error rolls back the current batch.
    ///
    /// # Errors
    ///
    /// Any error aborts the traversal.
    fn process(&mut self, tx: &mut Transaction<'_>, node: NodeId) -> Result<(), BoxError>;

    /// Called after each batch commit with the running total of committed nodes.
    fn commit_batch(&mut self, total: usize) {
        let _ = total;
    }
}

/// Processor backed by a closure. See [`from_fn`].
pub struct FnProcessor<F>(F);

impl<F> NodeBatchProcessor for FnProcessor<F>
where
    F: FnMut(&mut Transaction<'_>, NodeId) -> Result<(), BoxError> + Send,
{
    fn process(&mut self, tx: &mut Transaction<'_>, node: NodeId) -> Result<(), BoxError> {
        (self.0)(tx, node)
    }
}

/// Wraps a closure as a [`NodeBatchProcessor`].
pub fn from_fn<F>(f: F) -> FnProcessor<F>
where
    F: FnMut(&mut Transaction<'_>, NodeId) -> Result<(), BoxError> + Send,
{
    FnProcessor(f)
}

// ============================================================================
// Cancellation
// ============================================================================

/// Shared flag interrupting a running traversal.
///
/// Once cancelled the token stays cancelled, failing every later traversal
/// at its first batch, until [`reset`](Self::reset) is called.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clears a previous cancellation.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ============================================================================
// Queue
// ============================================================================

#[derive(Debug)]
enum Message {
    Batch { index: usize, nodes: Vec<NodeId> },
    Poison,
}

#[derive(Debug, PartialEq, Eq)]
enum OfferError {
    Timeout,
    Cancelled,
    Closed,
}

#[derive(Debug)]
struct QueueState {
    items: VecDeque<Message>,
    closed: bool,
}

/// Bounded blocking queue between producer and consumer.
#[derive(Debug)]
struct BatchQueue {
    state: Mutex<QueueState>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl BatchQueue {
    fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState { items: VecDeque::with_capacity(capacity), closed: false }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    /// Waits up to `timeout` for space, re-checking `cancel` periodically.
    fn offer(
        &self,
        message: Message,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<(), OfferError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(OfferError::Closed);
            }
            if cancel.is_cancelled() {
                return Err(OfferError::Cancelled);
            }
            if state.items.len() < self.capacity {
                state.items.push_back(message);
                self.not_empty.notify_one();
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(OfferError::Timeout);
            }
            let slice = WAIT_SLICE.min(deadline - now);
            self.not_full.wait_for(&mut state, slice);
        }
    }

    /// Blocks until a message arrives. Returns `None` once closed.
    fn take(&self) -> Option<Message> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(message) = state.items.pop_front() {
                self.not_full.notify_one();
                return Some(message);
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Discards queued messages and wakes both sides.
    fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.items.clear();
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}

/// Closes the queue when the consumer exits, however it exits.
struct CloseOnDrop<'q>(&'q BatchQueue);

impl Drop for CloseOnDrop<'_> {
    fn drop(&mut self) {
        self.0.close();
    }
}

// ============================================================================
// Run
// ============================================================================

/// Limits of one traversal.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PipelineLimits {
    pub batch_size: usize,
    pub timeout: Duration,
    pub capacity: usize,
}

/// Applies `processor` to every node in `nodes`, one transaction per batch.
///
/// Returns the number of processed nodes.
#[tracing::instrument(skip_all, fields(nodes = nodes.len(), batch_size = limits.batch_size))]
pub(crate) fn run<P>(
    graph: &GraphDb,
    nodes: Vec<NodeId>,
    limits: PipelineLimits,
    cancel: &CancelToken,
    processor: &mut P,
) -> Result<usize, PipelineError>
where
    P: NodeBatchProcessor + ?Sized,
{
    let batch_size = limits.batch_size.max(1);
    let queue = BatchQueue::new(limits.capacity);
    let committed = AtomicUsize::new(0);

    std::thread::scope(|scope| {
        let consumer = scope.spawn(|| {
            let _close = CloseOnDrop(&queue);
            consume(graph, &queue, cancel, &committed, processor)
        });

        let mut produced = Ok(());
        for (index, chunk) in nodes.chunks(batch_size).enumerate() {
            let message = Message::Batch { index, nodes: chunk.to_vec() };
            if let Err(err) = queue.offer(message, limits.timeout, cancel) {
                produced = Err((err, index, chunk.len()));
                break;
            }
        }
        if produced.is_ok() {
            if let Err(err) = queue.offer(Message::Poison, limits.timeout, cancel) {
                produced = Err((err, nodes.len().div_ceil(batch_size), 0));
            }
        }
        if produced.is_err() {
            queue.close();
        }

        let consumed = consumer.join();
        let committed = committed.load(Ordering::SeqCst);
        match (consumed, produced) {
            (Err(_), _) => ConsumerPanickedSnafu { committed }.fail(),
            (Ok(Err(err)), _) => Err(err),
            (Ok(Ok(_)), Err((OfferError::Timeout, batch, size))) => {
                tracing::error!(batch, size, committed, "Batch queue stalled");
                BackpressureSnafu { batch, size, committed }.fail()
            },
            (Ok(Ok(_)), Err((OfferError::Cancelled, ..))) => CancelledSnafu { committed }.fail(),
            // The consumer only closes the queue early on error.
            (Ok(Ok(_)), Err((OfferError::Closed, ..))) => CancelledSnafu { committed }.fail(),
            (Ok(Ok(total)), Ok(())) => {
                tracing::debug!(total, "Batch traversal completed");
                Ok(total)
            },
        }
    })
}

fn consume<P>(
    graph: &GraphDb,
    queue: &BatchQueue,
    cancel: &CancelToken,
    committed: &AtomicUsize,
    processor: &mut P,
) -> Result<usize, PipelineError>
where
    P: NodeBatchProcessor + ?Sized,
{
    let mut total = 0;
    while let Some(message) = queue.take() {
        let Message::Batch { index, nodes } = message else {
            return Ok(total);
        };

        let mut tx = graph.begin().map_err(|source| PipelineError::Graph { committed: total, source })?;
        for node in &nodes {
            if cancel.is_cancelled() {
                tracing::info!(batch = index, committed = total, "Batch processing cancelled");
                return CancelledSnafu { committed: total }.fail();
            }
            if let Err(source) = processor.process(&mut tx, *node) {
                tracing::warn!(batch = index, node = %node, error = %source, "Node processor failed");
                return Err(PipelineError::Callback { committed: total, source });
            }
        }
        tx.commit().map_err(|source| PipelineError::Graph { committed: total, source })?;

        total += nodes.len();
        committed.store(total, Ordering::SeqCst);
        processor.commit_batch(total);
        tracing::debug!(batch = index, total, "Committed batch");
    }
    // Closed by the producer after a failure it reports itself.
    Ok(total)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use taxostage_graph::{GraphWrite, Label, LabelSet, NodeProps};
    use taxostage_test_utils::TestDir;

    use super::*;

    fn limits(batch_size: usize) -> PipelineLimits {
        PipelineLimits { batch_size, timeout: Duration::from_secs(10), capacity: 2 }
    }

    fn graph_with_taxa(dir: &TestDir, count: usize) -> (GraphDb, Vec<NodeId>) {
        let graph = GraphDb::open(dir.graph_file(), false).unwrap();
        let mut tx = graph.begin().unwrap();
        let nodes = (0..count)
            .map(|i| {
                tx.create_node(LabelSet::of(Label::Taxon), NodeProps::with_id(format!("t{i}")))
                    .unwrap()
                    .id()
            })
            .collect();
        tx.commit().unwrap();
        (graph, nodes)
    }

    #[test]
    fn test_every_node_processed_once() {
        let dir = TestDir::new();
        let (graph, nodes) = graph_with_taxa(&dir, 25);
        let mut seen = Vec::new();
        let mut processor = from_fn(|_tx: &mut Transaction<'_>, node| {
            seen.push(node);
            Ok(())
        });

        let total = run(&graph, nodes.clone(), limits(4), &CancelToken::new(), &mut processor).unwrap();
        assert_eq!(total, 25);
        assert_eq!(seen, nodes);
    }

    #[test]
    fn test_empty_input() {
        let dir = TestDir::new();
        let (graph, _) = graph_with_taxa(&dir, 0);
        let mut processor = from_fn(|_tx: &mut Transaction<'_>, _node| Ok(()));
        assert_eq!(run(&graph, Vec::new(), limits(4), &CancelToken::new(), &mut processor).unwrap(), 0);
    }

    struct FailAt {
        fail_at: usize,
        seen: usize,
        commits: Vec<usize>,
    }

    impl NodeBatchProcessor for FailAt {
        fn process(&mut self, tx: &mut Transaction<'_>, node: NodeId) -> Result<(), BoxError> {
            self.seen += 1;
            tx.add_labels(node, LabelSet::of(Label::Root))?;
            if self.seen == self.fail_at {
                return Err("broken record".into());
            }
            Ok(())
        }

        fn commit_batch(&mut self, total: usize) {
            self.commits.push(total);
        }
    }

    #[test]
    fn test_failed_batch_is_rolled_back() {
        let dir = TestDir::new();
        let (graph, nodes) = graph_with_taxa(&dir, 10);
        let mut processor = FailAt { fail_at: 6, seen: 0, commits: Vec::new() };

        let err = run(&graph, nodes, limits(4), &CancelToken::new(), &mut processor).unwrap_err();
        assert!(matches!(err, PipelineError::Callback { committed: 4, .. }), "{err}");
        assert_eq!(processor.commits, vec![4]);

        let tx = graph.begin().unwrap();
        assert_eq!(tx.nodes_with_label(Label::Root).len(), 4);
    }

    #[test]
    fn test_cancelled_token_stops_run() {
        let dir = TestDir::new();
        let (graph, nodes) = graph_with_taxa(&dir, 10);
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut processor = from_fn(|_tx: &mut Transaction<'_>, _node| Ok(()));

        let err = run(&graph, nodes, limits(4), &cancel, &mut processor).unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled { committed: 0 }), "{err}");

        cancel.reset();
        assert!(!cancel.is_cancelled());
    }

    #[test]
    fn test_cancel_during_processing_keeps_committed_batches() {
        let dir = TestDir::new();
        let (graph, nodes) = graph_with_taxa(&dir, 12);
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let mut count = 0;
        let mut processor = from_fn(move |_tx: &mut Transaction<'_>, _node| {
            count += 1;
            if count == 5 {
                trigger.cancel();
            }
            Ok(())
        });

        let err = run(&graph, nodes, limits(4), &cancel, &mut processor).unwrap_err();
        assert_eq!(err.committed(), 4);
        assert!(matches!(err, PipelineError::Cancelled { .. }));
    }

    #[test]
    fn test_stalled_consumer_raises_backpressure() {
        let dir = TestDir::new();
        let (graph, nodes) = graph_with_taxa(&dir, 8);
        let mut first = true;
        let mut processor = from_fn(move |_tx: &mut Transaction<'_>, _node| {
            if first {
                first = false;
                std::thread::sleep(Duration::from_millis(400));
            }
            Ok(())
        });
        let limits = PipelineLimits { batch_size: 1, timeout: Duration::from_millis(100), capacity: 1 };

        let err = run(&graph, nodes, limits, &CancelToken::new(), &mut processor).unwrap_err();
        assert!(matches!(err, PipelineError::Backpressure { size: 1, .. }), "{err}");
    }

    #[test]
    fn test_queue_close_wakes_taker() {
        let queue = Arc::new(BatchQueue::new(1));
        let taker = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || queue.take().is_none())
        };
        std::thread::sleep(Duration::from_millis(20));
        queue.close();
        assert!(taker.join().unwrap());
        assert_eq!(
            queue.offer(Message::Poison, Duration::from_millis(10), &CancelToken::new()),
            Err(OfferError::Closed)
        );
    }
}
