//! Bounded-concurrency batch executor
//!
//! Production-ready bulk execution of asynchronous API operations with:
//! - A sliding-window concurrency limiter (fixed worker slots over a shared cursor)
//! - Per-operation outcome capture, index-addressed in input order
//! - Optional fail-fast short-circuit on the first observed rejection
//! - Progress tracking and structured logging

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::transport::{ConcurrencySource, TransportConcurrency, TransportProfile};

use super::types::{BatchOptions, Operation, Outcome, ProgressCallback};

/// Run-time bookkeeping for one batch invocation.
///
/// Owned by a single `execute` call; worker slots share it behind an `Arc`
/// and it is discarded once the returned future resolves.
struct BatchState<T, E> {
    /// Next operation index to dispatch. `fetch_add` hands each index to
    /// exactly one slot, so none is dispatched twice or skipped.
    cursor: AtomicUsize,
    /// Number of settled operations.
    completed: AtomicUsize,
    /// Set once by the first observed rejection in fail-fast mode; slots stop
    /// pulling new indices after it flips.
    aborted: AtomicBool,
    /// Pending operations, taken by index exactly once.
    pending: Vec<Mutex<Option<Operation<T, E>>>>,
    /// Index-addressed outcome cells, `None` until the operation settles.
    /// Each index is written at most once, so the per-cell locks never contend.
    outcomes: Vec<Mutex<Option<Outcome<T, E>>>>,
}

/// Executor for running many asynchronous operations with a ceiling on how
/// many are in flight at once.
pub struct BatchExecutor {
    /// Explicit concurrency ceiling; `None` defers to the source below.
    concurrency: Option<usize>,
    /// Reject the run with the first observed rejection.
    fail_fast: bool,
    /// Default-concurrency signal, injected rather than read from a global.
    concurrency_source: Arc<dyn ConcurrencySource>,
    /// Progress callback, invoked once per settled operation.
    progress_callback: Option<Arc<ProgressCallback>>,
}

impl BatchExecutor {
    /// Create a new batch executor with default settings: concurrency from a
    /// multiplexed-transport source, settle-all semantics.
    pub fn new() -> Self {
        Self {
            concurrency: None,
            fail_fast: false,
            concurrency_source: Arc::new(TransportConcurrency::new(TransportProfile::Multiplexed)),
            progress_callback: None,
        }
    }

    /// Set the concurrency ceiling (number of operations in flight at once).
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = Some(limit.max(1));
        self
    }

    /// Reject the whole run with the first observed rejection instead of
    /// settling every operation.
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Set the source consulted for the default concurrency ceiling when no
    /// explicit limit is configured.
    pub fn with_concurrency_source(mut self, source: Arc<dyn ConcurrencySource>) -> Self {
        self.concurrency_source = source;
        self
    }

    /// Set a progress callback, invoked as `(settled_count, total)` each time
    /// an operation settles.
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(Box::new(callback)));
        self
    }

    /// Execute a batch of operations.
    ///
    /// In settle-all mode (the default) this resolves with one [`Outcome`] per
    /// operation, at the operation's input index, once every operation has
    /// settled; individual rejections are data, never errors.
    ///
    /// In fail-fast mode it rejects with the first rejection reason observed
    /// in completion order, without waiting for in-flight siblings. Those
    /// siblings run to natural completion inside their tasks and their
    /// results are dropped; operations not yet dispatched when the failure is
    /// observed are never invoked.
    #[instrument(skip(self, operations), fields(operation_count = operations.len()))]
    pub async fn execute<T, E>(
        &self,
        operations: Vec<Operation<T, E>>,
    ) -> Result<Vec<Outcome<T, E>>, E>
    where
        T: Send + 'static,
        E: Send + 'static,
    {
        if operations.is_empty() {
            info!("No operations to execute in batch");
            return Ok(Vec::new());
        }

        let total = operations.len();
        let concurrency = self.resolved_concurrency();
        let worker_count = concurrency.min(total);

        info!(
            total,
            concurrency,
            worker_count,
            fail_fast = self.fail_fast,
            "Starting batch execution"
        );

        let state = Arc::new(BatchState {
            cursor: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            aborted: AtomicBool::new(false),
            pending: operations
                .into_iter()
                .map(|op| Mutex::new(Some(op)))
                .collect(),
            outcomes: (0..total).map(|_| Mutex::new(None)).collect(),
        });

        // Single-capacity hand-off: only the first rejection is ever sent.
        let (failure_tx, mut failure_rx) = mpsc::channel::<E>(1);

        let mut workers = Vec::with_capacity(worker_count);
        for slot in 0..worker_count {
            let state = Arc::clone(&state);
            let failure_tx = failure_tx.clone();
            let progress = self.progress_callback.clone();
            let fail_fast = self.fail_fast;

            workers.push(tokio::spawn(async move {
                debug!(slot, "Worker slot started");
                run_slot(state, fail_fast, failure_tx, progress).await;
                debug!(slot, "Worker slot drained");
            }));
        }
        drop(failure_tx);

        let mut all_settled = future::join_all(workers);

        let first_failure = tokio::select! {
            Some(reason) = failure_rx.recv() => Some(reason),
            joined = &mut all_settled => {
                for join_result in joined {
                    if let Err(e) = join_result {
                        if e.is_panic() {
                            std::panic::resume_unwind(e.into_panic());
                        }
                        warn!(error = %e, "Worker slot cancelled before completion");
                    }
                }
                None
            }
        };

        // A rejection can land in the same instant the last worker exits; the
        // short-circuit still wins.
        if let Some(reason) = first_failure.or_else(|| failure_rx.try_recv().ok()) {
            warn!("Batch aborted by first observed rejection (fail-fast)");
            return Err(reason);
        }

        let mut outcomes = Vec::with_capacity(total);
        for cell in state.outcomes.iter() {
            outcomes.push(
                cell.lock()
                    .take()
                    .expect("every dispatched index settles exactly once"),
            );
        }

        info!(
            total,
            fulfilled = outcomes.iter().filter(|o| o.is_fulfilled()).count(),
            "Batch execution completed"
        );

        Ok(outcomes)
    }

    fn resolved_concurrency(&self) -> usize {
        match self.concurrency {
            Some(limit) if limit > 0 => limit,
            _ => self.concurrency_source.batch_concurrency().max(1),
        }
    }
}

impl Default for BatchExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-slot driver: pull the next index off the shared cursor, run the
/// operation, record its outcome, repeat until the cursor runs past the end
/// (or the run aborts in fail-fast mode).
async fn run_slot<T, E>(
    state: Arc<BatchState<T, E>>,
    fail_fast: bool,
    failure_tx: mpsc::Sender<E>,
    progress: Option<Arc<ProgressCallback>>,
) where
    T: Send + 'static,
    E: Send + 'static,
{
    let total = state.pending.len();

    loop {
        if state.aborted.load(Ordering::SeqCst) {
            break;
        }

        let index = state.cursor.fetch_add(1, Ordering::SeqCst);
        if index >= total {
            break;
        }

        let op = state.pending[index]
            .lock()
            .take()
            .expect("each index is dispatched to exactly one slot");

        debug!(index, "Dispatching operation");
        let outcome = match op().await {
            Ok(value) => Outcome::Fulfilled { value },
            Err(reason) => {
                if fail_fast {
                    // First rejection wins; the swap makes the hand-off one-shot.
                    if !state.aborted.swap(true, Ordering::SeqCst) {
                        let _ = failure_tx.try_send(reason);
                    }
                    break;
                }
                Outcome::Rejected { reason }
            }
        };

        *state.outcomes[index].lock() = Some(outcome);
        let settled = state.completed.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(index, settled, total, "Operation settled");

        if let Some(callback) = progress.as_deref() {
            callback(settled, total);
        }
    }
}

/// Run a list of operations with bounded concurrency.
///
/// Convenience entry point over [`BatchExecutor`]; the default concurrency is
/// taken from a multiplexed-transport [`TransportConcurrency`] source when
/// `options.concurrency` is unset.
pub async fn run_batched<T, E>(
    operations: Vec<Operation<T, E>>,
    options: BatchOptions,
) -> Result<Vec<Outcome<T, E>>, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    let mut executor = BatchExecutor::new().with_fail_fast(options.fail_fast);
    if let Some(limit) = options.concurrency.filter(|&limit| limit > 0) {
        executor = executor.with_concurrency(limit);
    }
    executor.execute(operations).await
}
