//! Bounded-parallelism execution of transfer operations.
//!
//! A `Batch` collects operations and runs them on a fixed pool of worker tasks
//! that pull from a shared queue. The first failure stops workers from taking
//! new operations; operations already running are awaited, not cancelled, and
//! their results ignored. `RunningBatch` is the same pool accepting operations
//! while it runs (used by the stream buffer scheduler).

mod worker;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

use crate::error::{TransferError, TransferResult};

use worker::{worker_loop, BatchState};

/// A queued unit of work.
pub type Operation = Pin<Box<dyn Future<Output = TransferResult<()>> + Send + 'static>>;

/// Collects operations, then runs them with at most `parallelism` in flight.
pub struct Batch {
    parallelism: usize,
    operations: Vec<Operation>,
}

impl Batch {
    /// A parallelism of 0 is treated as 1.
    pub fn new(parallelism: usize) -> Self {
        Self {
            parallelism: parallelism.max(1),
            operations: Vec::new(),
        }
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn add_operation<F>(&mut self, op: F)
    where
        F: Future<Output = TransferResult<()>> + Send + 'static,
    {
        self.operations.push(Box::pin(op));
    }

    /// Runs every queued operation. Resolves when all succeed, or with the
    /// first error once the operations that were already running finish.
    pub async fn run(self) -> TransferResult<()> {
        if self.operations.is_empty() {
            return Ok(());
        }
        let workers = self.parallelism.min(self.operations.len());
        let running = RunningBatch::spawn(workers);
        for op in self.operations {
            running.submit_boxed(op);
        }
        running.finish().await
    }

    /// Starts an empty worker pool that accepts operations until `finish`.
    pub fn start(parallelism: usize) -> RunningBatch {
        RunningBatch::spawn(parallelism.max(1))
    }
}

/// A worker pool that is already running. Dropping it without calling
/// `finish` aborts the workers and any operation they are executing.
pub struct RunningBatch {
    tx: Option<mpsc::UnboundedSender<Operation>>,
    workers: JoinSet<()>,
    state: Arc<BatchState>,
    parallelism: usize,
}

impl RunningBatch {
    fn spawn(parallelism: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<Operation>();
        let rx = Arc::new(Mutex::new(rx));
        let state = Arc::new(BatchState::default());
        let mut workers = JoinSet::new();
        for worker_id in 0..parallelism {
            workers.spawn(worker_loop(worker_id, Arc::clone(&rx), Arc::clone(&state)));
        }
        Self {
            tx: Some(tx),
            workers,
            state,
            parallelism,
        }
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// True once any operation has failed. No further operations will start.
    pub fn has_failed(&self) -> bool {
        self.state.has_failed()
    }

    /// Queues `op`. Returns false (and drops `op`) if the batch already failed.
    pub fn submit<F>(&self, op: F) -> bool
    where
        F: Future<Output = TransferResult<()>> + Send + 'static,
    {
        self.submit_boxed(Box::pin(op))
    }

    fn submit_boxed(&self, op: Operation) -> bool {
        if self.state.has_failed() {
            return false;
        }
        match &self.tx {
            Some(tx) => tx.send(op).is_ok(),
            None => false,
        }
    }

    /// Closes the queue and waits for every worker. Returns the first error
    /// recorded by any operation.
    pub async fn finish(mut self) -> TransferResult<()> {
        drop(self.tx.take());
        while let Some(joined) = self.workers.join_next().await {
            if let Err(e) = joined {
                self.state
                    .record_failure(TransferError::Task(format!("batch worker: {e}")));
            }
        }
        let completed = self.state.completed();
        match self.state.take_error() {
            Some(e) => {
                tracing::debug!(completed, error = %e, "batch failed");
                Err(e)
            }
            None => {
                tracing::debug!(completed, parallelism = self.parallelism, "batch completed");
                Ok(())
            }
        }
    }
}
