//! Worker loop and shared failure state.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use tokio::sync::mpsc;

use crate::error::TransferError;

use super::Operation;

#[derive(Default)]
pub(super) struct BatchState {
    failed: AtomicBool,
    completed: AtomicUsize,
    first_error: Mutex<Option<TransferError>>,
}

impl BatchState {
    pub(super) fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    pub(super) fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    /// First error wins; later ones are logged and dropped.
    pub(super) fn record_failure(&self, e: TransferError) {
        self.failed.store(true, Ordering::Release);
        let mut slot = self.first_error.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            tracing::debug!(error = %e, "operation failed; no new operations will start");
            *slot = Some(e);
        } else {
            tracing::warn!(error = %e, "ignoring error from in-flight operation after earlier failure");
        }
    }

    pub(super) fn take_error(&self) -> Option<TransferError> {
        self.first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Pulls operations until the queue closes or a failure is observed.
pub(super) async fn worker_loop(
    worker_id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Operation>>>,
    state: Arc<BatchState>,
) {
    loop {
        if state.has_failed() {
            break;
        }
        let next = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(op) = next else {
            break;
        };
        // A failure may have been recorded while this worker waited.
        if state.has_failed() {
            break;
        }
        match AssertUnwindSafe(op).catch_unwind().await {
            Ok(Ok(())) => {
                state.completed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => state.record_failure(e),
            Err(_) => state.record_failure(TransferError::Task(format!(
                "operation panicked on worker {worker_id}"
            ))),
        }
    }
}
