//! Progress reporting for transfers (bytes done, rate, ETA).
//!
//! Chunk tasks report completed bytes to one shared `ProgressTracker`; the
//! tracker invokes the caller's callback while holding its lock, so observed
//! `loaded_bytes` values strictly increase even with many tasks in flight.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// Snapshot of transfer progress (CLI-friendly).
#[derive(Debug, Clone, PartialEq)]
pub struct TransferProgress {
    /// Bytes transferred so far (completed chunks only).
    pub loaded_bytes: u64,
    /// Total size, when known. Stream uploads report `None`.
    pub total_bytes: Option<u64>,
    /// Seconds since the tracker was created.
    pub elapsed_secs: f64,
}

impl TransferProgress {
    /// Transfer rate in bytes per second (0 if elapsed is 0).
    pub fn bytes_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.loaded_bytes as f64 / self.elapsed_secs
    }

    /// Estimated seconds remaining (None if total is unknown or rate is 0).
    pub fn eta_secs(&self) -> Option<f64> {
        let total = self.total_bytes?;
        let remaining = total.saturating_sub(self.loaded_bytes);
        if remaining == 0 {
            return Some(0.0);
        }
        let rate = self.bytes_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(remaining as f64 / rate)
    }

    /// Fraction complete in [0.0, 1.0], None when the total is unknown.
    pub fn fraction(&self) -> Option<f64> {
        let total = self.total_bytes?;
        if total == 0 {
            return Some(1.0);
        }
        Some((self.loaded_bytes as f64 / total as f64).min(1.0))
    }
}

/// Caller-supplied progress callback.
pub type ProgressFn = Arc<dyn Fn(TransferProgress) + Send + Sync>;

/// Shared accumulator for one transfer.
pub struct ProgressTracker {
    loaded: Mutex<u64>,
    total_bytes: Option<u64>,
    started: Instant,
    callback: Option<ProgressFn>,
}

impl ProgressTracker {
    pub fn new(total_bytes: Option<u64>, callback: Option<ProgressFn>) -> Self {
        Self {
            loaded: Mutex::new(0),
            total_bytes,
            started: Instant::now(),
            callback,
        }
    }

    /// Adds `bytes` to the running total and reports the new snapshot.
    pub fn add(&self, bytes: u64) {
        if bytes == 0 {
            return;
        }
        let mut loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
        *loaded += bytes;
        if let Some(cb) = &self.callback {
            cb(TransferProgress {
                loaded_bytes: *loaded,
                total_bytes: self.total_bytes,
                elapsed_secs: self.started.elapsed().as_secs_f64(),
            });
        }
    }

    pub fn loaded(&self) -> u64 {
        *self.loaded.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("loaded", &self.loaded())
            .field("total_bytes", &self.total_bytes)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}
