//! Fixed arena of reusable buffers guarded by a semaphore.
//!
//! Each slot owns one `buffer_size` allocation, made the first time the slot
//! is handed out and reused for every later fill. A filled slot becomes the
//! owner behind the chunk's `Bytes`, so the memory returns to the arena when
//! the last view of that chunk is dropped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{TransferError, TransferResult};

#[derive(Debug)]
struct Slot {
    index: usize,
    buf: Vec<u8>,
}

#[derive(Debug)]
struct PoolInner {
    free: Mutex<Vec<Slot>>,
    buffer_size: usize,
    outstanding: AtomicUsize,
    peak: AtomicUsize,
    allocations: AtomicUsize,
}

/// At most `capacity` slots are outstanding at once; `acquire` waits otherwise.
#[derive(Debug, Clone)]
pub(super) struct BufferPool {
    permits: Arc<Semaphore>,
    inner: Arc<PoolInner>,
}

impl BufferPool {
    pub(super) fn new(capacity: usize, buffer_size: usize) -> Self {
        // Reversed so slot 0 is handed out first.
        let free = (0..capacity)
            .rev()
            .map(|index| Slot {
                index,
                buf: Vec::new(),
            })
            .collect();
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            inner: Arc::new(PoolInner {
                free: Mutex::new(free),
                buffer_size,
                outstanding: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                allocations: AtomicUsize::new(0),
            }),
        }
    }

    pub(super) async fn acquire(&self) -> TransferResult<SlotGuard> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| TransferError::Task("buffer pool closed".to_string()))?;
        let mut slot = self
            .inner
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .ok_or_else(|| TransferError::Task("buffer pool has a permit but no free slot".to_string()))?;
        if slot.buf.len() != self.inner.buffer_size {
            slot.buf = vec![0u8; self.inner.buffer_size];
            self.inner.allocations.fetch_add(1, Ordering::SeqCst);
        }
        let now = self.inner.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak.fetch_max(now, Ordering::SeqCst);
        Ok(SlotGuard {
            slot: Some(slot),
            inner: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    pub(super) fn peak(&self) -> usize {
        self.inner.peak.load(Ordering::SeqCst)
    }

    /// Slots currently checked out, including those pinned by live chunk data.
    pub(super) fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::SeqCst)
    }

    /// Buffers allocated so far; never more than the slot count.
    pub(super) fn allocations(&self) -> usize {
        self.inner.allocations.load(Ordering::SeqCst)
    }
}

/// Ownership of one slot and its buffer. Both return to the pool on drop.
#[derive(Debug)]
pub(super) struct SlotGuard {
    slot: Option<Slot>,
    inner: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl SlotGuard {
    pub(super) fn index(&self) -> usize {
        self.slot.as_ref().map_or(0, |s| s.index)
    }

    /// The slot's whole buffer, `buffer_size` bytes long.
    pub(super) fn buf_mut(&mut self) -> &mut [u8] {
        self.slot.as_mut().map(|s| s.buf.as_mut_slice()).unwrap_or_default()
    }

    /// Freezes the first `len` bytes. The guard travels with the view and is
    /// dropped when the last clone of it goes away.
    pub(super) fn into_filled(self, len: usize) -> FilledSlot {
        FilledSlot { guard: self, len }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        // The slot is back on the free list before the permit is released.
        if let Some(slot) = self.slot.take() {
            self.inner
                .free
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(slot);
        }
        self.inner.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Owner behind a chunk's `Bytes`: the filled prefix of a slot's buffer.
#[derive(Debug)]
pub(super) struct FilledSlot {
    guard: SlotGuard,
    len: usize,
}

impl AsRef<[u8]> for FilledSlot {
    fn as_ref(&self) -> &[u8] {
        self.guard
            .slot
            .as_ref()
            .map(|s| &s.buf[..self.len])
            .unwrap_or_default()
    }
}
