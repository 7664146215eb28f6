//! Turns a byte stream of unknown length into fixed-size buffers and feeds
//! them to a bounded number of concurrent consumers.
//!
//! The producer reads into one of `max_buffers` reusable slot buffers, tags
//! the filled buffer with a sequence number and hands it to a running
//! `Batch`. When every slot is outstanding the producer waits, so a slow
//! consumer throttles reads instead of growing memory. At most `max_buffers`
//! buffers are ever allocated for a run.

mod pool;

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::batch::Batch;
use crate::error::{TransferError, TransferResult};

use pool::BufferPool;

/// One filled buffer, backed by a slot of the scheduler's arena.
///
/// `data` is a view of the slot's memory. The slot returns to the scheduler
/// once this buffer and every clone of `data` are dropped, so copy out bytes
/// that must outlive the consumer call.
#[derive(Debug)]
pub struct ChunkBuffer {
    seq: u64,
    offset: u64,
    data: Bytes,
    slot: usize,
}

impl ChunkBuffer {
    /// Position in read order, starting at 0.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Byte offset of this buffer within the stream.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Arena slot occupied by this buffer.
    pub fn slot(&self) -> usize {
        self.slot
    }
}

/// What a completed run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScheduleSummary {
    /// Buffers handed to the consumer.
    pub buffers: u64,
    /// Bytes read from the source.
    pub bytes: u64,
    /// Most slots outstanding at once.
    pub peak_outstanding: usize,
    /// Slot buffers allocated; at most `max_buffers` however long the stream.
    pub allocated_buffers: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct BufferScheduler {
    buffer_size: usize,
    max_buffers: usize,
    concurrency: usize,
}

impl BufferScheduler {
    /// `buffer_size` must be positive and `max_buffers` at least 2.
    pub fn new(buffer_size: usize, max_buffers: usize) -> TransferResult<Self> {
        if buffer_size == 0 {
            return Err(TransferError::validation("buffer_size must be greater than 0"));
        }
        if max_buffers < 2 {
            return Err(TransferError::validation(format!(
                "max_buffers must be at least 2 (got {max_buffers})"
            )));
        }
        Ok(Self {
            buffer_size,
            max_buffers,
            concurrency: Self::default_concurrency(max_buffers),
        })
    }

    /// Three quarters of the slots, rounded up, leaving at least one for the
    /// producer.
    pub fn default_concurrency(max_buffers: usize) -> usize {
        let wanted = (max_buffers * 3).div_ceil(4);
        wanted.clamp(1, max_buffers.saturating_sub(1).max(1))
    }

    /// Overrides consumer concurrency; must be in `[1, max_buffers - 1]`.
    pub fn with_concurrency(mut self, concurrency: usize) -> TransferResult<Self> {
        if concurrency == 0 || concurrency >= self.max_buffers {
            return Err(TransferError::validation(format!(
                "concurrency must be in [1, {}] (got {concurrency})",
                self.max_buffers - 1
            )));
        }
        self.concurrency = concurrency;
        Ok(self)
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn max_buffers(&self) -> usize {
        self.max_buffers
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Reads `source` to EOF, calling `consumer` once per buffer.
    ///
    /// Resolves after EOF once every consumer call finished. A consumer error
    /// stops further reads; calls already running are awaited and the first
    /// error is returned. A source read error is returned after in-flight
    /// calls finish.
    pub async fn run<R, F, Fut>(&self, mut source: R, consumer: F) -> TransferResult<ScheduleSummary>
    where
        R: AsyncRead + Unpin + Send,
        F: Fn(ChunkBuffer) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TransferResult<()>> + Send + 'static,
    {
        let pool = BufferPool::new(self.max_buffers, self.buffer_size);
        let running = Batch::start(self.concurrency);
        let consumer = Arc::new(consumer);
        let mut summary = ScheduleSummary::default();
        let mut read_error = None;

        loop {
            if running.has_failed() {
                break;
            }
            let mut slot = pool.acquire().await?;
            if running.has_failed() {
                break;
            }
            let filled = match fill_buffer(&mut source, slot.buf_mut()).await {
                Ok(n) => n,
                Err(e) => {
                    read_error = Some(e);
                    break;
                }
            };
            if filled == 0 {
                break;
            }
            let at_eof = filled < self.buffer_size;
            let chunk = ChunkBuffer {
                seq: summary.buffers,
                offset: summary.bytes,
                slot: slot.index(),
                data: Bytes::from_owner(slot.into_filled(filled)),
            };
            summary.buffers += 1;
            summary.bytes += chunk.len() as u64;
            tracing::debug!(seq = chunk.seq, len = chunk.len(), slot = chunk.slot(), "buffer filled");

            let consumer = Arc::clone(&consumer);
            if !running.submit(async move { consumer(chunk).await }) {
                break;
            }
            if at_eof {
                break;
            }
        }

        running.finish().await?;
        if let Some(e) = read_error {
            return Err(TransferError::Io(e));
        }
        summary.peak_outstanding = pool.peak();
        summary.allocated_buffers = pool.allocations();
        tracing::debug!(
            buffers = summary.buffers,
            bytes = summary.bytes,
            peak = summary.peak_outstanding,
            allocated = summary.allocated_buffers,
            still_pinned = pool.outstanding(),
            "stream scheduling finished"
        );
        Ok(summary)
    }
}

/// Reads until `buf` is full or EOF and returns the bytes filled. A short
/// count means EOF was reached.
async fn fill_buffer<R: AsyncRead + Unpin>(source: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
