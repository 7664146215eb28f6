//! Download orchestration: parallel ranged reads into a buffer or a file.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;

use crate::batch::Batch;
use crate::blob::BlockBlobOperations;
use crate::error::{TransferError, TransferResult};
use crate::progress::ProgressTracker;
use crate::storage::{temp_path, StorageWriter, StorageWriterBuilder};

use super::plan::{plan_download, Chunk, ChunkPlan};
use super::TransferOptions;

/// Destination for downloaded ranges. Offsets are relative to the start of
/// the requested range; writes for different chunks may arrive in any order.
#[async_trait]
pub trait ChunkSink: Send + Sync + 'static {
    async fn write_chunk(&self, offset: u64, data: Bytes) -> TransferResult<()>;
}

/// In-memory destination. The lock is held only for one copy.
#[derive(Debug)]
pub struct MemorySink {
    buf: Mutex<Vec<u8>>,
}

impl MemorySink {
    pub fn new(buf: Vec<u8>) -> Self {
        Self {
            buf: Mutex::new(buf),
        }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ChunkSink for MemorySink {
    async fn write_chunk(&self, offset: u64, data: Bytes) -> TransferResult<()> {
        let mut buf = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
        let start = offset as usize;
        let len = buf.len();
        let dst = buf.get_mut(start..start + data.len()).ok_or_else(|| {
            TransferError::validation(format!(
                "write of {} bytes at {offset} overruns a {len}-byte buffer",
                data.len()
            ))
        })?;
        dst.copy_from_slice(&data);
        Ok(())
    }
}

/// Positioned writes run on the blocking pool.
#[async_trait]
impl ChunkSink for StorageWriter {
    async fn write_chunk(&self, offset: u64, data: Bytes) -> TransferResult<()> {
        let writer = self.clone();
        blocking("file write", move || writer.write_at(offset, &data)).await
    }
}

/// Runs blocking file I/O off the runtime threads.
async fn blocking<T, F>(what: &'static str, op: F) -> TransferResult<T>
where
    F: FnOnce() -> std::io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let result = tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| TransferError::Task(format!("{what}: {e}")))?;
    Ok(result?)
}

/// Downloads `count` bytes at `offset` into `buffer` and returns it.
/// `count` of None or 0 means "to the end of the blob" and costs one
/// properties request. `buffer` must hold at least `count` bytes.
pub async fn download_to_buffer<C>(
    client: &Arc<C>,
    offset: u64,
    count: Option<u64>,
    buffer: Vec<u8>,
    options: &TransferOptions,
) -> TransferResult<Vec<u8>>
where
    C: BlockBlobOperations + ?Sized + 'static,
{
    if let Some(c) = count.filter(|c| *c > 0) {
        check_buffer_len(buffer.len(), c)?;
    }
    let count = resolve_count(&**client, offset, count).await?;
    check_buffer_len(buffer.len(), count)?;

    let plan = plan_download(offset, count, options.block_size, &options.limits);
    let sink = Arc::new(MemorySink::new(buffer));
    download_ranges(client, plan, Arc::clone(&sink), options).await?;
    let sink = Arc::try_unwrap(sink)
        .map_err(|_| TransferError::Task("download buffer is still shared".to_string()))?;
    Ok(sink.into_inner())
}

/// Downloads `count` bytes at `offset` to `path`. Data is written to a
/// preallocated `path.part` and renamed into place when every range has
/// arrived; on failure the partial file is removed. Returns the byte count.
pub async fn download_to_file<C>(
    client: &Arc<C>,
    path: &Path,
    offset: u64,
    count: Option<u64>,
    options: &TransferOptions,
) -> TransferResult<u64>
where
    C: BlockBlobOperations + ?Sized + 'static,
{
    let count = resolve_count(&**client, offset, count).await?;
    let plan = plan_download(offset, count, options.block_size, &options.limits);

    let temp = temp_path(path);
    let writer = blocking("create temp file", move || {
        let mut builder = StorageWriterBuilder::create(&temp)?;
        builder.preallocate(count)?;
        Ok(builder.build())
    })
    .await?;

    let mut outcome = download_ranges(client, plan, Arc::new(writer.clone()), options).await;
    if outcome.is_ok() {
        let w = writer.clone();
        outcome = blocking("sync temp file", move || w.sync()).await;
    }
    if let Err(e) = outcome {
        let _ = tokio::task::spawn_blocking(move || writer.discard()).await;
        return Err(e);
    }
    let final_path = path.to_path_buf();
    blocking("finalize download", move || writer.finalize(&final_path)).await?;
    tracing::info!(path = %path.display(), bytes = count, "download complete");
    Ok(count)
}

fn check_buffer_len(len: usize, count: u64) -> TransferResult<()> {
    if (len as u64) < count {
        return Err(TransferError::validation(format!(
            "buffer of {len} bytes cannot hold {count} bytes"
        )));
    }
    Ok(())
}

/// Resolves an open-ended count from the blob's properties.
async fn resolve_count<C>(client: &C, offset: u64, count: Option<u64>) -> TransferResult<u64>
where
    C: BlockBlobOperations + ?Sized,
{
    if let Some(c) = count.filter(|c| *c > 0) {
        return Ok(c);
    }
    let props = client.get_properties().await?;
    if offset > props.content_length {
        return Err(TransferError::validation(format!(
            "offset {offset} is beyond the blob size {}",
            props.content_length
        )));
    }
    Ok(props.content_length - offset)
}

async fn download_ranges<C, S>(
    client: &Arc<C>,
    plan: ChunkPlan,
    sink: Arc<S>,
    options: &TransferOptions,
) -> TransferResult<()>
where
    C: BlockBlobOperations + ?Sized + 'static,
    S: ChunkSink,
{
    let tracker = Arc::new(ProgressTracker::new(Some(plan.size), options.progress.clone()));
    let mut batch = Batch::new(options.parallelism);
    for chunk in plan.chunks() {
        batch.add_operation(download_chunk(
            Arc::clone(client),
            Arc::clone(&sink),
            Arc::clone(&tracker),
            plan.offset,
            chunk,
        ));
    }
    tracing::debug!(
        ranges = plan.count(),
        block_size = plan.block_size,
        offset = plan.offset,
        count = plan.size,
        "downloading ranges"
    );
    batch.run().await
}

async fn download_chunk<C, S>(
    client: Arc<C>,
    sink: Arc<S>,
    tracker: Arc<ProgressTracker>,
    base: u64,
    chunk: Chunk,
) -> TransferResult<()>
where
    C: BlockBlobOperations + ?Sized,
    S: ChunkSink,
{
    let resp = client.download(chunk.range()).await?;
    let mut body = resp.body;
    let expected = chunk.len();
    let mut received = 0u64;
    while let Some(piece) = body.try_next().await? {
        let room = (expected - received) as usize;
        if room == 0 {
            break;
        }
        let piece = piece.slice(..piece.len().min(room));
        if piece.is_empty() {
            continue;
        }
        let len = piece.len() as u64;
        sink.write_chunk(chunk.start - base + received, piece).await?;
        received += len;
    }
    if received < expected {
        return Err(TransferError::StreamExhausted { expected, received });
    }
    tracker.add(expected);
    tracing::debug!(index = chunk.index, start = chunk.start, len = expected, "range downloaded");
    Ok(())
}
