//! Upload orchestration: single shot, staged blocks, and live streams.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use futures::future;
use tokio::io::AsyncRead;

use crate::batch::Batch;
use crate::blob::{BlobResponse, BlockBlobOperations};
use crate::buffer_scheduler::{BufferScheduler, ChunkBuffer};
use crate::error::{TransferError, TransferResult};
use crate::progress::ProgressTracker;
use crate::storage::BlockReader;

use super::plan::{block_id, check_max_blocks, plan_upload, Chunk, ChunkPlan, UploadPlan};
use super::{StreamUploadOptions, TransferOptions};

/// Uploads an in-memory payload. Payloads up to the single-shot limit go up
/// in one request; larger ones are staged in blocks and committed in order.
pub async fn upload_buffer<C>(
    client: &Arc<C>,
    data: Bytes,
    options: &TransferOptions,
) -> TransferResult<BlobResponse>
where
    C: BlockBlobOperations + ?Sized + 'static,
{
    let size = data.len() as u64;
    match plan_upload(size, options.block_size, &options.limits)? {
        UploadPlan::Single { .. } => single_shot(&**client, data, options).await,
        UploadPlan::Blocks(plan) => {
            stage_and_commit(client, plan, options, move |chunk: Chunk| {
                future::ready(Ok(data.slice(chunk.start as usize..chunk.end as usize)))
            })
            .await
        }
    }
}

/// Uploads a local file. Each block task reads its own range, so blocks are
/// read and staged concurrently.
pub async fn upload_file<C>(
    client: &Arc<C>,
    path: &Path,
    options: &TransferOptions,
) -> TransferResult<BlobResponse>
where
    C: BlockBlobOperations + ?Sized + 'static,
{
    let reader = BlockReader::open(path)?;
    let size = reader.len();
    tracing::debug!(path = %path.display(), size, "uploading file");
    match plan_upload(size, options.block_size, &options.limits)? {
        UploadPlan::Single { size } => {
            let whole = Chunk {
                index: 0,
                start: 0,
                end: size,
            };
            let data = read_file_chunk(reader, whole).await?;
            single_shot(&**client, data, options).await
        }
        UploadPlan::Blocks(plan) => {
            stage_and_commit(client, plan, options, move |chunk: Chunk| {
                read_file_chunk(reader.clone(), chunk)
            })
            .await
        }
    }
}

/// Uploads a stream of unknown length through the buffer scheduler, one
/// block per buffer. Progress reports carry no total.
pub async fn upload_stream<C, R>(
    client: &Arc<C>,
    source: R,
    options: &StreamUploadOptions,
) -> TransferResult<BlobResponse>
where
    C: BlockBlobOperations + ?Sized + 'static,
    R: AsyncRead + Unpin + Send,
{
    check_max_blocks(options.max_blocks)?;
    let mut scheduler = BufferScheduler::new(options.buffer_size, options.max_buffers)?;
    if let Some(c) = options.concurrency {
        scheduler = scheduler.with_concurrency(c)?;
    }
    let tracker = Arc::new(ProgressTracker::new(None, options.progress.clone()));
    let max_blocks = options.max_blocks;

    let stage_client = Arc::clone(client);
    let stage_tracker = Arc::clone(&tracker);
    let summary = scheduler
        .run(source, move |chunk: ChunkBuffer| {
            stage_buffer(
                Arc::clone(&stage_client),
                Arc::clone(&stage_tracker),
                chunk,
                max_blocks,
            )
        })
        .await?;

    let ids: Vec<String> = (0..summary.buffers).map(block_id).collect();
    let resp = client.commit_block_list(&ids, &options.write_options).await?;
    tracing::info!(
        blocks = summary.buffers,
        bytes = summary.bytes,
        peak_buffers = summary.peak_outstanding,
        allocated_buffers = summary.allocated_buffers,
        "stream upload committed"
    );
    Ok(resp)
}

async fn single_shot<C>(client: &C, data: Bytes, options: &TransferOptions) -> TransferResult<BlobResponse>
where
    C: BlockBlobOperations + ?Sized,
{
    let size = data.len() as u64;
    let tracker = ProgressTracker::new(Some(size), options.progress.clone());
    let resp = client.upload(data, &options.write_options).await?;
    tracker.add(size);
    tracing::info!(size, "uploaded in a single request");
    Ok(resp)
}

/// Stages every chunk of `plan` through a `Batch`, then commits the ids in
/// index order. Completion order never affects the block list.
async fn stage_and_commit<C, F, Fut>(
    client: &Arc<C>,
    plan: ChunkPlan,
    options: &TransferOptions,
    read_chunk: F,
) -> TransferResult<BlobResponse>
where
    C: BlockBlobOperations + ?Sized + 'static,
    F: Fn(Chunk) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = TransferResult<Bytes>> + Send + 'static,
{
    let tracker = Arc::new(ProgressTracker::new(Some(plan.size), options.progress.clone()));
    let read_chunk = Arc::new(read_chunk);
    let mut batch = Batch::new(options.parallelism);
    for chunk in plan.chunks() {
        batch.add_operation(stage_chunk(
            Arc::clone(client),
            Arc::clone(&read_chunk),
            Arc::clone(&tracker),
            chunk,
        ));
    }
    tracing::debug!(
        blocks = plan.count(),
        block_size = plan.block_size,
        parallelism = batch.parallelism(),
        "staging blocks"
    );
    batch.run().await?;

    let resp = client
        .commit_block_list(&plan.block_ids(), &options.write_options)
        .await?;
    tracing::info!(blocks = plan.count(), size = plan.size, "block list committed");
    Ok(resp)
}

async fn stage_chunk<C, F, Fut>(
    client: Arc<C>,
    read_chunk: Arc<F>,
    tracker: Arc<ProgressTracker>,
    chunk: Chunk,
) -> TransferResult<()>
where
    C: BlockBlobOperations + ?Sized,
    F: Fn(Chunk) -> Fut,
    Fut: Future<Output = TransferResult<Bytes>>,
{
    let data = read_chunk(chunk).await?;
    let id = block_id(chunk.index);
    client.stage_block(&id, data).await?;
    tracker.add(chunk.len());
    Ok(())
}

async fn stage_buffer<C>(
    client: Arc<C>,
    tracker: Arc<ProgressTracker>,
    chunk: ChunkBuffer,
    max_blocks: u64,
) -> TransferResult<()>
where
    C: BlockBlobOperations + ?Sized,
{
    if chunk.seq() >= max_blocks {
        return Err(TransferError::validation(format!(
            "stream needs more than {max_blocks} blocks; use a larger buffer size"
        )));
    }
    let id = block_id(chunk.seq());
    let len = chunk.len() as u64;
    client.stage_block(&id, chunk.data().clone()).await?;
    tracker.add(len);
    // The slot goes back to the scheduler only now, after the block is staged.
    drop(chunk);
    Ok(())
}

/// Positioned read of one chunk on a blocking thread.
async fn read_file_chunk(reader: BlockReader, chunk: Chunk) -> TransferResult<Bytes> {
    let expected = chunk.len();
    let data = tokio::task::spawn_blocking(move || reader.read_range(chunk.start, expected as usize))
        .await
        .map_err(|e| TransferError::Task(format!("file read: {e}")))??;
    if (data.len() as u64) < expected {
        return Err(TransferError::StreamExhausted {
            expected,
            received: data.len() as u64,
        });
    }
    Ok(data)
}
