//! Parallel chunked upload and download of block blobs.
//!
//! Sources with a known size (buffers, files) are planned up front and each
//! chunk becomes one `Batch` operation. Live streams go through the
//! `BufferScheduler`. Downloads split the requested range into ranged reads
//! that write straight into their slot of the destination.

mod download;
mod plan;
mod upload;

use std::fmt;

use crate::blob::BlobWriteOptions;
use crate::progress::ProgressFn;

pub use download::{download_to_buffer, download_to_file, ChunkSink, MemorySink};
pub use plan::{
    block_id, plan_download, plan_upload, Chunk, ChunkPlan, TransferLimits, UploadPlan,
    DEFAULT_BLOCK_BYTES, MAX_BLOCKS, MAX_BLOCK_BYTES, MAX_SINGLE_SHOT_BYTES,
};
pub use upload::{upload_buffer, upload_file, upload_stream};

/// Default number of chunk operations in flight.
pub const DEFAULT_PARALLELISM: usize = 5;

/// Options for buffer, file and download transfers.
#[derive(Clone)]
pub struct TransferOptions {
    /// Bytes per chunk. 0 picks a size from the limits.
    pub block_size: u64,
    /// Chunk operations in flight. 0 is treated as 1.
    pub parallelism: usize,
    pub progress: Option<ProgressFn>,
    /// Content headers and metadata for uploads.
    pub write_options: BlobWriteOptions,
    pub limits: TransferLimits,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            block_size: 0,
            parallelism: DEFAULT_PARALLELISM,
            progress: None,
            write_options: BlobWriteOptions::default(),
            limits: TransferLimits::default(),
        }
    }
}

impl fmt::Debug for TransferOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferOptions")
            .field("block_size", &self.block_size)
            .field("parallelism", &self.parallelism)
            .field("progress", &self.progress.is_some())
            .field("write_options", &self.write_options)
            .field("limits", &self.limits)
            .finish()
    }
}

/// Options for uploading a stream of unknown length.
#[derive(Clone)]
pub struct StreamUploadOptions {
    /// Bytes per staged block.
    pub buffer_size: usize,
    /// Buffers that may be filled or in flight at once (at least 2).
    pub max_buffers: usize,
    /// Concurrent stage calls; None derives it from `max_buffers`.
    pub concurrency: Option<usize>,
    pub progress: Option<ProgressFn>,
    pub write_options: BlobWriteOptions,
    pub max_blocks: u64,
}

impl Default for StreamUploadOptions {
    fn default() -> Self {
        Self {
            buffer_size: 8 * 1024 * 1024,
            max_buffers: 8,
            concurrency: None,
            progress: None,
            write_options: BlobWriteOptions::default(),
            max_blocks: MAX_BLOCKS,
        }
    }
}

impl fmt::Debug for StreamUploadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamUploadOptions")
            .field("buffer_size", &self.buffer_size)
            .field("max_buffers", &self.max_buffers)
            .field("concurrency", &self.concurrency)
            .field("progress", &self.progress.is_some())
            .field("max_blocks", &self.max_blocks)
            .finish()
    }
}
