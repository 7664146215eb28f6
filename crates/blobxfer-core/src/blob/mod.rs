//! Block blob operations the transfer engine is built on.
//!
//! `BlockBlobOperations` is the seam between chunk orchestration and the
//! wire: `BlockBlobClient` implements it over REST, tests implement it in
//! memory.

mod client;
mod parse;

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::TransferResult;

pub use client::{BlockBlobClient, SERVICE_VERSION};

/// A byte range of a blob. `count: None` reads to the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ByteRange {
    pub offset: u64,
    pub count: Option<u64>,
}

impl ByteRange {
    pub fn new(offset: u64, count: u64) -> Self {
        Self {
            offset,
            count: Some(count),
        }
    }

    /// Exclusive end, when bounded.
    pub fn end(&self) -> Option<u64> {
        self.count.map(|c| self.offset + c)
    }

    /// Value for the `x-ms-range` header (inclusive end). None for the whole blob.
    pub fn header_value(&self) -> Option<String> {
        match self.count {
            Some(0) | None if self.offset == 0 => None,
            None | Some(0) => Some(format!("bytes={}-", self.offset)),
            Some(c) => Some(format!("bytes={}-{}", self.offset, self.offset + c - 1)),
        }
    }
}

/// Standard content headers stored with the blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobHttpHeaders {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    pub content_disposition: Option<String>,
    pub cache_control: Option<String>,
    /// Base64 MD5 of the whole blob.
    pub content_md5: Option<String>,
}

/// Headers and metadata applied by `upload` and `commit_block_list`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobWriteOptions {
    pub headers: BlobHttpHeaders,
    pub metadata: BTreeMap<String, String>,
}

/// Common fields of a successful write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobResponse {
    pub status: u16,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub request_id: Option<String>,
}

/// Blob properties from a HEAD or a ranged GET.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobProperties {
    /// Size of the blob (HEAD) or of the returned range (GET).
    pub content_length: u64,
    pub content_type: Option<String>,
    pub content_md5: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// A ranged read. The body is consumed as a stream of pieces.
pub struct DownloadResponse {
    pub properties: BlobProperties,
    pub body: BoxStream<'static, io::Result<Bytes>>,
}

impl fmt::Debug for DownloadResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadResponse")
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

/// Primitive per-blob operations.
#[async_trait]
pub trait BlockBlobOperations: Send + Sync {
    /// Creates or replaces the blob with `data` in one request.
    async fn upload(&self, data: Bytes, options: &BlobWriteOptions) -> TransferResult<BlobResponse>;

    /// Uploads one uncommitted block.
    async fn stage_block(&self, block_id: &str, data: Bytes) -> TransferResult<BlobResponse>;

    /// Commits staged blocks in the given order.
    async fn commit_block_list(
        &self,
        block_ids: &[String],
        options: &BlobWriteOptions,
    ) -> TransferResult<BlobResponse>;

    async fn download(&self, range: ByteRange) -> TransferResult<DownloadResponse>;

    async fn get_properties(&self) -> TransferResult<BlobProperties>;
}

#[async_trait]
impl<T: BlockBlobOperations + ?Sized> BlockBlobOperations for Arc<T> {
    async fn upload(&self, data: Bytes, options: &BlobWriteOptions) -> TransferResult<BlobResponse> {
        (**self).upload(data, options).await
    }

    async fn stage_block(&self, block_id: &str, data: Bytes) -> TransferResult<BlobResponse> {
        (**self).stage_block(block_id, data).await
    }

    async fn commit_block_list(
        &self,
        block_ids: &[String],
        options: &BlobWriteOptions,
    ) -> TransferResult<BlobResponse> {
        (**self).commit_block_list(block_ids, options).await
    }

    async fn download(&self, range: ByteRange) -> TransferResult<DownloadResponse> {
        (**self).download(range).await
    }

    async fn get_properties(&self) -> TransferResult<BlobProperties> {
        (**self).get_properties().await
    }
}
