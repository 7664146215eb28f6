//! In-memory `BlockBlobOperations` with random per-call delays.
//!
//! Records every call so tests can check ordering and that validation
//! failures never reach the "service".

use std::collections::HashMap;
use std::io;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use blobxfer_core::blob::{
    BlobProperties, BlobResponse, BlobWriteOptions, BlockBlobOperations, ByteRange,
    DownloadResponse,
};
use blobxfer_core::{TransferError, TransferResult};
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use rand::Rng;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Upload(usize),
    StageBlock(String, usize),
    Commit(Vec<String>),
    Download(ByteRange),
    GetProperties,
}

#[derive(Default)]
struct State {
    committed: Vec<u8>,
    write_options: Option<BlobWriteOptions>,
    staged: HashMap<String, Bytes>,
    calls: Vec<Call>,
    stage_order: Vec<String>,
}

#[derive(Default)]
pub struct MemoryBlob {
    state: Mutex<State>,
    /// Upper bound of the random delay added to each call.
    max_delay_ms: u64,
    /// Stage calls for this block id fail with HTTP 500.
    fail_block: Option<String>,
    /// Ranged reads return this many bytes fewer than requested.
    short_reads: usize,
}

impl MemoryBlob {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(max_delay_ms: u64) -> Self {
        Self {
            max_delay_ms,
            ..Self::default()
        }
    }

    pub fn with_content(content: Vec<u8>) -> Self {
        let blob = Self::default();
        blob.state.lock().unwrap().committed = content;
        blob
    }

    pub fn failing_block(mut self, block_id: String) -> Self {
        self.fail_block = Some(block_id);
        self
    }

    pub fn short_reads(mut self, missing: usize) -> Self {
        self.short_reads = missing;
        self
    }

    pub fn content(&self) -> Vec<u8> {
        self.state.lock().unwrap().committed.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn stage_order(&self) -> Vec<String> {
        self.state.lock().unwrap().stage_order.clone()
    }

    pub fn write_options(&self) -> Option<BlobWriteOptions> {
        self.state.lock().unwrap().write_options.clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state.lock().unwrap().calls.iter().filter(|c| pred(c)).count()
    }

    async fn jitter(&self) {
        if self.max_delay_ms > 0 {
            let ms = rand::thread_rng().gen_range(0..=self.max_delay_ms);
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }
}

fn ok(status: u16) -> BlobResponse {
    BlobResponse {
        status,
        etag: Some("\"mem\"".to_string()),
        ..BlobResponse::default()
    }
}

#[async_trait]
impl BlockBlobOperations for MemoryBlob {
    async fn upload(&self, data: Bytes, options: &BlobWriteOptions) -> TransferResult<BlobResponse> {
        self.record(Call::Upload(data.len()));
        self.jitter().await;
        let mut state = self.state.lock().unwrap();
        state.committed = data.to_vec();
        state.write_options = Some(options.clone());
        Ok(ok(201))
    }

    async fn stage_block(&self, block_id: &str, data: Bytes) -> TransferResult<BlobResponse> {
        self.record(Call::StageBlock(block_id.to_string(), data.len()));
        self.jitter().await;
        if self.fail_block.as_deref() == Some(block_id) {
            return Err(TransferError::Service {
                status: 500,
                error_code: Some("InternalError".to_string()),
            });
        }
        let mut state = self.state.lock().unwrap();
        state.stage_order.push(block_id.to_string());
        // Copied like a real service would, so stream buffers are not pinned.
        state.staged.insert(block_id.to_string(), Bytes::copy_from_slice(&data));
        Ok(ok(201))
    }

    async fn commit_block_list(
        &self,
        block_ids: &[String],
        options: &BlobWriteOptions,
    ) -> TransferResult<BlobResponse> {
        self.record(Call::Commit(block_ids.to_vec()));
        let mut state = self.state.lock().unwrap();
        let mut content = Vec::new();
        for id in block_ids {
            let block = state.staged.get(id).ok_or(TransferError::Service {
                status: 400,
                error_code: Some("InvalidBlockList".to_string()),
            })?;
            content.extend_from_slice(block);
        }
        state.committed = content;
        state.staged.clear();
        state.write_options = Some(options.clone());
        Ok(ok(201))
    }

    async fn download(&self, range: ByteRange) -> TransferResult<DownloadResponse> {
        self.record(Call::Download(range));
        self.jitter().await;
        let content = self.content();
        let start = (range.offset as usize).min(content.len());
        let end = match range.count {
            Some(c) if c > 0 => (start + c as usize).min(content.len()),
            _ => content.len(),
        };
        let end = end.saturating_sub(self.short_reads).max(start);
        let body = Bytes::from(content[start..end].to_vec());
        // Hand the body back in small pieces to exercise reassembly.
        let pieces: Vec<io::Result<Bytes>> = body
            .chunks(7)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(DownloadResponse {
            properties: BlobProperties {
                content_length: (end - start) as u64,
                ..BlobProperties::default()
            },
            body: stream::iter(pieces).boxed(),
        })
    }

    async fn get_properties(&self) -> TransferResult<BlobProperties> {
        self.record(Call::GetProperties);
        Ok(BlobProperties {
            content_length: self.content().len() as u64,
            etag: Some("mem".to_string()),
            ..BlobProperties::default()
        })
    }
}
