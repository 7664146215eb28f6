//! Chunk planning: service limits, block sizing and range math.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::blob::ByteRange;
use crate::error::{TransferError, TransferResult};

const MIB: u64 = 1024 * 1024;

/// Largest blob accepted by a single Put Blob.
pub const MAX_SINGLE_SHOT_BYTES: u64 = 256 * MIB;
/// Largest block accepted by Put Block.
pub const MAX_BLOCK_BYTES: u64 = 100 * MIB;
/// Most blocks a committed blob may have.
pub const MAX_BLOCKS: u64 = 50_000;
/// Block size for downloads, and the floor for auto-sized upload blocks.
pub const DEFAULT_BLOCK_BYTES: u64 = 4 * MIB;

/// Service limits the planner works within. Tests shrink them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferLimits {
    pub max_single_shot: u64,
    pub max_block_size: u64,
    pub max_blocks: u64,
    pub default_block_size: u64,
}

impl Default for TransferLimits {
    fn default() -> Self {
        Self {
            max_single_shot: MAX_SINGLE_SHOT_BYTES,
            max_block_size: MAX_BLOCK_BYTES,
            max_blocks: MAX_BLOCKS,
            default_block_size: DEFAULT_BLOCK_BYTES,
        }
    }
}

/// Checks a block count limit. Ids are five digits wide, so no limit may go
/// past the service's own.
pub(crate) fn check_max_blocks(max_blocks: u64) -> TransferResult<()> {
    if max_blocks == 0 || max_blocks > MAX_BLOCKS {
        return Err(TransferError::validation(format!(
            "max_blocks must be in [1, {MAX_BLOCKS}] (got {max_blocks})"
        )));
    }
    Ok(())
}

/// Block id for index `i`: base64 of the zero-padded decimal index. Ids sort
/// in index order and all have the same length for every index below
/// `MAX_BLOCKS`.
pub fn block_id(index: u64) -> String {
    STANDARD.encode(format!("{index:05}"))
}

/// One chunk: absolute byte range [start, end) (half-open).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub index: u64,
    pub start: u64,
    pub end: u64,
}

impl Chunk {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> ByteRange {
        ByteRange::new(self.start, self.len())
    }
}

/// `size` bytes starting at `offset`, split into `block_size` pieces; the last
/// one may be short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub offset: u64,
    pub size: u64,
    pub block_size: u64,
}

impl ChunkPlan {
    pub fn count(&self) -> u64 {
        if self.size == 0 {
            0
        } else {
            (self.size - 1) / self.block_size + 1
        }
    }

    pub fn chunk(&self, index: u64) -> Chunk {
        let start = self.offset + index * self.block_size;
        let end = (start + self.block_size).min(self.offset + self.size);
        Chunk { index, start, end }
    }

    pub fn chunks(&self) -> impl Iterator<Item = Chunk> + '_ {
        (0..self.count()).map(move |i| self.chunk(i))
    }

    /// Block ids for every chunk, ascending.
    pub fn block_ids(&self) -> Vec<String> {
        (0..self.count()).map(block_id).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPlan {
    /// One Put Blob with the whole payload.
    Single { size: u64 },
    /// Staged blocks followed by a block list commit.
    Blocks(ChunkPlan),
}

/// Decides how to upload `size` bytes. `block_size == 0` picks a size.
/// Fails without side effects when the blob cannot be represented.
pub fn plan_upload(size: u64, block_size: u64, limits: &TransferLimits) -> TransferResult<UploadPlan> {
    check_max_blocks(limits.max_blocks)?;
    if block_size > limits.max_block_size {
        return Err(TransferError::validation(format!(
            "block_size must be >= 0 and <= {} (got {block_size})",
            limits.max_block_size
        )));
    }
    if size <= limits.max_single_shot {
        return Ok(UploadPlan::Single { size });
    }

    let block_size = if block_size == 0 {
        let auto = size.div_ceil(limits.max_blocks).max(limits.default_block_size);
        if auto > limits.max_block_size {
            return Err(TransferError::validation(format!(
                "{size} bytes is too large to upload to a block blob"
            )));
        }
        auto
    } else {
        block_size
    };

    let plan = ChunkPlan {
        offset: 0,
        size,
        block_size,
    };
    if plan.count() > limits.max_blocks {
        return Err(TransferError::validation(format!(
            "{} blocks of {block_size} bytes exceed the limit of {} blocks; use a larger block_size",
            plan.count(),
            limits.max_blocks
        )));
    }
    Ok(UploadPlan::Blocks(plan))
}

/// Splits [offset, offset + count) into ranged reads. `block_size == 0`
/// uses the default download block size.
pub fn plan_download(offset: u64, count: u64, block_size: u64, limits: &TransferLimits) -> ChunkPlan {
    let block_size = if block_size == 0 {
        limits.default_block_size
    } else {
        block_size
    };
    ChunkPlan {
        offset,
        size: count,
        block_size,
    }
}
