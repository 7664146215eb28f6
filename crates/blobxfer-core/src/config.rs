use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::{RetryOptions, RetryPolicyType};
use crate::transfer::{StreamUploadOptions, TransferOptions, DEFAULT_BLOCK_BYTES, DEFAULT_PARALLELISM};

/// Retry policy parameters (optional `[retry]` section in config.toml).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// "exponential" or "fixed".
    pub policy: RetryPolicyType,
    /// Attempts per request, including the first.
    pub max_tries: u32,
    pub try_timeout_secs: u64,
    pub retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    /// Read-only secondary endpoint host (e.g. `acct-secondary.blob.core.windows.net`).
    pub secondary_host: Option<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let d = RetryOptions::default();
        Self {
            policy: d.policy_type,
            max_tries: d.max_tries,
            try_timeout_secs: d.try_timeout.as_secs(),
            retry_delay_ms: d.retry_delay.as_millis() as u64,
            max_retry_delay_ms: d.max_retry_delay.as_millis() as u64,
            secondary_host: None,
        }
    }
}

impl RetryConfig {
    /// Normalized options; out-of-range values fall back to defaults.
    pub fn to_options(&self) -> RetryOptions {
        RetryOptions {
            policy_type: self.policy,
            max_tries: self.max_tries,
            try_timeout: Duration::from_secs(self.try_timeout_secs),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            max_retry_delay: Duration::from_millis(self.max_retry_delay_ms),
            secondary_host: self.secondary_host.clone(),
        }
        .normalized()
    }
}

/// Global configuration loaded from `~/.config/blobxfer/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobxferConfig {
    /// Chunk operations in flight per transfer.
    pub parallelism: usize,
    /// Upload block size in bytes; 0 picks one from the blob size.
    pub block_size: u64,
    /// Bytes per ranged read when downloading.
    pub download_block_size: u64,
    /// Buffer size for stream uploads.
    pub stream_buffer_size: usize,
    /// Buffers filled or in flight at once for stream uploads.
    pub stream_max_buffers: usize,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for BlobxferConfig {
    fn default() -> Self {
        Self {
            parallelism: DEFAULT_PARALLELISM,
            block_size: 0,
            download_block_size: DEFAULT_BLOCK_BYTES,
            stream_buffer_size: 8 * 1024 * 1024,
            stream_max_buffers: 8,
            retry: None,
        }
    }
}

impl BlobxferConfig {
    pub fn retry_options(&self) -> RetryOptions {
        self.retry.clone().unwrap_or_default().to_options()
    }

    /// Options for buffer and file uploads.
    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            block_size: self.block_size,
            parallelism: self.parallelism,
            ..TransferOptions::default()
        }
    }

    /// Options for downloads; the block size is the download range size.
    pub fn download_options(&self) -> TransferOptions {
        TransferOptions {
            block_size: self.download_block_size,
            parallelism: self.parallelism,
            ..TransferOptions::default()
        }
    }

    pub fn stream_options(&self) -> StreamUploadOptions {
        StreamUploadOptions {
            buffer_size: self.stream_buffer_size,
            max_buffers: self.stream_max_buffers,
            ..StreamUploadOptions::default()
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("blobxfer")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<BlobxferConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = BlobxferConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: BlobxferConfig = toml::from_str(&data)
        .map_err(|e| anyhow::anyhow!("invalid config {}: {e}", path.display()))?;
    Ok(cfg)
}
