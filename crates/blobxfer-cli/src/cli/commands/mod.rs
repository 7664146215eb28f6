//! CLI command handlers, one file per command.

mod checksum;
mod download;
mod progress;
mod upload;

use anyhow::{Context, Result};
use blobxfer_core::blob::BlockBlobClient;
use blobxfer_core::config::BlobxferConfig;
use std::sync::Arc;
use url::Url;

pub use checksum::run_checksum;
pub use download::{run_download, DownloadArgs};
pub use upload::{run_upload, run_upload_stdin};

/// REST client for `blob_url` with the configured retry policy.
fn blob_client(cfg: &BlobxferConfig, blob_url: &str) -> Result<Arc<BlockBlobClient>> {
    let url = Url::parse(blob_url).with_context(|| format!("invalid blob URL {blob_url}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        anyhow::bail!("unsupported URL scheme {} (expected http or https)", url.scheme());
    }
    Ok(Arc::new(BlockBlobClient::with_retry(url, cfg.retry_options())))
}
