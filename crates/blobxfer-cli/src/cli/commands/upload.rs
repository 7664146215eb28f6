//! `blobxfer upload` and `blobxfer upload-stdin`.

use anyhow::{Context, Result};
use blobxfer_core::config::BlobxferConfig;
use blobxfer_core::transfer::{upload_file, upload_stream};
use std::path::Path;

use super::{blob_client, progress};

pub async fn run_upload(
    cfg: &BlobxferConfig,
    path: &Path,
    blob_url: &str,
    block_size: Option<u64>,
    parallelism: Option<usize>,
) -> Result<()> {
    let client = blob_client(cfg, blob_url)?;
    let mut opts = cfg.transfer_options();
    if let Some(bs) = block_size {
        opts.block_size = bs;
    }
    if let Some(p) = parallelism {
        opts.parallelism = p;
    }
    let (callback, printer) = progress::spawn_printer();
    opts.progress = Some(callback);

    let result = upload_file(&client, path, &opts).await;
    drop(opts);
    let _ = printer.await;

    let resp = result.with_context(|| format!("upload {} failed", path.display()))?;
    tracing::info!(path = %path.display(), status = resp.status, "upload finished");
    println!("Uploaded {} -> {}", path.display(), client.url().path());
    Ok(())
}

pub async fn run_upload_stdin(
    cfg: &BlobxferConfig,
    blob_url: &str,
    buffer_size: Option<usize>,
    max_buffers: Option<usize>,
) -> Result<()> {
    let client = blob_client(cfg, blob_url)?;
    let mut opts = cfg.stream_options();
    if let Some(size) = buffer_size {
        opts.buffer_size = size;
    }
    if let Some(n) = max_buffers {
        opts.max_buffers = n;
    }
    let (callback, printer) = progress::spawn_printer();
    opts.progress = Some(callback);

    let result = upload_stream(&client, tokio::io::stdin(), &opts).await;
    drop(opts);
    let _ = printer.await;

    let resp = result.context("upload from stdin failed")?;
    tracing::info!(status = resp.status, "stream upload finished");
    println!("Uploaded stdin -> {}", client.url().path());
    Ok(())
}
