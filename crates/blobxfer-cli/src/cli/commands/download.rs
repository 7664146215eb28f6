//! `blobxfer download`: ranged parallel download to a local file.

use anyhow::{Context, Result};
use blobxfer_core::checksum;
use blobxfer_core::config::BlobxferConfig;
use blobxfer_core::transfer::download_to_file;
use blobxfer_core::url_model::derive_filename;
use std::path::PathBuf;

use super::{blob_client, progress};

/// Parsed `download` arguments.
#[derive(Debug)]
pub struct DownloadArgs {
    pub blob_url: String,
    pub dest: Option<PathBuf>,
    pub offset: u64,
    pub count: Option<u64>,
    pub block_size: Option<u64>,
    pub parallelism: Option<usize>,
    pub sha256: Option<String>,
}

impl DownloadArgs {
    /// Destination path: explicit, or the sanitized blob name in the current directory.
    pub fn destination(&self) -> PathBuf {
        self.dest
            .clone()
            .unwrap_or_else(|| PathBuf::from(derive_filename(&self.blob_url)))
    }
}

pub async fn run_download(cfg: &BlobxferConfig, args: DownloadArgs) -> Result<()> {
    let client = blob_client(cfg, &args.blob_url)?;
    let dest = args.destination();
    let mut opts = cfg.download_options();
    if let Some(bs) = args.block_size {
        opts.block_size = bs;
    }
    if let Some(p) = args.parallelism {
        opts.parallelism = p;
    }
    let (callback, printer) = progress::spawn_printer();
    opts.progress = Some(callback);

    let result = download_to_file(&client, &dest, args.offset, args.count, &opts).await;
    drop(opts);
    let _ = printer.await;

    let bytes = result.with_context(|| format!("download to {} failed", dest.display()))?;
    tracing::info!(dest = %dest.display(), bytes, "download finished");

    if let Some(expected) = args.sha256.as_deref() {
        let path = dest.clone();
        let expected = expected.to_string();
        tokio::task::spawn_blocking(move || checksum::verify_sha256(&path, &expected))
            .await??;
        println!("SHA-256 OK");
    }
    println!("Downloaded {} bytes -> {}", bytes, dest.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(url: &str, dest: Option<&str>) -> DownloadArgs {
        DownloadArgs {
            blob_url: url.to_string(),
            dest: dest.map(PathBuf::from),
            offset: 0,
            count: None,
            block_size: None,
            parallelism: None,
            sha256: None,
        }
    }

    #[test]
    fn destination_defaults_to_blob_name() {
        let a = args("https://acct.blob.core.windows.net/c/dir/a.iso?sv=1&sig=x", None);
        assert_eq!(a.destination(), PathBuf::from("a.iso"));
    }

    #[test]
    fn explicit_destination_wins() {
        let a = args("https://acct.blob.core.windows.net/c/a.iso", Some("/tmp/out.bin"));
        assert_eq!(a.destination(), PathBuf::from("/tmp/out.bin"));
    }
}
