//! CLI for the blobxfer block blob transfer engine.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use blobxfer_core::config::{self, BlobxferConfig};
use std::path::PathBuf;

use commands::{run_checksum, run_download, run_upload, run_upload_stdin, DownloadArgs};

/// Top-level CLI for blobxfer.
#[derive(Debug, Parser)]
#[command(name = "blobxfer")]
#[command(about = "blobxfer: parallel chunked block blob upload and download", long_about = None)]
pub struct Cli {
    /// Read-only secondary endpoint host used for read retries (overrides config).
    #[arg(long, global = true, value_name = "HOST")]
    pub secondary_host: Option<String>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Upload a local file to a block blob.
    Upload {
        /// Local file to upload.
        path: PathBuf,
        /// Blob URL, including a SAS token if the container needs one.
        blob_url: String,
        /// Block size in bytes (default: picked from the file size).
        #[arg(long, value_name = "BYTES")]
        block_size: Option<u64>,
        /// Blocks staged concurrently.
        #[arg(long, value_name = "N")]
        parallelism: Option<usize>,
    },

    /// Upload standard input to a block blob, one block per buffer.
    UploadStdin {
        /// Blob URL, including a SAS token if the container needs one.
        blob_url: String,
        /// Bytes per buffer (and per staged block).
        #[arg(long, value_name = "BYTES")]
        buffer_size: Option<usize>,
        /// Buffers filled or in flight at once (at least 2).
        #[arg(long, value_name = "N")]
        max_buffers: Option<usize>,
    },

    /// Download a block blob (or a range of it) to a local file.
    Download {
        /// Blob URL, including a SAS token if the container needs one.
        blob_url: String,
        /// Destination file (default: derived from the blob name).
        dest: Option<PathBuf>,
        /// First byte to download.
        #[arg(long, default_value = "0", value_name = "BYTES")]
        offset: u64,
        /// Bytes to download (default: to the end of the blob).
        #[arg(long, value_name = "BYTES")]
        count: Option<u64>,
        /// Bytes per ranged read.
        #[arg(long, value_name = "BYTES")]
        block_size: Option<u64>,
        /// Ranges fetched concurrently.
        #[arg(long, value_name = "N")]
        parallelism: Option<usize>,
        /// Expected SHA-256 (hex) of the downloaded bytes.
        #[arg(long, value_name = "HEX")]
        sha256: Option<String>,
    },

    /// Compute SHA-256 of a file (e.g. after download).
    Checksum {
        /// Path to the file.
        path: PathBuf,
    },
}

/// Applies the global `--secondary-host` on top of the loaded config.
fn apply_overrides(cfg: &mut BlobxferConfig, secondary_host: Option<String>) {
    if let Some(host) = secondary_host {
        cfg.retry.get_or_insert_with(Default::default).secondary_host = Some(host);
    }
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let mut cfg = config::load_or_init()?;
        apply_overrides(&mut cfg, cli.secondary_host);
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Upload {
                path,
                blob_url,
                block_size,
                parallelism,
            } => run_upload(&cfg, &path, &blob_url, block_size, parallelism).await?,
            CliCommand::UploadStdin {
                blob_url,
                buffer_size,
                max_buffers,
            } => run_upload_stdin(&cfg, &blob_url, buffer_size, max_buffers).await?,
            CliCommand::Download {
                blob_url,
                dest,
                offset,
                count,
                block_size,
                parallelism,
                sha256,
            } => {
                let args = DownloadArgs {
                    blob_url,
                    dest,
                    offset,
                    count,
                    block_size,
                    parallelism,
                    sha256,
                };
                run_download(&cfg, args).await?;
            }
            CliCommand::Checksum { path } => run_checksum(&path).await?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
