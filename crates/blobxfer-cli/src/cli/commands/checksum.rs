//! Checksum command: compute SHA-256 of a file.

use anyhow::Result;
use blobxfer_core::checksum;
use std::path::Path;

/// Compute and print SHA-256 of the given file.
pub async fn run_checksum(path: &Path) -> Result<()> {
    let path = path.to_path_buf();
    let digest = tokio::task::spawn_blocking({
        let path = path.clone();
        move || checksum::sha256_path(&path)
    })
    .await??;
    println!("{}  {}", digest, path.display());
    Ok(())
}
