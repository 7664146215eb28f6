//! Concurrent offset writer for `.part` download files.

use std::fs::File;
use std::io;
#[cfg(unix)]
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Writer for a temp download file. Clones share the file; each `write_at`
/// is independent (pwrite-style), so ranges can land in any order.
#[derive(Debug, Clone)]
pub struct StorageWriter {
    file: Arc<File>,
    temp_path: PathBuf,
}

impl StorageWriter {
    pub(crate) fn from_file_and_path(file: File, temp_path: PathBuf) -> Self {
        Self {
            file: Arc::new(file),
            temp_path,
        }
    }

    /// Writes all of `data` at `offset` without moving any shared cursor.
    #[cfg(unix)]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.file.write_all_at(data, offset)
    }

    /// Non-Unix fallback: seek + write on a cloned handle. Not safe for
    /// concurrent use.
    #[cfg(not(unix))]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        use std::io::{Seek, SeekFrom, Write};
        let mut f = self.file.try_clone()?;
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(data)
    }

    pub fn sync(&self) -> io::Result<()> {
        self.file.sync_all()
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Renames the temp file to `final_path`. Fails across filesystems.
    pub fn finalize(self, final_path: &Path) -> io::Result<()> {
        let StorageWriter { file, temp_path } = self;
        drop(file);
        std::fs::rename(&temp_path, final_path).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!(
                    "failed to rename {} to {}: {e}",
                    temp_path.display(),
                    final_path.display()
                ),
            )
        })
    }

    /// Removes the temp file after a failed transfer.
    pub fn discard(self) {
        let StorageWriter { file, temp_path } = self;
        drop(file);
        if let Err(e) = std::fs::remove_file(&temp_path) {
            tracing::debug!(path = %temp_path.display(), error = %e, "could not remove temp file");
        }
    }
}
