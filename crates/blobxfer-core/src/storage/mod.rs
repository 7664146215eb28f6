//! Local file I/O for transfers.
//!
//! Downloads go to a preallocated `.part` file written at arbitrary offsets
//! (pwrite) and renamed into place once every range has landed. File uploads
//! read each block with a positioned read so blocks can be staged in any
//! order.

mod builder;
mod reader;
mod writer;

pub use builder::StorageWriterBuilder;
pub use reader::BlockReader;
pub use writer::StorageWriter;

/// Suffix of the in-progress download file.
pub const TEMP_SUFFIX: &str = ".part";

/// Path for the temp file: appends `.part` to the final path (e.g. `file.iso` → `file.iso.part`).
pub fn temp_path(final_path: &std::path::Path) -> std::path::PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    std::path::PathBuf::from(o)
}
