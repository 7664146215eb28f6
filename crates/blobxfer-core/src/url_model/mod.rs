//! Blob URL manipulation and local filename derivation.
//!
//! The retry policy rewrites hosts for secondary-endpoint attempts, the REST
//! client appends `comp=`/`blockid=` query parameters, and the CLI derives a
//! local filename from the blob path.

mod edit;
mod path;
mod sanitize;

pub use edit::{set_url_host, set_url_parameter};
pub use path::blob_name_from_url;
pub use sanitize::sanitize_local_filename;

/// Default filename when the blob URL path yields nothing usable.
const DEFAULT_FILENAME: &str = "blob.bin";

/// Derives a safe local filename for a downloaded blob.
///
/// Uses the last segment of the blob name (virtual directories are dropped),
/// sanitized for Linux. Falls back to `blob.bin`.
///
/// # Examples
///
/// - `derive_filename("https://acct.blob.core.windows.net/c/dir/a.iso?sv=x")` → `"a.iso"`
/// - `derive_filename("https://acct.blob.core.windows.net/c")` → `"blob.bin"`
pub fn derive_filename(url: &str) -> String {
    let raw = match blob_name_from_url(url) {
        Some(name) => name,
        None => return DEFAULT_FILENAME.to_string(),
    };
    let leaf = raw.rsplit('/').next().unwrap_or(raw.as_str());
    let sanitized = sanitize_local_filename(leaf);
    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        DEFAULT_FILENAME.to_string()
    } else {
        sanitized
    }
}
