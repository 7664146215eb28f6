//! Blob name extraction from a blob URL.

/// Returns the blob name (path after the container segment, percent-decoded)
/// of a blob URL, e.g. `dir/file.bin` for `https://h/container/dir/file.bin`.
///
/// Returns `None` if the URL cannot be parsed or names only a container.
pub fn blob_name_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let mut segments = parsed.path_segments()?.filter(|s| !s.is_empty());
    segments.next()?; // container
    let rest: Vec<String> = segments
        .map(|s| {
            url::form_urlencoded::parse(format!("x={}", s.replace('+', "%2B").replace('&', "%26")).as_bytes())
                .next()
                .map(|(_, v)| v.into_owned())
                .unwrap_or_else(|| s.to_string())
        })
        .collect();
    if rest.is_empty() {
        return None;
    }
    Some(rest.join("/"))
}
