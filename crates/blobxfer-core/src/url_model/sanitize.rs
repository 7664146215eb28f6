//! Local filename sanitization for downloaded blobs.

/// Linux NAME_MAX.
const NAME_MAX: usize = 255;

/// Sanitizes a blob name leaf for use as a local filename on Linux.
///
/// NUL, `/`, `\`, whitespace and control characters become `_`; runs of `_`
/// collapse to one; leading/trailing dots and underscores are trimmed; the
/// result is cut to 255 bytes on a char boundary.
pub fn sanitize_local_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_underscore = false;

    for c in name.chars() {
        let unsafe_char = c == '\0' || c == '/' || c == '\\' || c.is_control() || c.is_whitespace();
        let c = if unsafe_char { '_' } else { c };
        if c == '_' {
            if !prev_underscore {
                out.push('_');
            }
            prev_underscore = true;
        } else {
            out.push(c);
            prev_underscore = false;
        }
    }

    let trimmed = out.trim_matches(|c| c == '.' || c == '_');
    let mut take = trimmed.len().min(NAME_MAX);
    while take > 0 && !trimmed.is_char_boundary(take) {
        take -= 1;
    }
    trimmed[..take].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separators_become_underscores() {
        assert_eq!(sanitize_local_filename("a/b\\c.txt"), "a_b_c.txt");
        assert_eq!(sanitize_local_filename("file\x00name.txt"), "file_name.txt");
    }

    #[test]
    fn whitespace_collapses_and_edges_trim() {
        assert_eq!(sanitize_local_filename("  ..my   file.txt..  "), "my_file.txt");
    }

    #[test]
    fn long_names_are_cut_on_char_boundary() {
        let name = "é".repeat(200);
        let out = sanitize_local_filename(&name);
        assert!(out.len() <= 255);
        assert!(out.chars().all(|c| c == 'é'));
    }
}
