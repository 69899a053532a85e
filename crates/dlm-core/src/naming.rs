//! Destination names derived from URLs.

/// Used when the URL has no usable last path segment.
pub const FALLBACK_NAME: &str = "download.bin";

/// Linux NAME_MAX, in bytes.
const NAME_MAX: usize = 255;

/// File name for `url`: its last non-empty path segment, made safe for a Linux
/// filesystem. Falls back to [`FALLBACK_NAME`].
pub fn name_from_url(url: &str) -> String {
    let segment = url::Url::parse(url).ok().and_then(|u| {
        u.path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last().map(str::to_string))
    });
    match segment.map(|s| sanitize(&s)) {
        Some(name) if !name.is_empty() => name,
        _ => FALLBACK_NAME.to_string(),
    }
}

/// Replace path separators, NUL and control characters with `_`, drop leading
/// and trailing dots and whitespace, and cut to `NAME_MAX` bytes on a char
/// boundary.
pub fn sanitize(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = replaced.trim_matches(|c: char| c == '.' || c.is_whitespace());
    let mut end = trimmed.len().min(NAME_MAX);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}

/// Whether `name` names a file directly inside a directory: not empty, not
/// `.` or `..`, no separators and no NUL.
pub fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_segment_wins() {
        assert_eq!(name_from_url("https://example.com/a/b/debian-12.iso"), "debian-12.iso");
        assert_eq!(name_from_url("https://example.com/dir/file.zip?token=abc"), "file.zip");
        assert_eq!(name_from_url("https://example.com/dir/"), "dir");
    }

    #[test]
    fn falls_back_without_a_segment() {
        assert_eq!(name_from_url("https://example.com/"), FALLBACK_NAME);
        assert_eq!(name_from_url("https://example.com/.."), FALLBACK_NAME);
        assert_eq!(name_from_url("not a url"), FALLBACK_NAME);
    }

    #[test]
    fn sanitize_strips_unsafe_characters() {
        assert_eq!(sanitize("a\\b\u{1}c"), "a_b_c");
        assert_eq!(sanitize("  .hidden.  "), "hidden");
        assert_eq!(sanitize("..."), "");
    }

    #[test]
    fn sanitize_caps_length_on_char_boundary() {
        let long = "é".repeat(200);
        let out = sanitize(&long);
        assert!(out.len() <= NAME_MAX);
        assert_eq!(out.len() % 2, 0);
    }

    #[test]
    fn plain_names_stay_in_their_directory() {
        assert!(is_plain_name("debian-12.iso"));
        assert!(is_plain_name(".hidden"));
        assert!(is_plain_name("a..b"));
        assert!(!is_plain_name("/etc/evil.bin"));
        assert!(!is_plain_name("../escape.bin"));
        assert!(!is_plain_name("sub/dir.bin"));
        assert!(!is_plain_name("a\\b"));
        assert!(!is_plain_name(".."));
        assert!(!is_plain_name("."));
        assert!(!is_plain_name(""));
    }
}
