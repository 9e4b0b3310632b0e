//! Filename extraction from mirror URLs and `.partN` marker parsing.

/// Last non-empty path segment of a parsed URL (query and fragment excluded).
///
/// Returns `None` for root paths and for `.` / `..`.
pub fn filename_from_url(url: &url::Url) -> Option<String> {
    let segment = url.path().split('/').filter(|s| !s.is_empty()).last()?;
    if segment == "." || segment == ".." {
        return None;
    }
    Some(segment.to_string())
}

/// Splits `<base>.part<N>.<ext>` into `(base, N)`.
///
/// The marker must be followed by an extension (hosts sometimes append a second
/// one, as in `Album.part1.rar.html`) and `N` must be a positive decimal number,
/// leading zeros allowed. The rightmost valid marker wins. Anything else is a
/// single-part file: the whole filename is the base and the part number is 1.
pub fn split_part_marker(filename: &str) -> (String, u32) {
    parse_marker(filename).unwrap_or_else(|| (filename.to_string(), 1))
}

fn parse_marker(filename: &str) -> Option<(String, u32)> {
    const MARKER: &str = ".part";
    let mut end = filename.len();
    while let Some(idx) = filename[..end].rfind(MARKER) {
        let base = &filename[..idx];
        let rest = &filename[idx + MARKER.len()..];
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let ext = &rest[digits..];
        if !base.is_empty() && digits > 0 && ext.len() > 1 && ext.starts_with('.') {
            if let Ok(part) = rest[..digits].parse::<u32>() {
                if part > 0 {
                    return Some((base.to_string(), part));
                }
            }
        }
        end = idx;
    }
    None
}
