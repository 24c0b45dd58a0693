use std::collections::BTreeMap;
use std::ops::Range;

/// Header title → index of its first matching line. Title-sorted.
pub type HeaderIndex = BTreeMap<String, usize>;

/// Record the first line that exactly equals each known header.
/// Headers that never appear are simply absent from the map.
pub fn find_header_indices(lines: &[String], headers: &[String]) -> HeaderIndex {
    let mut idx = HeaderIndex::new();
    for (i, line) in lines.iter().enumerate() {
        if headers.iter().any(|h| h == line) && !idx.contains_key(line) {
            idx.insert(line.clone(), i);
        }
    }
    idx
}

/// Half-open line range of `header`'s body: from the line after the header up
/// to the nearest following header (or the end of the document).
/// `None` when the header was not found.
pub fn section_span(lines: &[String], header: &str, idx: &HeaderIndex) -> Option<Range<usize>> {
    let current = *idx.get(header)?;
    let end = idx
        .values()
        .copied()
        .filter(|&i| i > current)
        .min()
        .unwrap_or(lines.len());
    Some(current + 1..end)
}

// ── Tests ──
