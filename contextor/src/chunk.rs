//! `#chunk<N>` location markers.
//!
//! Documents split at ingestion time carry `#chunk<N>` in their `location`
//! and share `original_location`.

use std::sync::OnceLock;

use regex::Regex;

static CHUNK_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn chunk_re() -> Option<&'static Regex> {
    CHUNK_RE
        .get_or_init(|| Regex::new(r"#chunk(\d+)").ok())
        .as_ref()
}

/// Whether the location carries a chunk marker.
pub fn is_chunk(location: &str) -> bool {
    chunk_re().is_some_and(|re| re.is_match(location))
}

/// Chunk index of `location`, `None` when unmarked or out of range.
pub fn chunk_index(location: &str) -> Option<u32> {
    chunk_re()?
        .captures(location)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

/// Sort key ordering chunks by index, unmarked rows last.
pub fn order_key(location: &str) -> u64 {
    chunk_index(location).map_or(u64::MAX, u64::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_are_parsed() {
        assert_eq!(chunk_index("docs/guide.md#chunk12"), Some(12));
        assert_eq!(chunk_index("docs/guide.md#chunk0#frag"), Some(0));
        assert_eq!(chunk_index("docs/guide.md#section"), None);
        assert_eq!(chunk_index("docs/guide.md#chunk"), None);
        assert!(is_chunk("a#chunk3"));
        assert!(!is_chunk("a"));
    }

    #[test]
    fn huge_indices_are_not_chunks_with_an_index() {
        assert_eq!(chunk_index("a#chunk99999999999999"), None);
        assert_eq!(order_key("a#chunk99999999999999"), u64::MAX);
    }
}
