//! Utility functions shared across the council crates

/// Join key segments into a storage key.
///
/// Every segment maps to exactly one path component, so distinct segment
/// lists never produce the same key. `%` and `/` are percent-encoded, and
/// segments that are empty or consist only of dots are encoded whole so
/// they cannot collapse or climb out of their prefix.
pub fn storage_key<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(|s| encode_segment(s.as_ref()))
        .collect::<Vec<_>>()
        .join("/")
}

fn encode_segment(segment: &str) -> String {
    if segment.is_empty() {
        return "%00".to_string();
    }
    if segment.chars().all(|c| c == '.') {
        return "%2E".repeat(segment.len());
    }

    let mut encoded = String::with_capacity(segment.len());
    for c in segment.chars() {
        match c {
            '%' => encoded.push_str("%25"),
            '/' => encoded.push_str("%2F"),
            c => encoded.push(c),
        }
    }
    encoded
}
