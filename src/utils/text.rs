//! Small text helpers shared by prompts, error snippets and hashing.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `text`.
pub fn sha256_hex(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// The first `max_chars` characters of `text` (never splits a code point).
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Truncate for inclusion in a prompt, substituting a placeholder when empty.
pub fn snip(text: Option<&str>, max_chars: usize, placeholder: &str) -> String {
    match text.map(|t| truncate_chars(t, max_chars)) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => placeholder.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_truncate_chars_respects_code_points() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }

    #[test]
    fn test_snip_placeholder() {
        assert_eq!(snip(None, 5, "(empty)"), "(empty)");
        assert_eq!(snip(Some(""), 5, "(empty)"), "(empty)");
        assert_eq!(snip(Some("abcdefgh"), 3, "(empty)"), "abc");
    }
}
