//! Small helpers shared across the crate.

use sha1::{Digest, Sha1};

/// Current wall-clock time as epoch milliseconds.
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// SHA-1 digest of `bytes` as lowercase hex.
pub fn sha1_hex(bytes: &[u8]) -> String {
    hex::encode(Sha1::digest(bytes))
}

/// Truncate a string to at most `max_chars` characters.
///
/// Uses character boundaries rather than byte indices so multi-byte UTF-8
/// content (emoji, CJK) never splits mid-character.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha1_hex_known_vector() {
        assert_eq!(
            sha1_hex(b"abc"),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn truncate_noop_when_short() {
        assert_eq!(truncate_chars("hello", 10), "hello");
    }

    #[test]
    fn truncate_cuts_at_char_boundary() {
        assert_eq!(truncate_chars("😀😀😀😀", 2), "😀😀");
        assert_eq!(truncate_chars("abcdef", 3), "abc");
    }

    #[test]
    fn now_ms_is_monotonic_enough() {
        let a = now_ms();
        let b = now_ms();
        assert!(b >= a);
    }
}
