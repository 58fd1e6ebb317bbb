//! Byte-slice helpers shared by the request parser and the static-file
//! server: ASCII lowercasing, ASCII-safe byte-to-string conversion, and
//! sub-sequence search.
//!
//! HTTP headers are specified over an unspecified 8-bit encoding (treated
//! here as ISO-8859-1, a superset of ASCII), so none of this reaches for
//! `str` until the very end.

/// Case-insensitive prefix test over raw bytes.
pub fn starts_with_ignore_case(haystack: &[u8], prefix: &[u8]) -> bool {
    haystack.len() >= prefix.len() && haystack[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Lowercases an ASCII byte slice into a fresh `Vec<u8>`. Non-ASCII bytes
/// pass through unchanged (headers are rejected earlier if they contain
/// bytes outside the printable ASCII range; this just avoids panicking on
/// stray high bytes that do slip through other paths, like raw path bytes).
pub fn to_ascii_lowercase(input: &[u8]) -> Vec<u8> {
    input.iter().map(|b| b.to_ascii_lowercase()).collect()
}

/// Converts an ASCII-safe byte slice to a `String`, replacing anything
/// outside printable ASCII with `?`. Used when handing bytes off to
/// diagnostics or log lines, where a lossless conversion isn't needed but a
/// panic-free one is required.
pub fn ascii_safe_to_string(input: &[u8]) -> String {
    input
        .iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' })
        .collect()
}

/// Finds the first occurrence of `needle` in `haystack`, analogous to
/// `[T]::windows` based search but without allocating the windows iterator's
/// intermediate slices beyond what's needed; used to scan the header buffer
/// for the `\r\n\r\n` terminator.
pub fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_match_is_case_insensitive() {
        assert!(starts_with_ignore_case(b"FOOBAR", b"foo"));
        assert!(starts_with_ignore_case(b"foobar", b""));
        assert!(!starts_with_ignore_case(b"fo", b"foobar"));
    }

    #[test]
    fn lowercase_leaves_non_ascii_alone_but_folds_ascii() {
        assert_eq!(to_ascii_lowercase(b"AbC-123"), b"abc-123");
    }

    #[test]
    fn ascii_safe_escapes_control_bytes() {
        assert_eq!(ascii_safe_to_string(b"ok\x01bye"), "ok?bye");
    }

    #[test]
    fn subsequence_search_finds_terminator() {
        let haystack = b"GET / HTTP/1.1\r\nHost: x\r\n\r\nbody";
        let pos = find_subsequence(haystack, b"\r\n\r\n").unwrap();
        assert_eq!(&haystack[pos + 4..], b"body");
    }

    #[test]
    fn subsequence_search_absent_is_none() {
        assert_eq!(find_subsequence(b"no terminator here", b"\r\n\r\n"), None);
    }
}
