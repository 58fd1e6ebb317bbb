//! Guessing the MIME type of files in inexpensive ways: a per-extension
//! `CT_<ext>` environment override checked before a canned table.

use std::env;

/// Takes a guess at a file's MIME type using its lowercased extension (no
/// leading dot). Checks `CT_<ext>` in the environment first; falls back to
/// a canned table; unknown extensions have no content-type.
pub fn from_extension(ext: &str) -> Option<String> {
    if ext.is_empty() {
        return None;
    }
    if let Ok(v) = env::var(format!("CT_{}", ext)) {
        return Some(v);
    }
    canned_mapping(ext).map(str::to_string)
}

fn canned_mapping(ext: &str) -> Option<&'static str> {
    Some(match ext {
        "htm" | "html" => "text/html",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "css" => "text/css",
        "js" => "application/javascript",
        "svg" => "image/svg+xml",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_extension_has_no_content_type() {
        assert_eq!(from_extension("foobar"), None);
        assert_eq!(from_extension(""), None);
    }

    #[test]
    fn canned_entries_cover_the_minimum_table() {
        assert_eq!(from_extension("html").as_deref(), Some("text/html"));
        assert_eq!(from_extension("css").as_deref(), Some("text/css"));
        assert_eq!(from_extension("woff2").as_deref(), Some("font/woff2"));
    }
}
