//! `HttpDict`: a string-to-string mapping with "missing read never fails"
//! semantics, used for the query map, the cookie map, and the catch-all
//! request header map. A thin, well-tested utility type rather than a crate.

use std::collections::HashMap;
use std::str::FromStr;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpDict {
    entries: HashMap<String, String>,
}

impl HttpDict {
    pub fn new() -> Self {
        HttpDict { entries: HashMap::new() }
    }

    /// Last write wins on a repeated key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// A read of a missing key returns the empty string; it never fails.
    pub fn get(&self, key: &str) -> &str {
        self.entries.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// A typed get with a default returns that default on a missing key or
    /// an entry that fails to parse as `T`.
    pub fn get_or<T: FromStr>(&self, key: &str, default: T) -> T {
        self.entries.get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_reads_as_empty_string() {
        let d = HttpDict::new();
        assert_eq!(d.get("nope"), "");
    }

    #[test]
    fn last_write_wins() {
        let mut d = HttpDict::new();
        d.set("a", "1");
        d.set("a", "2");
        assert_eq!(d.get("a"), "2");
    }

    #[test]
    fn typed_get_falls_back_on_missing_or_unparseable() {
        let mut d = HttpDict::new();
        d.set("n", "not a number");
        assert_eq!(d.get_or("n", 7i64), 7);
        assert_eq!(d.get_or("missing", 9i64), 9);

        d.set("n2", "42");
        assert_eq!(d.get_or("n2", 0i64), 42);
    }
}
