//! The HTTP response value: mutable until its header is frozen, then
//! immutable. Freezing itself -- deciding the `Connection:` directive,
//! computing `Content-Length`, and queuing the header bytes on the writer --
//! is `Context`'s job (see `context.rs`); this module only owns the field
//! set and the serialization to wire bytes.
//!
//! Fields are collected into a `Response` value so a handler can
//! set/overwrite them before anything hits the wire; the wire format itself
//! (status line, `Server:`/`Date:` banner, CRLF-separated fields, blank
//! line) stays a direct, one-`write()`-per-field serialization.

use crate::dict::HttpDict;
use time::OffsetDateTime;

#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub status_message: String,
    pub content_type: Option<String>,
    /// Must be set explicitly before freeze; `None` means "not yet decided".
    pub content_length: Option<i64>,
    pub content_encoding: Option<String>,
    /// Empty string means "server decides".
    pub connection: String,
    pub headers: HttpDict,
    pub header_sent: bool,
}

impl Default for Response {
    fn default() -> Self {
        Response {
            status: 200,
            status_message: "OK".to_string(),
            content_type: None,
            content_length: None,
            content_encoding: None,
            connection: String::new(),
            headers: HttpDict::new(),
            header_sent: false,
        }
    }
}

impl Response {
    pub fn new() -> Self {
        Response::default()
    }

    pub fn set_status(&mut self, status: u16, message: impl Into<String>) {
        self.status = status;
        self.status_message = message.into();
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = Some(content_type.into());
    }

    pub fn set_content_encoding(&mut self, encoding: impl Into<String>) {
        self.content_encoding = Some(encoding.into());
    }

    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.set(key, value);
    }

    /// Produces the status line followed by CRLF-separated header fields
    /// followed by a blank line, UTF-8 encoded. Called exactly once, by
    /// `Context`'s header-freeze step.
    pub fn serialize_header(&self, version_major: u32, version_minor: u32) -> Vec<u8> {
        let mut out = Vec::with_capacity(256);
        out.extend_from_slice(format!("HTTP/{}.{} {} {}\r\n", version_major, version_minor, self.status, self.status_message).as_bytes());
        out.extend_from_slice(b"Server: hearthd\r\n");
        out.extend_from_slice(format!("Date: {}\r\n", format_http_date(OffsetDateTime::now_utc())).as_bytes());

        if let Some(ct) = &self.content_type {
            out.extend_from_slice(format!("Content-Type: {}\r\n", ct).as_bytes());
        }
        if let Some(enc) = &self.content_encoding {
            out.extend_from_slice(format!("Content-Encoding: {}\r\n", enc).as_bytes());
        }
        let length = self.content_length.unwrap_or(0).max(0);
        out.extend_from_slice(format!("Content-Length: {}\r\n", length).as_bytes());
        if !self.connection.is_empty() {
            out.extend_from_slice(format!("Connection: {}\r\n", self.connection).as_bytes());
        }
        for (k, v) in self.headers.iter() {
            out.extend_from_slice(format!("{}: {}\r\n", k, v).as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out
    }
}

fn format_http_date(dt: OffsetDateTime) -> String {
    const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    const MONTHS: [&str; 12] =
        ["Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec"];
    format!(
        "{}, {:02} {} {} {:02}:{:02}:{:02} GMT",
        WEEKDAYS[dt.weekday().number_days_from_monday() as usize],
        dt.day(),
        MONTHS[u8::from(dt.month()) as usize - 1],
        dt.year(),
        dt.hour(),
        dt.minute(),
        dt.second(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_status_is_200() {
        let r = Response::new();
        assert_eq!(r.status, 200);
        assert_eq!(r.status_message, "OK");
    }

    #[test]
    fn serialized_header_ends_with_blank_line() {
        let mut r = Response::new();
        r.content_length = Some(5);
        let bytes = r.serialize_header(1, 1);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
        assert!(text.contains("Content-Length: 5\r\n"));
    }

    #[test]
    fn content_encoding_header_is_emitted_when_set() {
        let mut r = Response::new();
        r.content_length = Some(0);
        r.set_content_encoding("gzip");
        let text = String::from_utf8(r.serialize_header(1, 1)).unwrap();
        assert!(text.contains("Content-Encoding: gzip\r\n"));
    }
}
