//! HTTP request parsing.
//!
//! A hand-rolled, byte-slice-first parser rather than an external HTTP
//! parsing crate -- the validation rules below (byte-range rejection, an
//! explicit eight-method whitelist, promoted vs. general headers) are
//! specific enough to this server that a generic parser would just get
//! wrapped in the same amount of bespoke logic anyway.

use crate::bytes_util::{starts_with_ignore_case, to_ascii_lowercase};
use crate::dict::HttpDict;
use crate::error::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Options,
    Connect,
    Trace,
}

impl Method {
    fn from_bytes(b: &[u8]) -> Option<Method> {
        Some(match b {
            b"GET" => Method::Get,
            b"HEAD" => Method::Head,
            b"POST" => Method::Post,
            b"PUT" => Method::Put,
            b"DELETE" => Method::Delete,
            b"OPTIONS" => Method::Options,
            b"CONNECT" => Method::Connect,
            b"TRACE" => Method::Trace,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub version: Version,
    /// Case-preserved, stripped of surrounding `/`.
    pub path: String,
    /// Lowercased mirror of `path`.
    pub path_lower: String,
    /// Lowercased extension after the final `.` of the last path segment,
    /// or empty.
    pub extension: String,
    pub fragment: String,
    pub query: HttpDict,
    pub cookies: HttpDict,
    /// Verbatim `Host:` header value (or start-line authority), if any.
    pub host: String,
    pub host_without_port: String,
    /// Lowercased `Connection:` directive.
    pub connection: String,
    pub referer: String,
    /// Lowercased `Accept-Encoding:` value.
    pub accept_encoding: String,
    /// -1 when absent, otherwise the declared length (>= 0).
    pub content_length: i64,
    /// All non-promoted header fields, keys lowercased.
    pub headers: HttpDict,
    pub is_websocket: bool,
}

/// Parses a request from a byte buffer holding everything from the method up
/// to and including the terminating `\r\n\r\n`.
pub fn parse(buf: &[u8]) -> Result<Request, ProtocolError> {
    validate_byte_range(buf)?;

    let mut lines = buf.split(|&b| b == b'\n').map(strip_trailing_cr).filter(|l| !l.is_empty());

    let request_line = lines.next().ok_or_else(|| ProtocolError::bad_request("empty request"))?;
    let (method, target, version) = parse_request_line(request_line)?;

    let (path_raw, fragment) = split_once(target, b'#');
    let (path_raw, query_raw) = split_once(path_raw, b'?');

    let path = strip_surrounding_slashes(path_raw);
    let path_lower = path.to_ascii_lowercase();
    let extension = extract_extension(&path);
    let query = parse_query(query_raw);
    let fragment = String::from_utf8_lossy(fragment).into_owned();

    let mut req = Request {
        method,
        version,
        path,
        path_lower,
        extension,
        fragment,
        query,
        cookies: HttpDict::new(),
        host: String::new(),
        host_without_port: String::new(),
        connection: String::new(),
        referer: String::new(),
        accept_encoding: String::new(),
        content_length: -1,
        headers: HttpDict::new(),
        is_websocket: false,
    };

    for line in lines {
        parse_header_field(line, &mut req)?;
    }

    req.host_without_port = split_once(req.host.as_bytes(), b':').0.iter().map(|&b| b as char).collect();

    req.is_websocket = req.connection.contains("upgrade")
        && req.headers.get("upgrade").eq_ignore_ascii_case("websocket")
        && req.headers.get_or("sec-websocket-version", 0i64) >= 13;

    Ok(req)
}

fn validate_byte_range(buf: &[u8]) -> Result<(), ProtocolError> {
    for &b in buf {
        let is_cr_or_lf = b == b'\r' || b == b'\n';
        if (b < 0x20 && !is_cr_or_lf) || b > 0x7E {
            return Err(ProtocolError::bad_request("control or non-ASCII byte in header"));
        }
    }
    Ok(())
}

fn strip_trailing_cr(line: &[u8]) -> &[u8] {
    if line.last() == Some(&b'\r') { &line[..line.len() - 1] } else { line }
}

fn parse_request_line(line: &[u8]) -> Result<(Method, &[u8], Version), ProtocolError> {
    let mut parts = line.splitn(3, |&b| b == b' ');
    let method_tok = parts.next().unwrap_or(b"");
    let target = parts.next().ok_or_else(|| ProtocolError::bad_request("malformed request line"))?;
    let version_tok = parts.next().ok_or_else(|| ProtocolError::bad_request("malformed request line"))?;
    if parts.next().is_some() {
        return Err(ProtocolError::bad_request("malformed request line"));
    }

    let method = Method::from_bytes(method_tok).ok_or_else(|| ProtocolError::bad_request("unsupported method"))?;
    let version = parse_version(version_tok)?;

    Ok((method, target, version))
}

fn parse_version(tok: &[u8]) -> Result<Version, ProtocolError> {
    let rest = tok.strip_prefix(b"HTTP/").ok_or_else(|| ProtocolError::new(505, "bad protocol token"))?;
    let (major_b, minor_b) = split_once(rest, b'.');
    let major: u32 = std::str::from_utf8(major_b)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ProtocolError::new(505, "bad protocol version"))?;
    let minor: u32 = std::str::from_utf8(minor_b)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ProtocolError::new(505, "bad protocol version"))?;

    if major != 1 {
        return Err(ProtocolError::new(505, "only HTTP/1.x is supported"));
    }

    Ok(Version { major, minor })
}

fn split_once(buf: &[u8], sep: u8) -> (&[u8], &[u8]) {
    match buf.iter().position(|&b| b == sep) {
        Some(i) => (&buf[..i], &buf[i + 1..]),
        None => (buf, b""),
    }
}

fn strip_surrounding_slashes(path: &[u8]) -> String {
    let mut start = 0;
    let mut end = path.len();
    while start < end && path[start] == b'/' {
        start += 1;
    }
    while end > start && path[end - 1] == b'/' {
        end -= 1;
    }
    String::from_utf8_lossy(&path[start..end]).into_owned()
}

fn extract_extension(path: &str) -> String {
    let last_segment = path.rsplit('/').next().unwrap_or("");
    match last_segment.rfind('.') {
        Some(i) => last_segment[i + 1..].to_ascii_lowercase(),
        None => String::new(),
    }
}

fn parse_query(raw: &[u8]) -> HttpDict {
    let mut dict = HttpDict::new();
    if raw.is_empty() {
        return dict;
    }
    for pair in raw.split(|&b| b == b'&') {
        if pair.is_empty() {
            continue;
        }
        let (k, v) = split_once(pair, b'=');
        dict.set(String::from_utf8_lossy(k).into_owned(), String::from_utf8_lossy(v).into_owned());
    }
    dict
}

fn parse_header_field(line: &[u8], req: &mut Request) -> Result<(), ProtocolError> {
    let colon = line.iter().position(|&b| b == b':').ok_or_else(|| ProtocolError::bad_request("malformed header field"))?;
    let key = to_ascii_lowercase(trim(&line[..colon]));
    let value = trim(&line[colon + 1..]);
    let key = String::from_utf8_lossy(&key).into_owned();
    let value_str = String::from_utf8_lossy(value).into_owned();

    match key.as_str() {
        "cookie" => parse_cookies(value, &mut req.cookies),
        "host" => req.host = value_str,
        "accept-encoding" => req.accept_encoding = value_str.to_ascii_lowercase(),
        "content-length" => req.content_length = value_str.trim().parse::<i64>().unwrap_or(0),
        "connection" => req.connection = value_str.to_ascii_lowercase(),
        "referer" => req.referer = value_str,
        _ => req.headers.set(key, value_str),
    }
    Ok(())
}

fn parse_cookies(value: &[u8], out: &mut HttpDict) {
    for pair in value.split(|&b| b == b';') {
        let pair = trim(pair);
        if pair.is_empty() {
            continue;
        }
        let (k, v) = split_once(pair, b'=');
        out.set(String::from_utf8_lossy(trim(k)).into_owned(), String::from_utf8_lossy(trim(v)).into_owned());
    }
}

fn trim(buf: &[u8]) -> &[u8] {
    let is_ws = |b: &u8| *b == b' ' || *b == b'\t';
    let start = buf.iter().position(|b| !is_ws(b)).unwrap_or(buf.len());
    let end = buf.iter().rposition(|b| !is_ws(b)).map(|i| i + 1).unwrap_or(start);
    &buf[start..end]
}

/// Fast-fail check the reader performs after the first 8 bytes of a header
/// scan: the portion up to the first space must be one of the accepted
/// methods.
pub fn looks_like_known_method(prefix: &[u8]) -> bool {
    const METHODS: &[&[u8]] = &[b"GET", b"HEAD", b"POST", b"PUT", b"DELETE", b"OPTIONS", b"CONNECT", b"TRACE"];
    let up_to_space = match prefix.iter().position(|&b| b == b' ') {
        Some(i) => &prefix[..i],
        None => prefix,
    };
    METHODS.iter().any(|m| starts_with_ignore_case(m, up_to_space) || starts_with_ignore_case(up_to_space, m))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(raw: &[u8]) -> Request {
        parse(raw).expect("expected parse to succeed")
    }

    #[test]
    fn simple_get_parses() {
        let req = parse_ok(b"GET /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n");
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.path, "index.html");
        assert_eq!(req.version, Version { major: 1, minor: 1 });
        assert_eq!(req.host, "example.com");
    }

    #[test]
    fn path_is_stripped_of_surrounding_slashes_and_extension_lowercased() {
        let req = parse_ok(b"GET /a/b/FILE.HTML HTTP/1.1\r\nHost: x\r\n\r\n");
        assert_eq!(req.path, "a/b/FILE.HTML");
        assert_eq!(req.extension, "html");
    }

    #[test]
    fn query_and_fragment_are_split_off() {
        let req = parse_ok(b"GET /p?a=1&b=2&bare#frag HTTP/1.1\r\nHost: x\r\n\r\n");
        assert_eq!(req.path, "p");
        assert_eq!(req.query.get("a"), "1");
        assert_eq!(req.query.get("b"), "2");
        assert_eq!(req.query.get("bare"), "");
        assert_eq!(req.fragment, "frag");
    }

    #[test]
    fn unknown_method_is_rejected() {
        assert!(parse(b"FROB / HTTP/1.1\r\nHost: x\r\n\r\n").is_err());
    }

    #[test]
    fn http_2_major_version_is_rejected() {
        assert!(parse(b"GET / HTTP/2.0\r\nHost: x\r\n\r\n").is_err());
    }

    #[test]
    fn control_byte_in_header_is_rejected() {
        assert!(parse(b"GET / HTTP/1.1\r\nHost: x\x01\r\n\r\n").is_err());
    }

    #[test]
    fn host_without_port_truncates_at_colon() {
        let req = parse_ok(b"GET / HTTP/1.1\r\nHost: example.com:8080\r\n\r\n");
        assert_eq!(req.host_without_port, "example.com");
    }

    #[test]
    fn websocket_upgrade_is_detected() {
        let req = parse_ok(
            b"GET /ws HTTP/1.1\r\nHost: x\r\nConnection: Upgrade\r\nUpgrade: websocket\r\nSec-WebSocket-Version: 13\r\n\r\n",
        );
        assert!(req.is_websocket);
    }

    #[test]
    fn websocket_version_below_13_is_not_an_upgrade() {
        let req = parse_ok(
            b"GET /ws HTTP/1.1\r\nHost: x\r\nConnection: Upgrade\r\nUpgrade: websocket\r\nSec-WebSocket-Version: 8\r\n\r\n",
        );
        assert!(!req.is_websocket);
    }

    #[test]
    fn content_length_failure_to_parse_becomes_zero() {
        let req = parse_ok(b"POST / HTTP/1.1\r\nHost: x\r\nContent-Length: bogus\r\n\r\n");
        assert_eq!(req.content_length, 0);
    }

    #[test]
    fn cookies_are_parsed_into_a_dict() {
        let req = parse_ok(b"GET / HTTP/1.1\r\nHost: x\r\nCookie: a=1; b=2\r\n\r\n");
        assert_eq!(req.cookies.get("a"), "1");
        assert_eq!(req.cookies.get("b"), "2");
    }

    #[test]
    fn method_prefix_fast_fail_check() {
        assert!(looks_like_known_method(b"GET /"));
        assert!(looks_like_known_method(b"POST /x"));
        assert!(!looks_like_known_method(b"FROBNICA"));
    }
}
