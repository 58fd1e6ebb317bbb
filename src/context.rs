//! Binds one request/response pair to its connection: the glue between the
//! reader, the writer, the remote/local endpoints, and the TLS flag.
//!
//! Enforces a header-freeze-then-write discipline: headers (content-type,
//! encoding, etc.) are always written before any body byte, and never
//! revisited afterward. `Context` makes that discipline explicit and
//! enforceable instead of implicit in call order.

use std::net::SocketAddr;

use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::error::{HttpError, ProtocolError};
use crate::reader::Reader;
use crate::request::Request;
use crate::response::Response;
use crate::websocket::{self, WebSocketStream};
use crate::writer::Writer;

pub struct Context<'a> {
    pub request: Request,
    response: Response,
    reader: &'a mut Reader,
    writer: &'a mut Writer,
    pub remote_addr: SocketAddr,
    pub local_addr: SocketAddr,
    pub secure: bool,
    frozen: bool,
    websocket_accepted: bool,
}

impl<'a> Context<'a> {
    pub fn new(request: Request, reader: &'a mut Reader, writer: &'a mut Writer, remote_addr: SocketAddr, local_addr: SocketAddr, secure: bool) -> Self {
        Context { request, response: Response::new(), reader, writer, remote_addr, local_addr, secure, frozen: false, websocket_accepted: false }
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn header_sent(&self) -> bool {
        self.frozen
    }

    pub fn websocket_accepted(&self) -> bool {
        self.websocket_accepted
    }

    /// Mutates the response, failing if headers have already been frozen.
    pub fn with_response_mut(&mut self, f: impl FnOnce(&mut Response)) -> Result<(), HttpError> {
        if self.frozen {
            return Err(ProtocolError::new(500, "response headers already frozen").into());
        }
        f(&mut self.response);
        Ok(())
    }

    /// Freezes the response headers: fixes content-length, auto-chooses the
    /// `Connection` directive, serializes the header, and queues it on the
    /// writer as its pre-write task. Idempotent only when the previously
    /// frozen length matches; otherwise fails.
    fn freeze_headers(&mut self, content_length: i64) -> Result<(), HttpError> {
        if self.frozen {
            let existing = self.response.content_length.unwrap_or(0);
            if existing != content_length {
                return Err(ProtocolError::new(500, "content-length cannot change after headers are frozen").into());
            }
            return Ok(());
        }

        self.response.content_length = Some(content_length);

        if self.response.connection.is_empty() {
            let client_wants_keep_alive = self.request.connection.contains("keep-alive");
            let client_wants_close = self.request.connection.contains("close");
            let is_1_1 = self.request.version.minor >= 1;
            self.response.connection = if client_wants_keep_alive || (is_1_1 && !client_wants_close) {
                "keep-alive".to_string()
            } else {
                "close".to_string()
            };
        }

        let header_bytes = self.response.serialize_header(self.request.version.major, self.request.version.minor);
        self.writer.set_pending_header(content_length, header_bytes);
        self.response.header_sent = true;
        self.frozen = true;
        Ok(())
    }

    /// Freezes headers (setting content-length to `max(0, current)` if
    /// unset) and returns the reader.
    pub fn get_reader(&mut self) -> Result<&mut Reader, HttpError> {
        if !self.frozen {
            let length = self.response.content_length.unwrap_or(0).max(0);
            self.freeze_headers(length)?;
        }
        Ok(self.reader)
    }

    /// Freezes headers, requiring `content_length >= 0` and that it match
    /// any previously set length.
    pub fn get_writer(&mut self, content_length: i64) -> Result<&mut Writer, HttpError> {
        if content_length < 0 {
            return Err(ProtocolError::new(500, "content-length must be non-negative").into());
        }
        self.freeze_headers(content_length)?;
        Ok(self.writer)
    }

    /// Valid only if the request is a WebSocket request, headers haven't
    /// been sent, and this context hasn't already accepted one. Writes the
    /// 101 handshake response directly (bypassing the normal
    /// length-framed path -- a WebSocket response has no Content-Length)
    /// and hands the raw duplex stream off to the caller for an external
    /// frame codec to drive.
    pub async fn accept_websocket(&mut self, protocol: Option<&str>) -> Result<WebSocketStream, HttpError> {
        if !self.request.is_websocket {
            return Err(ProtocolError::bad_request("not a websocket upgrade request").into());
        }
        if self.frozen || self.websocket_accepted {
            return Err(ProtocolError::new(500, "response already sent").into());
        }

        let client_key = self.request.headers.get("sec-websocket-key");
        if client_key.is_empty() {
            return Err(ProtocolError::bad_request("missing Sec-WebSocket-Key").into());
        }

        let response = websocket::build_handshake_response(client_key, protocol);
        self.writer.set_pending_header(-1, response);
        self.writer.flush().await?;

        self.frozen = true;
        self.websocket_accepted = true;
        self.response.header_sent = true;

        let read_half = self.reader.take_stream().ok_or_else(|| ProtocolError::new(500, "reader stream already taken"))?;
        let write_half = self.writer.take_stream().ok_or_else(|| ProtocolError::new(500, "writer stream already taken"))?;
        Ok(tokio::io::join(read_half, write_half))
    }

    /// Convenience: sets length to the payload size, freezes headers, and
    /// writes the payload in one call.
    pub async fn send_response(&mut self, status: u16, message: &str, body: &[u8]) -> Result<(), HttpError> {
        self.with_response_mut(|r| r.set_status(status, message))?;
        let writer = self.get_writer(body.len() as i64)?;
        writer.write(body).await?;
        writer.flush().await
    }

    pub async fn send_bytes(&mut self, body: &[u8]) -> Result<(), HttpError> {
        let writer = self.get_writer(body.len() as i64)?;
        writer.write(body).await?;
        writer.flush().await
    }

    /// Opens the file at `path`; 404 if absent; otherwise writes
    /// length-declared content streamed from the file.
    pub async fn send_file(&mut self, path: &std::path::Path) -> Result<(), HttpError> {
        let file = match File::open(path).await {
            Ok(f) => f,
            Err(_) => return self.send_response(404, "Not Found", b"not found").await,
        };
        let length = file.metadata().await.map_err(HttpError::from)?.len() as i64;
        let writer = self.get_writer(length)?;
        writer.write_from(file).await?;
        writer.flush().await
    }

    /// Requires the request to declare a content-length in `[0,
    /// max_length]`; reads exactly that many bytes.
    pub async fn read_content(&mut self, max_length: usize) -> Result<Vec<u8>, HttpError> {
        let declared = self.request.content_length;
        if declared < 0 {
            return Err(ProtocolError::new(411, "Content-Length required").into());
        }
        if declared as usize > max_length {
            return Err(ProtocolError::new(413, "request body too large").into());
        }

        let reader = self.get_reader()?;
        let mut buf = vec![0u8; declared as usize];
        reader.read_all(&mut buf).await?;
        Ok(buf)
    }
}

/// Reads an entire async source into a `Vec<u8>`; used by the static-file
/// server when it needs to buffer a small included file during template
/// expansion rather than stream it.
pub async fn read_to_vec(mut source: impl tokio::io::AsyncRead + Unpin) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    source.read_to_end(&mut out).await?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Method, Version};
    use std::net::{IpAddr, Ipv4Addr};

    fn sample_request() -> Request {
        Request {
            method: Method::Get,
            version: Version { major: 1, minor: 1 },
            path: "x".to_string(),
            path_lower: "x".to_string(),
            extension: String::new(),
            fragment: String::new(),
            query: crate::dict::HttpDict::new(),
            cookies: crate::dict::HttpDict::new(),
            host: "example.com".to_string(),
            host_without_port: "example.com".to_string(),
            connection: String::new(),
            referer: String::new(),
            accept_encoding: String::new(),
            content_length: -1,
            headers: crate::dict::HttpDict::new(),
            is_websocket: false,
        }
    }

    #[test]
    fn freeze_headers_chooses_keep_alive_for_http11_by_default() {
        let mut reader = Reader::new();
        let mut writer = Writer::new();
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let mut ctx = Context::new(sample_request(), &mut reader, &mut writer, addr, addr, false);
        ctx.freeze_headers(3).unwrap();
        assert_eq!(ctx.response().connection, "keep-alive");
    }

    #[test]
    fn freeze_headers_respects_explicit_close() {
        let mut req = sample_request();
        req.connection = "close".to_string();
        let mut reader = Reader::new();
        let mut writer = Writer::new();
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let mut ctx = Context::new(req, &mut reader, &mut writer, addr, addr, false);
        ctx.freeze_headers(0).unwrap();
        assert_eq!(ctx.response().connection, "close");
    }

    #[test]
    fn mutating_response_after_freeze_fails() {
        let mut reader = Reader::new();
        let mut writer = Writer::new();
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let mut ctx = Context::new(sample_request(), &mut reader, &mut writer, addr, addr, false);
        ctx.freeze_headers(0).unwrap();
        let result = ctx.with_response_mut(|r| r.set_status(404, "Not Found"));
        assert!(result.is_err());
    }
}
