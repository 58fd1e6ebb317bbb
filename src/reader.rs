//! The per-connection framed reader.
//!
//! Owns the fixed 16 KiB header-scan buffer and bounds body reads by the
//! declared `Content-Length`. Requests are read as whole header blocks out of
//! a raw byte buffer rather than line-buffered, since the request parser
//! wants the full header block at once; the buffer itself is pooled across
//! connections rather than owned per-connection, to amortize allocation
//! across the lifetime of the process.

use tokio::io::{AsyncReadExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;

use std::sync::Arc;

use crate::error::{HttpError, ProtocolError};
use crate::request::{self, Request};
use crate::shutdown::Shutdown;
use crate::stream::Stream;

pub const HEADER_BUFFER_BYTES: usize = 16 * 1024;

pub struct Reader {
    buf: Box<[u8; HEADER_BUFFER_BYTES]>,
    /// Start of unconsumed bytes within `buf`.
    start: usize,
    /// End of valid bytes within `buf`.
    end: usize,
    stream: Option<ReadHalf<Stream>>,
    secure: bool,
    /// Declared content-length for the current request body; -1 if none.
    length: i64,
    /// Bytes of the current body delivered so far.
    position: i64,
    /// Cancellation signal honored by every suspension point below. A
    /// freshly constructed reader gets its own signal that nothing ever
    /// triggers, so unit tests that build a `Reader` directly don't need to
    /// know about shutdown at all; `start_connection` swaps in the
    /// pipeline's real signal.
    shutdown: Arc<Shutdown>,
    /// Per-stream read timeout, configured by the caller; `None` means no
    /// timeout beyond shutdown.
    timeout: Option<std::time::Duration>,
}

impl Reader {
    pub fn new() -> Self {
        Reader { buf: Box::new([0; HEADER_BUFFER_BYTES]), start: 0, end: 0, stream: None, secure: false, length: -1, position: 0, shutdown: Shutdown::new(), timeout: None }
    }

    /// Resets all per-connection state; called by the pool before handing a
    /// reader to a new connection and also at construction time.
    fn reset(&mut self) {
        self.start = 0;
        self.end = 0;
        self.stream = None;
        self.secure = false;
        self.length = -1;
        self.position = 0;
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn set_timeout(&mut self, timeout: Option<std::time::Duration>) {
        self.timeout = timeout;
    }

    /// Peeks the first bytes of a freshly accepted socket (without consuming
    /// them) and decides whether this is a plaintext or TLS connection,
    /// performing the handshake in the latter case. Returns `Ok(None)` if
    /// the connection should be silently abandoned, or the write half of the
    /// now-established duplex stream (the read half is kept internally).
    pub async fn start_connection(
        &mut self,
        tcp: TcpStream,
        tls_acceptor: Option<&TlsAcceptor>,
        shutdown: &Arc<Shutdown>,
    ) -> Result<Option<WriteHalf<Stream>>, HttpError> {
        self.reset();
        self.shutdown = shutdown.clone();

        let mut peek_buf = [0u8; 3];
        let n = match self.shutdown.race_timeout(self.timeout, tcp.peek(&mut peek_buf)).await {
            Some(Ok(n)) => n,
            Some(Err(_)) | None => return Ok(None),
        };
        if n < 3 {
            return Ok(None);
        }

        let looks_like_tls = peek_buf[0] == 0x16;

        let stream = match (looks_like_tls, tls_acceptor) {
            (true, Some(acceptor)) => match self.shutdown.race_timeout(self.timeout, acceptor.accept(tcp)).await {
                Some(Ok(tls)) => {
                    self.secure = true;
                    Stream::Tls(Box::new(tls))
                }
                Some(Err(_)) | None => return Ok(None),
            },
            (true, None) => return Ok(None), // TLS ClientHello on a plaintext port: reject.
            (false, Some(_)) => return Ok(None), // this listener requires TLS: non-ClientHello aborts.
            (false, None) => Stream::Plain(tcp),
        };

        let (read_half, write_half) = tokio::io::split(stream);
        self.stream = Some(read_half);
        Ok(Some(write_half))
    }

    /// Reads and parses the next request header block. `Ok(None)` means the
    /// connection closed in an orderly fashion (no bytes at all); a protocol
    /// failure means the header was malformed or the buffer overflowed.
    pub async fn read_header(&mut self) -> Result<Option<Request>, HttpError> {
        self.compact();

        loop {
            if let Some(terminator_end) = find_header_terminator(&self.buf[self.start..self.end]) {
                let header_end = self.start + terminator_end;
                let parsed = request::parse(&self.buf[self.start..header_end])?;
                self.start = header_end;
                self.length = parsed.content_length;
                self.position = 0;
                return Ok(Some(parsed));
            }

            if self.end - self.start >= 8 && !request::looks_like_known_method(&self.buf[self.start..self.end]) {
                return Err(ProtocolError::bad_request("unrecognized method").into());
            }

            if self.end == self.buf.len() {
                return Err(ProtocolError::new(431, "request header too large").into());
            }

            let shutdown = self.shutdown.clone();
            let stream = self.stream.as_mut().expect("read_header called before start_connection");
            let n = match shutdown.race_timeout(self.timeout, stream.read(&mut self.buf[self.end..])).await {
                Some(Ok(n)) => n,
                Some(Err(_)) | None => return Err(HttpError::Protocol(ProtocolError::connection_closed())),
            };

            if n == 0 {
                if self.end == self.start {
                    return Ok(None);
                }
                return Err(ProtocolError::bad_request("connection closed mid-header").into());
            }
            self.end += n;
        }
    }

    fn compact(&mut self) {
        if self.start == 0 {
            return;
        }
        self.buf.copy_within(self.start..self.end, 0);
        self.end -= self.start;
        self.start = 0;
    }

    /// The total bytes this will ever deliver for the current request body
    /// is bounded by `length - position`.
    pub async fn read(&mut self, out: &mut [u8]) -> Result<usize, HttpError> {
        if self.length >= 0 {
            let remaining = (self.length - self.position).max(0) as usize;
            if remaining == 0 {
                return Ok(0);
            }
        }

        if self.start < self.end {
            let available = self.end - self.start;
            let n = available.min(out.len());
            out[..n].copy_from_slice(&self.buf[self.start..self.start + n]);
            self.start += n;
            self.position += n as i64;
            return Ok(n);
        }

        let want = if self.length >= 0 { ((self.length - self.position).max(0) as usize).min(out.len()) } else { out.len() };
        if want == 0 {
            return Ok(0);
        }

        let shutdown = self.shutdown.clone();
        let stream = self.stream.as_mut().expect("read called before start_connection");
        let n = match shutdown.race_timeout(self.timeout, stream.read(&mut out[..want])).await {
            Some(Ok(n)) => n,
            Some(Err(_)) | None => return Err(HttpError::Protocol(ProtocolError::connection_closed())),
        };
        self.position += n as i64;
        Ok(n)
    }

    /// Loops `read` until `out` is filled; an EOF mid-fill is a protocol
    /// failure.
    pub async fn read_all(&mut self, out: &mut [u8]) -> Result<(), HttpError> {
        let mut filled = 0;
        while filled < out.len() {
            let n = self.read(&mut out[filled..]).await?;
            if n == 0 {
                return Err(ProtocolError::bad_request("connection closed before body was fully read").into());
            }
            filled += n;
        }
        Ok(())
    }

    pub fn declared_length(&self) -> i64 {
        self.length
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    /// Removes the read half from this reader, for handoff to a WebSocket
    /// frame codec via `Context::accept_websocket`. The reader is left
    /// without a stream and must not be used again until reattached by the
    /// pool.
    pub fn take_stream(&mut self) -> Option<ReadHalf<Stream>> {
        self.stream.take()
    }
}

impl Default for Reader {
    fn default() -> Self {
        Reader::new()
    }
}

fn find_header_terminator(buf: &[u8]) -> Option<usize> {
    crate::bytes_util::find_subsequence(buf, b"\r\n\r\n").map(|i| i + 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminator_search_finds_end_of_header_block() {
        let buf = b"GET / HTTP/1.1\r\nHost: x\r\n\r\nleftover";
        let end = find_header_terminator(buf).unwrap();
        assert_eq!(&buf[end..], b"leftover");
    }

    #[test]
    fn reader_starts_with_no_declared_length() {
        let r = Reader::new();
        assert_eq!(r.declared_length(), -1);
        assert_eq!(r.position(), 0);
    }
}
