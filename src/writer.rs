//! The per-connection framed writer: a thin wrapper over a buffered stream
//! with small write helpers.
//!
//! Enforces the declared response length and serializes the header prefix
//! via a one-shot "pre-write task" -- a pending write of the response
//! header that must complete before any body byte reaches the wire. This
//! indirection exists because the server interleaves header framing with an
//! externally-supplied handler rather than building the whole response in
//! one function: the next call to `write` or `flush` awaits the pending
//! header exactly once before doing anything else.

use std::sync::Arc;

use tokio::io::{AsyncWriteExt, WriteHalf};

use crate::error::{HttpError, ProtocolError};
use crate::shutdown::Shutdown;
use crate::stream::Stream;

const COPY_BUFFER_BYTES: usize = 8 * 1024;

pub struct Writer {
    stream: Option<WriteHalf<Stream>>,
    /// Declared response length for the current response; -1 if undeclared.
    length: i64,
    position: i64,
    /// The serialized response header, queued but not yet written. Taken
    /// and flushed to the wire exactly once, before the first body byte.
    pre_write: Option<Vec<u8>>,
    /// Cancellation signal honored by every write/flush below.
    shutdown: Arc<Shutdown>,
    /// Per-stream write timeout, configured by the caller.
    timeout: Option<std::time::Duration>,
}

impl Writer {
    pub fn new() -> Self {
        Writer { stream: None, length: -1, position: 0, pre_write: None, shutdown: Shutdown::new(), timeout: None }
    }

    pub fn set_timeout(&mut self, timeout: Option<std::time::Duration>) {
        self.timeout = timeout;
    }

    pub fn attach(&mut self, stream: WriteHalf<Stream>, shutdown: Arc<Shutdown>) {
        self.stream = Some(stream);
        self.length = -1;
        self.position = 0;
        self.pre_write = None;
        self.shutdown = shutdown;
    }

    /// Called once per response by the context's header-freeze step.
    pub fn set_pending_header(&mut self, length: i64, header_bytes: Vec<u8>) {
        self.length = length;
        self.position = 0;
        self.pre_write = Some(header_bytes);
    }

    async fn flush_pre_write(&mut self) -> Result<(), HttpError> {
        if let Some(header) = self.pre_write.take() {
            let shutdown = self.shutdown.clone();
            let stream = self.stream.as_mut().expect("writer used before attach");
            match shutdown.race_timeout(self.timeout, stream.write_all(&header)).await {
                Some(Ok(())) => {}
                Some(Err(e)) => return Err(io_to_protocol(e)),
                None => return Err(HttpError::Protocol(ProtocolError::connection_closed())),
            }
        }
        Ok(())
    }

    /// Awaits the pre-write task (serializing the header before any body
    /// byte), then writes `data`. Fails if this write would exceed the
    /// declared length.
    pub async fn write(&mut self, data: &[u8]) -> Result<(), HttpError> {
        self.flush_pre_write().await?;

        if data.is_empty() {
            return Ok(());
        }

        let next_position = self.position + data.len() as i64;
        if self.length >= 0 && next_position > self.length {
            return Err(ProtocolError::new(500, "handler wrote more bytes than its declared Content-Length").into());
        }

        let shutdown = self.shutdown.clone();
        let stream = self.stream.as_mut().expect("writer used before attach");
        match shutdown.race_timeout(self.timeout, stream.write_all(data)).await {
            Some(Ok(())) => {}
            Some(Err(e)) => return Err(io_to_protocol(e)),
            None => return Err(HttpError::Protocol(ProtocolError::connection_closed())),
        }
        self.position = next_position;
        Ok(())
    }

    /// Chunked copy from an async reader, through an 8 KiB buffer.
    pub async fn write_from(&mut self, mut source: impl tokio::io::AsyncRead + Unpin) -> Result<(), HttpError> {
        use tokio::io::AsyncReadExt;
        let mut buf = [0u8; COPY_BUFFER_BYTES];
        loop {
            let n = source.read(&mut buf).await.map_err(HttpError::from)?;
            if n == 0 {
                break;
            }
            self.write(&buf[..n]).await?;
        }
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<(), HttpError> {
        self.flush_pre_write().await?;
        let shutdown = self.shutdown.clone();
        let stream = self.stream.as_mut().expect("writer used before attach");
        match shutdown.race_timeout(self.timeout, stream.flush()).await {
            Some(Ok(())) => Ok(()),
            Some(Err(e)) => Err(io_to_protocol(e)),
            None => Err(HttpError::Protocol(ProtocolError::connection_closed())),
        }
    }

    pub fn declared_length(&self) -> i64 {
        self.length
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    /// Removes the write half from this writer, for handoff to a WebSocket
    /// frame codec.
    pub fn take_stream(&mut self) -> Option<WriteHalf<Stream>> {
        self.stream.take()
    }
}

impl Default for Writer {
    fn default() -> Self {
        Writer::new()
    }
}

fn io_to_protocol(e: std::io::Error) -> HttpError {
    HttpError::Protocol(ProtocolError::new(0, format!("write failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_writer_has_no_declared_length() {
        let w = Writer::new();
        assert_eq!(w.declared_length(), -1);
        assert_eq!(w.position(), 0);
    }
}
