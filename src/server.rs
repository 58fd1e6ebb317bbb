//! The connection pipeline: accept loop, the reader pool, and the
//! per-connection state machine
//! `ACCEPT → START → WAIT_HEADER → SERVE_BODY → VALIDATE → {LOOP | CLOSE}`.
//!
//! Ties the other modules together in a "leaf modules feed into one
//! orchestrator" role: the orchestrator owns the accept loop, the overload
//! guard, and the reader pool, since a single long-running process serves
//! every connection concurrently via `tokio::spawn`.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

use crate::context::Context;
use crate::error::{HttpError, ServerError};
use crate::handler::Handler;
use crate::log::Logger;
use crate::reader::Reader;
use crate::response::Response;
use crate::shutdown::Shutdown;
use crate::stats::Statistics;
use crate::writer::Writer;

/// Default overload guard threshold.
pub const DEFAULT_MAX_CONNECTIONS: i64 = 10_000;

/// A LIFO free-list of readers, guarded by a single mutex; unbounded, grows
/// to peak concurrency. The buffer inside a pooled reader is untouched
/// while pooled.
struct ReaderPool {
    pool: Mutex<Vec<Reader>>,
}

impl ReaderPool {
    fn new() -> Self {
        ReaderPool { pool: Mutex::new(Vec::new()) }
    }

    fn acquire(&self, stats: &Statistics) -> Reader {
        let popped = self.pool.lock().unwrap().pop();
        match popped {
            Some(reader) => {
                stats.buffer_unpooled();
                reader
            }
            None => Reader::new(),
        }
    }

    fn release(&self, reader: Reader, stats: &Statistics) {
        self.pool.lock().unwrap().push(reader);
        stats.buffer_pooled();
    }
}

pub struct Server {
    handler: Handler,
    tls_acceptor: Option<TlsAcceptor>,
    max_connections: i64,
    logger: std::sync::Arc<Logger>,
    stats: std::sync::Arc<Statistics>,
    reader_pool: ReaderPool,
    shutdown: Arc<Shutdown>,
}

impl Server {
    pub fn new(handler: Handler, tls_acceptor: Option<TlsAcceptor>, logger: std::sync::Arc<Logger>, stats: std::sync::Arc<Statistics>) -> Self {
        Server { handler, tls_acceptor, max_connections: DEFAULT_MAX_CONNECTIONS, logger, stats, reader_pool: ReaderPool::new(), shutdown: Shutdown::new() }
    }

    pub fn set_max_connections(&mut self, max_connections: i64) {
        self.max_connections = max_connections;
    }

    /// A handle the launcher can use to trigger shutdown (e.g. on Ctrl-C);
    /// triggering it unblocks every suspension point across every
    /// connection currently in flight.
    pub fn shutdown_handle(&self) -> Arc<Shutdown> {
        self.shutdown.clone()
    }

    /// Accepts connections forever, spawning one task per connection. The
    /// launcher owns the listener (binding ports is out of scope here); this
    /// just drives it. Returns once shutdown is triggered.
    pub async fn accept_loop(self: std::sync::Arc<Self>, listener: TcpListener) -> std::io::Result<()> {
        loop {
            let accepted = match self.shutdown.race(listener.accept()).await {
                Some(result) => result?,
                None => return Ok(()),
            };
            let (tcp, _peer) = accepted;

            if self.stats.alive_connections() >= self.max_connections {
                // Overload guard: close immediately without reading a byte.
                drop(tcp);
                continue;
            }

            let server = self.clone();
            tokio::spawn(async move {
                server.handle_connection(tcp).await;
            });
        }
    }

    async fn handle_connection(&self, tcp: TcpStream) {
        self.stats.connection_opened();
        self.stats.record_connect();

        if let Err(e) = self.drive_connection(tcp).await {
            self.logger.debug(format!("connection ended: {}", e), None);
        }

        self.stats.connection_closed();
    }

    async fn drive_connection(&self, tcp: TcpStream) -> Result<(), HttpError> {
        let remote_addr = tcp.peer_addr().map_err(HttpError::from)?;
        let local_addr = tcp.local_addr().map_err(HttpError::from)?;

        let mut reader = self.reader_pool.acquire(&self.stats);
        let mut writer = Writer::new();

        let outcome = self.serve(&mut reader, &mut writer, tcp, remote_addr, local_addr).await;

        self.reader_pool.release(reader, &self.stats);
        outcome
    }

    /// START through the keep-alive LOOP, for one connection.
    async fn serve(
        &self,
        reader: &mut Reader,
        writer: &mut Writer,
        tcp: TcpStream,
        remote_addr: SocketAddr,
        local_addr: SocketAddr,
    ) -> Result<(), HttpError> {
        let write_half = match reader.start_connection(tcp, self.tls_acceptor.as_ref(), &self.shutdown).await {
            Ok(Some(w)) => w,
            Ok(None) => return Ok(()),
            Err(_) => return Ok(()),
        };
        writer.attach(write_half, self.shutdown.clone());
        let secure = reader.is_secure();

        loop {
            self.stats.enter_waiting_for_header();
            let header_result = reader.read_header().await;
            self.stats.leave_waiting_for_header();

            let request = match header_result {
                Ok(Some(r)) => r,
                Ok(None) => return Ok(()),
                // WAIT_HEADER -> CLOSE: a line the peer can still be told
                // about gets a best-effort reply before the connection
                // drops; a connection that's simply gone does not.
                Err(HttpError::Protocol(e)) if !e.is_connection_closed() => {
                    let _ = write_bare_error(writer, e.status, e.message.as_bytes()).await;
                    return Ok(());
                }
                Err(_) => return Ok(()),
            };

            self.stats.record_hit();
            self.stats.enter_serving_http_body();
            let step = self.serve_one_request(reader, writer, request, remote_addr, local_addr, secure).await;
            self.stats.leave_serving_http_body();

            match step? {
                true => continue,
                false => return Ok(()),
            }
        }
    }

    /// SERVE_BODY and VALIDATE for a single request. Returns whether the
    /// pipeline should LOOP for another request on this connection.
    async fn serve_one_request(
        &self,
        reader: &mut Reader,
        writer: &mut Writer,
        request: crate::request::Request,
        remote_addr: SocketAddr,
        local_addr: SocketAddr,
        secure: bool,
    ) -> Result<bool, HttpError> {
        let mut ctx = Context::new(request, reader, writer, remote_addr, local_addr, secure);

        let handler_result = (self.handler)(&mut ctx).await;

        let outcome = match handler_result {
            Ok(()) if ctx.header_sent() => Ok(()),
            Ok(()) => Err(HttpError::from(ServerError::new(
                "handler returned without sending a response",
                file!(),
                line!(),
                "serve_one_request",
            ))),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {}
            Err(HttpError::Protocol(e)) => {
                self.logger.debug(format!("protocol error: {}", e.message), None);
                if !ctx.header_sent() {
                    let status = if e.status == 0 { 400 } else { e.status };
                    let _ = ctx.send_response(status, "Error", e.message.as_bytes()).await;
                }
                return Ok(false);
            }
            Err(HttpError::Server(e)) => {
                let location = format!("{}:{} in {}", e.file, e.line, e.function);
                self.logger.error(format!("{}", e), Some(location));
                if !ctx.header_sent() {
                    let _ = ctx
                        .send_response(500, "Internal Server Error", b"There was a server error. It has been logged and we are looking into it.")
                        .await;
                } else {
                    return Ok(false);
                }
            }
        }

        let websocket_accepted = ctx.websocket_accepted();
        let keep_alive = ctx.response().connection == "keep-alive";
        let response_content_length = ctx.response().content_length.unwrap_or(0);
        let request_content_length = ctx.request.content_length.max(0);
        drop(ctx);

        if websocket_accepted {
            self.stats.enter_serving_websocket();
            return Ok(false);
        }

        // VALIDATE
        if reader.position() != request_content_length || writer.position() != response_content_length {
            return Err(ServerError::new("request/response framing did not balance", file!(), line!(), "serve_one_request").with_trace().into());
        }

        Ok(keep_alive)
    }
}

/// Writes a complete, self-contained response directly on `writer`, with no
/// `Context`/`Request` in hand -- used when a request line fails to parse,
/// so there's no request to build one from. Always closes the connection.
async fn write_bare_error(writer: &mut Writer, status: u16, body: &[u8]) -> Result<(), HttpError> {
    let status = if status == 0 { 400 } else { status };
    let mut response = Response::new();
    response.set_status(status, status_message(status));
    response.content_length = Some(body.len() as i64);
    response.connection = "close".to_string();
    let header_bytes = response.serialize_header(1, 1);
    writer.set_pending_header(body.len() as i64, header_bytes);
    writer.write(body).await?;
    writer.flush().await
}

/// Used by the redirector and the static-file server alike: status-line
/// message for a bare protocol-failure reply that never reached the
/// handler.
pub fn status_message(status: u16) -> &'static str {
    match status {
        301 => "Moved Permanently",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        411 => "Length Required",
        413 => "Payload Too Large",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        _ => "Error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_message_covers_common_codes() {
        assert_eq!(status_message(404), "Not Found");
        assert_eq!(status_message(200), "Error");
    }
}
