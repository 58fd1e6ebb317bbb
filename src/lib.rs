//! `hearthd`: a small, self-contained HTTP/1.1 server core.
//!
//! Covers the connection pipeline -- the per-connection state machine that
//! reads requests, drives a user-supplied [`handler::Handler`], enforces the
//! framing invariants of persistent connections, and recycles buffers -- and
//! the static-file subsystem built on top of it (cache coherence with the
//! filesystem, gzip/brotli compression variants, a minimal `#include`
//! template directive, safe path resolution).
//!
//! Out of scope: binding listening sockets, loading TLS material off disk,
//! command-line argument parsing, and the JSON admin endpoints that
//! serialize [`stats::Statistics`]/[`log::Logger`] snapshots. Those are a
//! launcher's job; see `main.rs` for a minimal one.

pub mod bytes_util;
pub mod context;
pub mod dict;
pub mod error;
pub mod filetype;
pub mod handler;
pub mod log;
pub mod path;
pub mod reader;
pub mod redirect;
pub mod request;
pub mod response;
pub mod server;
pub mod shutdown;
pub mod static_files;
pub mod stats;
pub mod stream;
pub mod tls;
pub mod websocket;
pub mod writer;

pub use context::Context;
pub use error::{HttpError, ProtocolError, Result, ServerError};
pub use handler::{handler, Handler};
pub use log::{Level, Logger};
pub use redirect::Redirector;
pub use server::Server;
pub use static_files::StaticFileServer;
pub use stats::{Statistics, StatisticsSnapshot};
