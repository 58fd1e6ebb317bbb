//! End-to-end pipeline scenarios driven over a real loopback socket, since
//! these exercise the accept loop, the reader/writer pair, and the
//! static-file server together rather than any one module in isolation.

use std::io::Write as _;
use std::net::TcpStream as StdTcpStream;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use hearthd::{handler, Logger, Redirector, Server, StaticFileServer, Statistics};

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn unique_temp_dir() -> PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("hearthd-test-{}-{}", std::process::id(), n));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

async fn spawn_static_server(root: PathBuf) -> std::net::SocketAddr {
    let logger = Arc::new(Logger::default());
    let stats = Arc::new(Statistics::new());
    let static_files = Arc::new(StaticFileServer::new(root, logger.clone()));

    let composed = handler(move |ctx| {
        let static_files = static_files.clone();
        async move { static_files.handle(ctx).await }
    });

    let server = Arc::new(Server::new(composed, None, logger, stats));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let _ = server.accept_loop(listener).await;
    });

    addr
}

/// Sends a raw request over a fresh connection and reads until the peer
/// closes or `read_deadline` elapses, returning everything read so far.
async fn request_once(addr: std::net::SocketAddr, raw_request: &str) -> String {
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw_request.as_bytes()).await.unwrap();
    stream.shutdown().await.ok();

    let mut buf = Vec::new();
    let _ = tokio::time::timeout(std::time::Duration::from_secs(2), stream.read_to_end(&mut buf)).await;
    String::from_utf8_lossy(&buf).into_owned()
}

#[tokio::test]
async fn s1_serves_a_plain_file_with_correct_headers_and_body() {
    let root = unique_temp_dir();
    std::fs::write(root.join("index.html"), "hi").unwrap();

    let addr = spawn_static_server(root).await;
    let response = request_once(addr, "GET /index.html HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;

    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains("Content-Type: text/html"));
    assert!(response.contains("Content-Length: 2"));
    assert!(response.ends_with("hi"));
}

#[tokio::test]
async fn s2_path_traversal_is_rejected_with_400() {
    let root = unique_temp_dir();
    let addr = spawn_static_server(root).await;
    let response = request_once(addr, "GET /../etc/passwd HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;

    assert!(response.starts_with("HTTP/1.1 400"));
    assert!(response.contains("File name is invalid"));
}

#[tokio::test]
async fn s3_non_get_method_is_rejected_with_405() {
    let root = unique_temp_dir();
    std::fs::write(root.join("x"), "body").unwrap();
    let addr = spawn_static_server(root).await;
    let response = request_once(addr, "POST /x HTTP/1.1\r\nHost: x\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;

    assert!(response.starts_with("HTTP/1.1 405"));
    assert!(response.contains("Only GET method is allowed"));
}

#[tokio::test]
async fn s4_tiny_file_is_served_uncompressed_even_when_gzip_is_accepted() {
    let root = unique_temp_dir();
    std::fs::write(root.join("index.html"), "X").unwrap();
    let addr = spawn_static_server(root).await;
    let response = request_once(addr, "GET / HTTP/1.1\r\nHost: x\r\nAccept-Encoding: gzip\r\nConnection: close\r\n\r\n").await;

    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(!response.contains("Content-Encoding: gzip"));
    assert!(response.ends_with("X"));
}

#[tokio::test]
async fn unrecognized_method_gets_a_400_reply_before_the_connection_closes() {
    let root = unique_temp_dir();
    let addr = spawn_static_server(root).await;
    let response = request_once(addr, "FROBNICATE / HTTP/1.1\r\nHost: x\r\n\r\n").await;

    assert!(response.starts_with("HTTP/1.1 400"));
    assert!(response.contains("Connection: close"));
}

#[tokio::test]
async fn s7_keep_alive_serves_two_requests_on_one_connection_in_order() {
    let root = unique_temp_dir();
    std::fs::write(root.join("a.txt"), "A").unwrap();
    let addr = spawn_static_server(root).await;

    // std::net here rather than tokio::net: we want a blocking write/read
    // interleaving that's simple to reason about across two pipelined
    // requests on one socket.
    let mut stream = StdTcpStream::connect(addr).unwrap();
    stream.write_all(b"GET /a.txt HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
    stream.write_all(b"GET /a.txt HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").unwrap();

    use std::io::Read;
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).unwrap();
    let text = String::from_utf8_lossy(&buf);

    let occurrences = text.matches("HTTP/1.1 200").count();
    assert_eq!(occurrences, 2);
    assert_eq!(text.matches("Content-Length: 1").count(), 2);
    assert_eq!(text.matches('A').count(), 2);
}

#[tokio::test]
async fn cache_serves_updated_bytes_after_mtime_changes() {
    let root = unique_temp_dir();
    let path = root.join("a.txt");
    std::fs::write(&path, "first").unwrap();

    let addr = spawn_static_server(root).await;
    let first = request_once(addr, "GET /a.txt HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;
    assert!(first.ends_with("first"));

    // Ensure a distinct mtime, then rewrite.
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    std::fs::write(&path, "second!").unwrap();

    let second = request_once(addr, "GET /a.txt HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;
    assert!(second.ends_with("second!"));
}

#[tokio::test]
async fn missing_file_is_a_404() {
    let root = unique_temp_dir();
    let addr = spawn_static_server(root).await;
    let response = request_once(addr, "GET /nope.html HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 404"));
}

#[tokio::test]
async fn redirect_upgrade_insecure_beats_static_files_on_port_80_equivalent() {
    // The redirector composed ahead of the static-file server should win
    // regardless of whether a matching static file exists.
    let root = unique_temp_dir();
    std::fs::write(root.join("foo"), "should not be served").unwrap();

    let logger = Arc::new(Logger::default());
    let stats = Arc::new(Statistics::new());
    let redirector = Arc::new(Redirector::new(false));
    redirector.insert("foo", "/bar");
    let static_files = Arc::new(StaticFileServer::new(root, logger.clone()));

    let composed = handler(move |ctx| {
        let redirector = redirector.clone();
        let static_files = static_files.clone();
        async move {
            if redirector.handle(ctx).await? {
                return Ok(());
            }
            static_files.handle(ctx).await
        }
    });

    let server = Arc::new(Server::new(composed, None, logger, stats));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.accept_loop(listener).await;
    });

    let response = request_once(addr, "GET /foo HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 301"));
    assert!(response.contains("Location: /bar"));
}
