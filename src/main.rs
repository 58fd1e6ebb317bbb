//! The launcher: binding listening sockets, loading TLS material and
//! `redirects.txt` off disk, composing the redirector and static-file server
//! into one handler, and wiring `Ctrl-C` to the server's shutdown handle.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;

use hearthd::{handler, Logger, Redirector, Server, StaticFileServer, Statistics};

const PLAINTEXT_PORT: u16 = 80;
const TLS_PORT: u16 = 443;

#[tokio::main]
async fn main() {
    let root = env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));

    let logger = Arc::new(Logger::default());
    let stats = Arc::new(Statistics::new());

    let redirector = Arc::new(Redirector::new(env::var("UPGRADE_INSECURE").is_ok()));
    load_redirects(&root.join("redirects.txt"), &redirector, &logger).await;

    let static_files = Arc::new(StaticFileServer::new(root.join("htdocs"), logger.clone()));

    let composed = {
        let redirector = redirector.clone();
        let static_files = static_files.clone();
        handler(move |ctx| {
            let redirector = redirector.clone();
            let static_files = static_files.clone();
            async move {
                if redirector.handle(ctx).await? {
                    return Ok(());
                }
                static_files.handle(ctx).await
            }
        })
    };

    let plaintext_server = Arc::new(Server::new(composed, None, logger.clone(), stats.clone()));

    let tls_acceptor = load_tls(&root).await;

    let mut tasks = Vec::new();

    match TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], PLAINTEXT_PORT))).await {
        Ok(listener) => {
            let server = plaintext_server.clone();
            tasks.push(tokio::spawn(async move {
                let _ = server.accept_loop(listener).await;
            }));
        }
        Err(e) => logger.error(format!("failed to bind plaintext port {}: {}", PLAINTEXT_PORT, e), None),
    }

    let mut shutdown_handles = vec![plaintext_server.shutdown_handle()];

    if let Some(acceptor) = tls_acceptor {
        let redirector = redirector.clone();
        let static_files = static_files.clone();
        let tls_composed = handler(move |ctx| {
            let redirector = redirector.clone();
            let static_files = static_files.clone();
            async move {
                if redirector.handle(ctx).await? {
                    return Ok(());
                }
                static_files.handle(ctx).await
            }
        });

        let tls_server = Arc::new(Server::new(tls_composed, Some(acceptor), logger.clone(), stats.clone()));
        shutdown_handles.push(tls_server.shutdown_handle());

        match TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], TLS_PORT))).await {
            Ok(listener) => {
                tasks.push(tokio::spawn(async move {
                    let _ = tls_server.accept_loop(listener).await;
                }));
            }
            Err(e) => logger.error(format!("failed to bind TLS port {}: {}", TLS_PORT, e), None),
        }
    } else {
        logger.info("no TLS material found; serving plaintext only".to_string());
    }

    logger.info(format!("hearthd serving {} on port {}", root.display(), PLAINTEXT_PORT));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            logger.info("shutdown signal received".to_string());
            for h in &shutdown_handles {
                h.trigger();
            }
        }
    }

    for task in tasks {
        let _ = task.await;
    }
}

/// Loads TLS material from `root/fullchain.pem` and `root/privatekey.pem`;
/// missing files mean plaintext-only operation, not an error.
async fn load_tls(root: &std::path::Path) -> Option<tokio_rustls::TlsAcceptor> {
    let cert_path = root.join("fullchain.pem");
    let key_path = root.join("privatekey.pem");

    let cert = tokio::fs::read(&cert_path).await.ok()?;
    let key = tokio::fs::read(&key_path).await.ok()?;

    hearthd::tls::build_acceptor(&cert, &key).ok()
}

/// Parses `redirects.txt`: one `source dest` pair per whitespace-separated
/// line. Malformed lines are logged and skipped.
async fn load_redirects(path: &std::path::Path, redirector: &Redirector, logger: &Logger) {
    let Ok(contents) = tokio::fs::read_to_string(path).await else {
        return;
    };

    for (lineno, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut parts = line.split_whitespace();
        let (Some(source), Some(dest), None) = (parts.next(), parts.next(), parts.next()) else {
            logger.error(format!("redirects.txt:{}: expected exactly two fields", lineno + 1), None);
            continue;
        };

        if source.starts_with('/') || source.ends_with('/') || !dest.starts_with('/') {
            logger.error(format!("redirects.txt:{}: malformed redirect entry", lineno + 1), None);
            continue;
        }

        redirector.insert(source, dest);
    }
}
