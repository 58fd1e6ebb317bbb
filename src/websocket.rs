//! The WebSocket upgrade handoff point.
//!
//! Only detection and the handshake handoff live here; the frame codec
//! itself is an external collaborator. The accept-key computation is the
//! RFC 6455 §1.3 recipe: SHA-1 over the client key concatenated with the
//! fixed GUID, then base64-encoded.

use base64::Engine;
use sha1::{Digest, Sha1};
use tokio::io::Join;

use crate::stream::Stream;

const WEBSOCKET_GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The duplex stream handed off to an external WebSocket frame codec, once
/// the 101 response has been written. Combines the reader's read half and
/// the writer's write half back into a single `AsyncRead + AsyncWrite`
/// value.
pub type WebSocketStream = Join<tokio::io::ReadHalf<Stream>, tokio::io::WriteHalf<Stream>>;

pub fn compute_accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WEBSOCKET_GUID);
    let digest = hasher.finalize();
    base64::engine::general_purpose::STANDARD.encode(digest)
}

/// Builds the `101 Switching Protocols` response bytes for a validated
/// WebSocket upgrade request.
pub fn build_handshake_response(client_key: &str, protocol: Option<&str>) -> Vec<u8> {
    let accept = compute_accept_key(client_key);
    let mut out = Vec::new();
    out.extend_from_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
    out.extend_from_slice(b"Upgrade: websocket\r\n");
    out.extend_from_slice(b"Connection: Upgrade\r\n");
    out.extend_from_slice(format!("Sec-WebSocket-Accept: {}\r\n", accept).as_bytes());
    if let Some(p) = protocol {
        out.extend_from_slice(format!("Sec-WebSocket-Protocol: {}\r\n", p).as_bytes());
    }
    out.extend_from_slice(b"\r\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_key_matches_rfc6455_example() {
        // The example key/accept pair from RFC 6455 §1.3.
        let accept = compute_accept_key("dGhlIHNhbXBsZSBub25jZQ==");
        assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn handshake_response_includes_protocol_when_given() {
        let bytes = build_handshake_response("dGhlIHNhbXBsZSBub25jZQ==", Some("chat"));
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(text.contains("Sec-WebSocket-Protocol: chat\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }
}
