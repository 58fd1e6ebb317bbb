//! Constructing a `rustls::ServerConfig`/`TlsAcceptor` from PEM material.
//!
//! Loading the bytes off disk (`fullchain.pem`, `privatekey.pem`) and binding
//! the listening socket are the launcher's job, out of scope here. What
//! belongs in this module is turning already-loaded PEM bytes into the
//! `TlsAcceptor` the reader's `start_connection` takes.

use std::sync::Arc;

use rustls::{Certificate, PrivateKey, ServerConfig};
use rustls_pemfile::{certs, pkcs8_private_keys, rsa_private_keys};
use tokio_rustls::TlsAcceptor;

use crate::error::{HttpError, ServerError};

/// Builds a `TlsAcceptor` from a PEM certificate chain and a PEM private
/// key (PKCS#8 or RSA, tried in that order). Fails as a server error -- bad
/// TLS material is an operator mistake, not a peer-induced one.
pub fn build_acceptor(cert_chain_pem: &[u8], private_key_pem: &[u8]) -> Result<TlsAcceptor, HttpError> {
    let chain: Vec<Certificate> = certs(&mut std::io::Cursor::new(cert_chain_pem))
        .map_err(|e| ServerError::new(format!("invalid certificate PEM: {}", e), file!(), line!(), "build_acceptor"))?
        .into_iter()
        .map(Certificate)
        .collect();

    if chain.is_empty() {
        return Err(ServerError::new("certificate PEM contained no certificates", file!(), line!(), "build_acceptor").into());
    }

    let key = load_private_key(private_key_pem)?;

    let config = ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(chain, key)
        .map_err(|e| ServerError::new(format!("invalid TLS key/certificate pair: {}", e), file!(), line!(), "build_acceptor"))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn load_private_key(pem: &[u8]) -> Result<PrivateKey, HttpError> {
    let mut cursor = std::io::Cursor::new(pem);
    let pkcs8 = pkcs8_private_keys(&mut cursor).unwrap_or_default();
    if let Some(key) = pkcs8.into_iter().next() {
        return Ok(PrivateKey(key));
    }

    let mut cursor = std::io::Cursor::new(pem);
    let rsa = rsa_private_keys(&mut cursor).unwrap_or_default();
    if let Some(key) = rsa.into_iter().next() {
        return Ok(PrivateKey(key));
    }

    Err(ServerError::new("private key PEM contained no PKCS#8 or RSA key", file!(), line!(), "load_private_key").into())
}
