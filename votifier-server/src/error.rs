//! Server error types.

use crate::config::ConfigError;
use crate::keys::KeyStoreError;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use votifier_protocol::ErrorKind;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("peer timed out after {0:?}")]
    Timeout(Duration),

    #[error("protocol error: {0}")]
    Protocol(#[from] votifier_protocol::ProtocolError),

    #[error("key store error: {0}")]
    KeyStore(#[from] KeyStoreError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("server shutting down")]
    ShuttingDown,
}

impl ServerError {
    /// Returns a stable label for logs and statistics.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerError::Bind { .. } => "BIND_ERROR",
            ServerError::Io(_) => "IO_ERROR",
            ServerError::Timeout(_) => "TIMEOUT",
            ServerError::Protocol(e) => match e.kind() {
                ErrorKind::Decrypt => "DECRYPT_ERROR",
                ErrorKind::Malformed => "PROTOCOL_ERROR",
                ErrorKind::Crypto => "CRYPTO_ERROR",
            },
            ServerError::KeyStore(e) if e.is_crypto() => "CRYPTO_ERROR",
            ServerError::KeyStore(_) => "IO_ERROR",
            ServerError::Config(_) => "CONFIG_ERROR",
            ServerError::ShuttingDown => "SHUTTING_DOWN",
        }
    }
}
