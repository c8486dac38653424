//! Vote sender.

use crate::error::ClientError;
use rsa::RsaPublicKey;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use votifier_protocol::{Vote, VoteEncoder};

/// Longest greeting line accepted from a server, newline excluded.
pub const MAX_GREETING_LEN: usize = 128;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address.
    pub addr: SocketAddr,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Timeout for reading the greeting and for writing the vote.
    pub io_timeout: Duration,
}

impl ClientConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: Duration::from_secs(10),
            io_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }
}

/// Result of a delivered vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    /// Version advertised in the server's greeting.
    pub server_version: String,
}

/// Sends votes to one receiver.
///
/// The receiver never acknowledges a vote, so a successful send only means
/// the block was written after a valid greeting.
#[derive(Debug, Clone)]
pub struct VoteClient {
    config: ClientConfig,
    encoder: VoteEncoder,
}

impl VoteClient {
    pub fn new(config: ClientConfig, public_key: RsaPublicKey) -> Self {
        Self {
            config,
            encoder: VoteEncoder::new(public_key),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Sends one vote on a fresh connection.
    pub async fn send(&self, vote: &Vote) -> Result<SendReceipt, ClientError> {
        let block = self.encoder.encrypt(vote)?;

        tracing::debug!("Connecting to {}...", self.config.addr);
        let mut stream = tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect(self.config.addr),
        )
        .await
        .map_err(|_| {
            tracing::debug!("Connection timeout");
            ClientError::Timeout
        })?
        .map_err(|e| {
            tracing::debug!("Connection failed: {}", e);
            ClientError::Io(e)
        })?;
        stream.set_nodelay(true).ok();

        let line = tokio::time::timeout(self.config.io_timeout, read_greeting(&mut stream))
            .await
            .map_err(|_| ClientError::Timeout)??;
        let server_version = votifier_protocol::parse_greeting(&line)
            .map_err(|e| ClientError::Handshake(e.to_string()))?
            .to_string();
        tracing::debug!("Server greeting: version {}", server_version);

        tokio::time::timeout(self.config.io_timeout, async {
            stream.write_all(&block).await?;
            stream.shutdown().await
        })
        .await
        .map_err(|_| ClientError::Timeout)??;

        tracing::debug!("Sent {} byte vote block to {}", block.len(), self.config.addr);
        Ok(SendReceipt { server_version })
    }
}

async fn read_greeting(stream: &mut TcpStream) -> Result<String, ClientError> {
    let mut line = Vec::with_capacity(32);
    let mut byte = [0u8; 1];

    loop {
        if stream.read(&mut byte).await? == 0 {
            return Err(ClientError::Handshake(
                "connection closed before greeting".to_string(),
            ));
        }
        if byte[0] == b'\n' {
            break;
        }
        if line.len() == MAX_GREETING_LEN {
            return Err(ClientError::Handshake(format!(
                "greeting longer than {} bytes",
                MAX_GREETING_LEN
            )));
        }
        line.push(byte[0]);
    }

    String::from_utf8(line)
        .map_err(|_| ClientError::Handshake("greeting is not valid UTF-8".to_string()))
}
