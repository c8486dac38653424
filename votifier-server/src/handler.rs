//! Per-connection vote handling.
//!
//! Each accepted socket goes through a fixed sequence of steps:
//!
//! ```text
//! Greeting -> Reading -> Decoding -> Dispatching -> Closed
//! ```
//!
//! Any failure skips straight to `Closed`. The peer never receives an error
//! frame; the only observable outcome for it is the connection closing.

use crate::dispatch::Dispatcher;
use crate::error::ServerError;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use votifier_protocol::{Vote, VoteDecoder};

/// Step labels used in per-connection debug logs.
///
/// The handler does not store or check the current step; the sequence is
/// fixed by the code in [`ConnectionHandler::handle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Greeting,
    Reading,
    Decoding,
    Dispatching,
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Greeting => "greeting",
            ConnectionState::Reading => "reading",
            ConnectionState::Decoding => "decoding",
            ConnectionState::Dispatching => "dispatching",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Runs the vote exchange on one connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandler {
    decoder: Arc<VoteDecoder>,
    dispatcher: Dispatcher,
    read_timeout: Duration,
    debug: bool,
}

impl ConnectionHandler {
    pub fn new(decoder: Arc<VoteDecoder>, dispatcher: Dispatcher, read_timeout: Duration) -> Self {
        Self {
            decoder,
            dispatcher,
            read_timeout,
            debug: false,
        }
    }

    /// Logs every received vote at info level instead of debug.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Handles one connection to completion and closes it.
    ///
    /// Returns the decoded vote once every listener has been invoked.
    pub async fn handle<S>(&self, mut stream: S, peer: SocketAddr) -> Result<Vote, ServerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let result = self.exchange(&mut stream, peer).await;

        let _ = stream.shutdown().await;
        tracing::debug!("[{}] {}", peer, ConnectionState::Closed);
        result
    }

    async fn exchange<S>(&self, stream: &mut S, peer: SocketAddr) -> Result<Vote, ServerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        tracing::debug!("[{}] {}", peer, ConnectionState::Greeting);
        let greeting = votifier_protocol::greeting();
        self.bounded(async {
            stream.write_all(greeting.as_bytes()).await?;
            stream.flush().await
        })
        .await?;

        tracing::debug!("[{}] {}", peer, ConnectionState::Reading);
        let mut block = vec![0u8; self.decoder.block_size()];
        self.bounded(stream.read_exact(&mut block)).await?;

        tracing::debug!("[{}] {}", peer, ConnectionState::Decoding);
        let decoder = self.decoder.clone();
        let vote = tokio::task::spawn_blocking(move || decoder.decode(&block))
            .await
            .map_err(join_error)??;

        if self.debug {
            tracing::info!("Received vote record -> {}", vote);
        } else {
            tracing::debug!("[{}] Received vote record -> {}", peer, vote);
        }

        tracing::debug!("[{}] {}", peer, ConnectionState::Dispatching);
        let dispatcher = self.dispatcher.clone();
        let dispatched = vote.clone();
        let report = tokio::task::spawn_blocking(move || dispatcher.dispatch(&dispatched))
            .await
            .map_err(join_error)?;
        if !report.all_delivered() {
            tracing::debug!(
                "[{}] {} of {} listeners failed",
                peer,
                report.failed.len(),
                report.failed.len() + report.delivered
            );
        }

        Ok(vote)
    }

    async fn bounded<F, T>(&self, fut: F) -> Result<T, ServerError>
    where
        F: Future<Output = std::io::Result<T>>,
    {
        match tokio::time::timeout(self.read_timeout, fut).await {
            Ok(result) => result.map_err(ServerError::Io),
            Err(_) => Err(ServerError::Timeout(self.read_timeout)),
        }
    }
}

fn join_error(e: tokio::task::JoinError) -> ServerError {
    ServerError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
}
