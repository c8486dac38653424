//! TCP server implementation.

use crate::config::{Config, ConfigError};
use crate::dispatch::Dispatcher;
use crate::error::ServerError;
use crate::handler::ConnectionHandler;
use crate::keys::KeyPair;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{watch, Semaphore};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Time a peer gets for the greeting and its vote block.
    pub read_timeout: Duration,
    /// Maximum concurrently handled connections.
    pub max_connections: usize,
    /// Log every received vote at info level.
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], votifier_protocol::DEFAULT_PORT)),
            read_timeout: Duration::from_secs(5),
            max_connections: 256,
            debug: false,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    /// Builds the server settings from a loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            bind_addr: config.network.bind_addr()?,
            read_timeout: config.network.read_timeout(),
            max_connections: config.network.max_connections,
            debug: config.debug,
        })
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub votes_received: AtomicU64,
    pub votes_rejected: AtomicU64,
    pub errors_total: AtomicU64,
}

impl ServerStats {
    fn record_error(&self, err: &ServerError) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
        if matches!(err, ServerError::Protocol(_)) {
            self.votes_rejected.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// TCP vote receiver.
pub struct Server {
    config: ServerConfig,
    local_addr: SocketAddr,
    listener: Mutex<Option<TcpListener>>,
    keys: Arc<KeyPair>,
    handler: ConnectionHandler,
    limiter: Arc<Semaphore>,
    stats: Arc<ServerStats>,
    shutdown: watch::Sender<bool>,
    running: AtomicBool,
}

impl Server {
    /// Binds the listening socket.
    ///
    /// The dispatcher is already frozen; listeners cannot be added once the
    /// server exists.
    pub async fn bind(
        config: ServerConfig,
        keys: Arc<KeyPair>,
        dispatcher: Dispatcher,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.bind_addr,
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let handler = ConnectionHandler::new(
            Arc::new(keys.decoder()),
            dispatcher,
            config.read_timeout,
        )
        .with_debug(config.debug);
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            limiter: Arc::new(Semaphore::new(
                config.max_connections.clamp(1, Semaphore::MAX_PERMITS),
            )),
            config,
            local_addr,
            listener: Mutex::new(Some(listener)),
            keys,
            handler,
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
        })
    }

    /// Returns the bound address, including an OS-assigned port.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn keys(&self) -> &Arc<KeyPair> {
        &self.keys
    }

    /// Runs the accept loop until [`Server::shutdown`] is called.
    ///
    /// The listening socket is closed when this returns. Connections that
    /// were already accepted keep running to completion.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = self.listener.lock().take().ok_or(ServerError::ShuttingDown)?;
        let mut shutdown_rx = self.shutdown.subscribe();
        if *shutdown_rx.borrow() {
            tracing::info!("Server shutting down");
            return Ok(());
        }

        self.running.store(true, Ordering::SeqCst);
        tracing::info!("Server listening on {}", self.local_addr);

        loop {
            // Wait for a free slot before accepting, so excess peers queue in
            // the kernel backlog.
            let permit = tokio::select! {
                permit = self.limiter.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = shutdown_rx.changed() => break,
            };

            let (stream, addr) = tokio::select! {
                result = listener.accept() => match result {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::error!("Accept error: {}", e);
                        continue;
                    }
                },
                _ = shutdown_rx.changed() => break,
            };

            self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
            self.stats.connections_active.fetch_add(1, Ordering::Relaxed);

            let handler = self.handler.clone();
            let stats = self.stats.clone();

            tokio::spawn(async move {
                let _permit = permit;
                tracing::debug!("Client connected: {}", addr);

                match handler.handle(stream, addr).await {
                    Ok(_) => {
                        stats.votes_received.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        stats.record_error(&e);
                        log_connection_error(addr, &e);
                    }
                }

                stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                tracing::debug!("Client disconnected: {}", addr);
            });
        }

        tracing::info!("Server shutting down");
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }
}

fn log_connection_error(addr: SocketAddr, err: &ServerError) {
    match err.kind() {
        "DECRYPT_ERROR" => tracing::warn!(
            "[{}] Unable to decrypt vote record. Make sure that your public key \
             matches the one you gave the server list. ({})",
            addr,
            err
        ),
        kind => tracing::debug!("[{}] Connection error ({}): {}", addr, kind, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{ListenerError, ListenerRegistry, VoteListener};
    use std::sync::OnceLock;
    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use votifier_client::{ClientConfig, VoteClient};
    use votifier_protocol::Vote;

    fn small_keys() -> Arc<KeyPair> {
        static KEYS: OnceLock<Arc<KeyPair>> = OnceLock::new();
        KEYS.get_or_init(|| Arc::new(KeyPair::generate(1024).unwrap()))
            .clone()
    }

    #[derive(Clone, Default)]
    struct Recording(Arc<parking_lot::Mutex<Vec<Vote>>>);

    impl VoteListener for Recording {
        fn on_vote(&self, vote: &Vote) -> Result<(), ListenerError> {
            self.0.lock().push(vote.clone());
            Ok(())
        }
    }

    async fn test_server(config: ServerConfig, keys: Arc<KeyPair>) -> (Arc<Server>, Recording) {
        let recording = Recording::default();
        let mut registry = ListenerRegistry::new();
        registry.register(recording.clone());
        let server = Server::bind(config, keys, registry.freeze()).await.unwrap();
        (Arc::new(server), recording)
    }

    fn local_config() -> ServerConfig {
        ServerConfig::new("127.0.0.1:0".parse().unwrap())
    }

    fn spawn_run(server: &Arc<Server>) -> tokio::task::JoinHandle<Result<(), ServerError>> {
        let server = server.clone();
        tokio::spawn(async move { server.run().await })
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not met in time");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn vote() -> Vote {
        Vote::new("ExampleSite", "Alice", "1.2.3.4", "1234567890")
    }

    #[tokio::test]
    async fn test_server_basic() {
        let (server, _) = test_server(local_config(), small_keys()).await;
        assert!(!server.is_running());
        assert_ne!(server.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_end_to_end_2048() {
        let keys = Arc::new(KeyPair::generate(2048).unwrap());
        let config = local_config().with_read_timeout(Duration::from_secs(2));
        let (server, recording) = test_server(config, keys.clone()).await;
        let run = spawn_run(&server);

        let mut stream = TcpStream::connect(server.local_addr()).await.unwrap();
        let mut greeting = vec![0u8; votifier_protocol::greeting().len()];
        stream.read_exact(&mut greeting).await.unwrap();
        assert!(greeting.starts_with(b"VOTIFIER "));

        let block = keys.encoder().encrypt(&vote()).unwrap();
        assert_eq!(block.len(), 256);
        stream.write_all(&block).await.unwrap();

        // The server closes without sending anything else.
        let mut rest = Vec::new();
        tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut rest))
            .await
            .unwrap()
            .unwrap();
        assert!(rest.is_empty());

        wait_until(|| recording.0.lock().len() == 1).await;
        assert_eq!(recording.0.lock()[0], vote());
        assert_eq!(server.stats().votes_received.load(Ordering::Relaxed), 1);

        server.shutdown();
        run.await.unwrap().unwrap();
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_client_sends_vote() {
        let keys = small_keys();
        let (server, recording) = test_server(local_config(), keys.clone()).await;
        let run = spawn_run(&server);

        let client = VoteClient::new(
            ClientConfig::new(server.local_addr()),
            keys.public_key().clone(),
        );
        let receipt = client.send(&vote()).await.unwrap();
        assert_eq!(receipt.server_version, votifier_protocol::VERSION);

        wait_until(|| recording.0.lock().len() == 1).await;

        server.shutdown();
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_wrong_key_is_rejected() {
        let (server, recording) = test_server(local_config(), small_keys()).await;
        let run = spawn_run(&server);

        let other = KeyPair::generate(1024).unwrap();
        let client = VoteClient::new(
            ClientConfig::new(server.local_addr()),
            other.public_key().clone(),
        );
        client.send(&vote()).await.unwrap();

        wait_until(|| server.stats().votes_rejected.load(Ordering::Relaxed) == 1).await;
        assert!(recording.0.lock().is_empty());
        assert_eq!(server.stats().errors_total.load(Ordering::Relaxed), 1);

        server.shutdown();
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stalled_peer_does_not_block_others() {
        let keys = small_keys();
        let (server, recording) = test_server(local_config(), keys.clone()).await;
        let run = spawn_run(&server);

        let mut stalled = TcpStream::connect(server.local_addr()).await.unwrap();
        let mut greeting = vec![0u8; votifier_protocol::greeting().len()];
        stalled.read_exact(&mut greeting).await.unwrap();

        let client = VoteClient::new(
            ClientConfig::new(server.local_addr()),
            keys.public_key().clone(),
        );
        client.send(&vote()).await.unwrap();
        wait_until(|| recording.0.lock().len() == 1).await;
        assert!(server.stats().connections_active.load(Ordering::Relaxed) >= 1);

        drop(stalled);
        server.shutdown();
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_connection_limit_applies_back_pressure() {
        let keys = small_keys();
        let config = local_config()
            .with_max_connections(1)
            .with_read_timeout(Duration::from_millis(300));
        let (server, recording) = test_server(config, keys.clone()).await;
        let run = spawn_run(&server);

        let mut stalled = TcpStream::connect(server.local_addr()).await.unwrap();
        let mut greeting = vec![0u8; votifier_protocol::greeting().len()];
        stalled.read_exact(&mut greeting).await.unwrap();

        // The second vote is accepted once the stalled peer times out.
        let client = VoteClient::new(
            ClientConfig::new(server.local_addr()).with_io_timeout(Duration::from_secs(5)),
            keys.public_key().clone(),
        );
        client.send(&vote()).await.unwrap();
        wait_until(|| recording.0.lock().len() == 1).await;

        assert_eq!(server.stats().connections_total.load(Ordering::Relaxed), 2);
        assert_eq!(server.stats().errors_total.load(Ordering::Relaxed), 1);

        server.shutdown();
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_before_run() {
        let (server, _) = test_server(local_config(), small_keys()).await;
        let addr = server.local_addr();

        server.shutdown();
        tokio::time::timeout(Duration::from_secs(1), server.run())
            .await
            .unwrap()
            .unwrap();
        assert!(!server.is_running());

        // The listening socket is gone.
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_run_twice_fails() {
        let (server, _) = test_server(local_config(), small_keys()).await;
        server.shutdown();
        server.run().await.unwrap();
        assert!(matches!(
            server.run().await,
            Err(ServerError::ShuttingDown)
        ));
    }

    #[tokio::test]
    async fn test_bind_address_in_use() {
        let (first, _) = test_server(local_config(), small_keys()).await;
        let config = ServerConfig::new(first.local_addr());

        let err = Server::bind(config, small_keys(), Dispatcher::empty())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ServerError::Bind { .. }));
        assert_eq!(err.kind(), "BIND_ERROR");
    }

    #[tokio::test]
    async fn test_oversized_connection_limit_is_clamped() {
        let config = local_config().with_max_connections(usize::MAX);
        let (server, _) = test_server(config, small_keys()).await;
        assert_eq!(server.limiter.available_permits(), Semaphore::MAX_PERMITS);

        let config = local_config().with_max_connections(0);
        let (server, _) = test_server(config, small_keys()).await;
        assert_eq!(server.limiter.available_permits(), 1);
    }

    #[test]
    fn test_server_config_from_config() {
        let mut config = Config::default();
        config.network.host = "127.0.0.1".to_string();
        config.network.port = 9000;
        config.debug = true;

        let server_config = ServerConfig::from_config(&config).unwrap();
        assert_eq!(server_config.bind_addr, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(server_config.read_timeout, Duration::from_secs(5));
        assert_eq!(server_config.max_connections, 256);
        assert!(server_config.debug);
    }
}
