//! votifier - Vote receiver
//!
//! Listens for RSA-encrypted votes from server listing sites and hands each
//! decoded vote to the configured listeners.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use votifier_server::{
    Config, ConfigError, JsonlFileListener, KeyStore, ListenerRegistry, LogListener, Server,
    ServerConfig, ServerError,
};

const DEFAULT_CONFIG_PATH: &str = "./votifier/config.yaml";

#[tokio::main]
async fn main() -> ExitCode {
    let config_path = std::env::var("VOTIFIER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    let loaded = Config::load_or_init(&config_path);

    // Initialize logging
    let debug = matches!(&loaded, Ok((config, _)) if config.debug);
    let default_level = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match run(&config_path, loaded).await {
        Ok(()) => {
            tracing::info!("Votifier disabled.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Votifier stopped ({}): {}", e.kind(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(
    config_path: &Path,
    loaded: Result<(Config, bool), ConfigError>,
) -> Result<(), ServerError> {
    let (config, created) = loaded?;

    if created {
        tracing::info!("Configuring Votifier for the first time...");
        tracing::info!("------------------------------------------------------------------------------");
        tracing::info!(
            "Assigning Votifier to listen on port {}. If you are hosting on a shared server",
            config.network.port
        );
        tracing::info!("please check with your hosting provider to verify that this port is available");
        tracing::info!("for your use. Chances are that your hosting provider will assign a different");
        tracing::info!("port, which you need to specify in {}", config_path.display());
        tracing::info!("------------------------------------------------------------------------------");
    } else {
        tracing::info!("Loaded config from {}", config_path.display());
    }

    let server_config = ServerConfig::from_config(&config)?;

    tracing::info!("Starting votifier {}", votifier_protocol::VERSION);
    tracing::info!("  Bind address: {}", server_config.bind_addr);
    tracing::info!("  Key directory: {}", config.keys.dir.display());
    tracing::info!("  Read timeout: {:?}", server_config.read_timeout);
    tracing::info!("  Max connections: {}", server_config.max_connections);

    // Load or create the key pair
    let keys = Arc::new(KeyStore::new(&config.keys.dir).load_or_generate(config.keys.bits)?);
    tracing::info!("  Key size: {} bits", keys.bits());
    tracing::info!("  Key fingerprint (SHA-256): {}", keys.fingerprint()?);
    tracing::debug!("  Public key: {}", keys.public_key_base64()?);

    // Register listeners
    let mut registry = ListenerRegistry::new();
    if config.listeners.log_votes {
        registry.register(LogListener);
    }
    if let Some(ref dir) = config.listeners.directory {
        let listener = JsonlFileListener::open(dir).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!("cannot open votes log in {}: {}", dir.display(), e),
            )
        })?;
        tracing::info!("  Votes log: {}", listener.path().display());
        registry.register(listener);
    }
    tracing::info!("  Listeners: {}", registry.len());

    let server = Arc::new(Server::bind(server_config, keys, registry.freeze()).await?);

    // Handle shutdown signals
    let server_clone = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal");
            server_clone.shutdown();
        }
    });

    tracing::info!("Votifier enabled.");
    server.run().await
}
