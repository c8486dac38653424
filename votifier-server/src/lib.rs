//! # votifier-server
//!
//! TCP vote receiver for votifier.
//!
//! This crate provides:
//! - RSA key pair generation, persistence and loading
//! - The accept loop with bounded per-connection tasks
//! - Per-connection greeting, bounded block read and decoding
//! - Fan-out of decoded votes to registered listeners
//! - YAML configuration with environment overrides

pub mod config;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod keys;
pub mod listener;
pub mod server;

pub use config::{Config, ConfigError, KeyConfig, ListenerConfig, NetworkConfig};
pub use dispatch::{DispatchReport, Dispatcher, ListenerError, ListenerRegistry, VoteListener};
pub use error::ServerError;
pub use handler::{ConnectionHandler, ConnectionState};
pub use keys::{KeyPair, KeyStore, KeyStoreError};
pub use listener::{JsonlFileListener, LogListener};
pub use server::{Server, ServerConfig, ServerStats};
