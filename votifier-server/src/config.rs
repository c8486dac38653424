//! Server configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (created with the defaults on first run)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Verbose logging of every received vote.
    pub debug: bool,
    /// Network configuration.
    pub network: NetworkConfig,
    /// Key pair location and strength.
    pub keys: KeyConfig,
    /// Built-in vote listeners.
    pub listeners: ListenerConfig,
}

impl Config {
    /// Loads configuration from `path`, writing the defaults there first if
    /// the file does not exist yet.
    ///
    /// Returns the configuration and whether the file was created.
    pub fn load_or_init(path: impl AsRef<Path>) -> Result<(Self, bool), ConfigError> {
        let path = path.as_ref();
        let created = if path.exists() {
            false
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::IoError(parent.to_path_buf(), e))?;
            }
            Self::default().save(path)?;
            true
        };

        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok((config, created))
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(debug) = std::env::var("VOTIFIER_DEBUG") {
            self.debug = parse_bool(&debug);
        }
        self.network.apply_env_overrides();
        self.keys.apply_env_overrides();
        self.listeners.apply_env_overrides();
    }

    /// Validates value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.port == 0 {
            return Err(ConfigError::ValidationError(
                "network.port must not be 0".to_string(),
            ));
        }
        if self.network.read_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "network.read_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.network.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "network.max_connections must be at least 1".to_string(),
            ));
        }
        if self.network.max_connections > Semaphore::MAX_PERMITS {
            return Err(ConfigError::ValidationError(format!(
                "network.max_connections must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if self.keys.bits < MIN_KEY_BITS {
            return Err(ConfigError::ValidationError(format!(
                "keys.bits must be at least {}",
                MIN_KEY_BITS
            )));
        }
        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }
}

/// Smallest accepted RSA modulus.
pub const MIN_KEY_BITS: usize = 1024;

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Host name or address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Seconds a peer gets to receive the greeting and send its block.
    pub read_timeout_secs: u64,
    /// Maximum concurrently handled connections.
    pub max_connections: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: votifier_protocol::DEFAULT_PORT,
            read_timeout_secs: 5,
            max_connections: 256,
        }
    }
}

impl NetworkConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("VOTIFIER_HOST") {
            if !host.is_empty() {
                self.host = host;
            }
        }

        if let Ok(port) = std::env::var("VOTIFIER_PORT") {
            if let Ok(p) = port.parse() {
                self.port = p;
            }
        }

        if let Ok(timeout) = std::env::var("VOTIFIER_READ_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.read_timeout_secs = secs;
            }
        }

        if let Ok(max) = std::env::var("VOTIFIER_MAX_CONNECTIONS") {
            if let Ok(n) = max.parse() {
                self.max_connections = n;
            }
        }
    }

    /// Resolves host and port to a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| {
                ConfigError::ValidationError(format!("cannot resolve host '{}': {}", self.host, e))
            })?
            .next()
            .ok_or_else(|| {
                ConfigError::ValidationError(format!("host '{}' has no addresses", self.host))
            })
    }

    /// Returns the read timeout as Duration.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

/// Key pair configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    /// Directory holding `public.key` and `private.key`.
    pub dir: PathBuf,
    /// Modulus size used when generating a new pair.
    pub bits: usize,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./votifier/rsa"),
            bits: votifier_protocol::DEFAULT_KEY_BITS,
        }
    }
}

impl KeyConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("VOTIFIER_KEY_DIR") {
            self.dir = PathBuf::from(dir);
        }

        if let Ok(bits) = std::env::var("VOTIFIER_KEY_BITS") {
            if let Ok(n) = bits.parse() {
                self.bits = n;
            }
        }
    }
}

/// Built-in listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Directory for the votes log; disabled when unset.
    pub directory: Option<PathBuf>,
    /// Log every received vote.
    pub log_votes: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            directory: Some(PathBuf::from("./votifier/listeners")),
            log_votes: true,
        }
    }
}

impl ListenerConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("VOTIFIER_LISTENER_DIR") {
            self.directory = if dir.is_empty() {
                None
            } else {
                Some(PathBuf::from(dir))
            };
        }

        if let Ok(log) = std::env::var("VOTIFIER_LOG_VOTES") {
            self.log_votes = parse_bool(&log);
        }
    }
}

fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to access config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
