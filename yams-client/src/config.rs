//! Client configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via YAMS_CLIENT_CONFIG)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use yams_protocol::MAX_FRAME_SIZE;

/// Default read buffer size (64 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Explicit daemon socket path. When unset the path is resolved from
    /// the environment, see [`crate::paths::resolve_socket_path`].
    pub socket_path: Option<PathBuf>,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Default per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
    /// Largest frame payload accepted from the daemon.
    pub max_frame_size: u32,
    /// Version string sent in every envelope.
    pub client_version: String,
    /// Reconnection policy.
    pub reconnect: ReconnectConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            connect_timeout_ms: 5_000,
            request_timeout_ms: 30_000,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_frame_size: MAX_FRAME_SIZE,
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("YAMS_CLIENT_CONFIG") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Self::from_yaml(&content).map_err(|e| match e {
            ConfigError::ParseError(_, msg) => ConfigError::ParseError(path.to_path_buf(), msg),
            other => other,
        })
    }

    /// Parses configuration from a YAML string.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut config: ClientConfig = serde_yaml::from_str(content)
            .map_err(|e| ConfigError::ParseError(PathBuf::new(), e.to_string()))?;
        config.read_buffer_size = config
            .read_buffer_size
            .clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("YAMS_DAEMON_SOCKET") {
            if !path.is_empty() {
                self.socket_path = Some(PathBuf::from(path));
            }
        }

        if let Ok(ms) = std::env::var("YAMS_CONNECT_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                self.connect_timeout_ms = ms;
            }
        }

        if let Ok(ms) = std::env::var("YAMS_REQUEST_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                self.request_timeout_ms = ms;
            }
        }

        self.reconnect.apply_env_overrides();
    }

    pub fn with_socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = Some(path.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }

    pub fn with_max_frame_size(mut self, size: u32) -> Self {
        self.max_frame_size = size;
        self
    }

    pub fn with_client_version(mut self, version: impl Into<String>) -> Self {
        self.client_version = version.into();
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Automatic reconnection with exponential backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Reconnect after the daemon drops an established connection.
    pub enabled: bool,
    /// Delay before the first attempt, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound on the delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Attempts before giving up. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            max_attempts: None,
        }
    }
}

impl ReconnectConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(enabled) = std::env::var("YAMS_AUTO_RECONNECT") {
            self.enabled = enabled == "1" || enabled.eq_ignore_ascii_case("true");
        }

        if let Ok(max) = std::env::var("YAMS_RECONNECT_MAX_ATTEMPTS") {
            if let Ok(n) = max.parse() {
                self.max_attempts = Some(n);
            }
        }
    }

    /// Returns the delay before reconnect attempt `attempt` (1-indexed):
    /// `min(base * 2^(attempt - 1), max)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63);
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    /// Returns whether another attempt may follow `attempts` made so far.
    pub fn allows_attempt(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempts < max)
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {}", .0.display(), .1)]
    IoError(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file '{}': {}", .0.display(), .1)]
    ParseError(PathBuf, String),
}
