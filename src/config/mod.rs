//! Configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Smallest outbound queue a session gets; joining alone queues several lines
pub const MIN_OUTBOUND_QUEUE: usize = 16;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub chat: ChatConfig,
}

/// Network and connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Capacity of each session's outbound queue; a full queue disconnects.
    /// Values below `MIN_OUTBOUND_QUEUE` are raised to it.
    pub outbound_queue: usize,

    /// Longest accepted input line in bytes
    pub max_line_length: usize,

    /// Disconnect clients that send nothing for this many seconds
    pub idle_timeout_secs: Option<u64>,

    /// How long a closing session waits for pending output to flush
    pub linger_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6666,
            outbound_queue: 256,
            max_line_length: 4096,
            idle_timeout_secs: None,
            linger_ms: 2000,
        }
    }
}

impl ServerConfig {
    /// `host:port` string for binding
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Effective outbound queue capacity
    pub fn outbound_capacity(&self) -> usize {
        self.outbound_queue.max(MIN_OUTBOUND_QUEUE)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }

    pub fn linger(&self) -> Duration {
        Duration::from_millis(self.linger_ms)
    }
}

/// Chat behaviour settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Tell other users when someone joins or leaves
    pub announce_presence: bool,

    /// Colour output lines with ANSI escapes
    pub colors: bool,

    /// Maximum username length in characters
    pub max_username_len: usize,

    /// Permitted status values; empty allows any text
    pub allowed_statuses: Vec<String>,

    /// Extra greeting line shown on connect
    pub motd: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            announce_presence: true,
            colors: false,
            max_username_len: 32,
            allowed_statuses: Vec::new(),
            motd: None,
        }
    }
}

impl ChatConfig {
    /// Whether `status` may be set. Clearing is always allowed.
    pub fn status_allowed(&self, status: &str) -> bool {
        status.is_empty()
            || self.allowed_statuses.is_empty()
            || self.allowed_statuses.iter().any(|s| s == status)
    }
}

impl Config {
    /// Load config from the default location, or return defaults if not found
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load config from `path`, or return defaults if the file does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config {:?}", path))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chatty")
            .join("config.toml")
    }
}
