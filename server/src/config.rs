//! Server configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tailscope_watcher::WatcherConfig;

use crate::error::ConfigError;
use crate::hub::DEFAULT_QUEUE_CAPACITY;

/// Default listen address.
pub const DEFAULT_BIND_ADDR: &str = "localhost:8081";

/// Everything the server needs besides the watch target.
///
/// Loaded from TOML; missing keys fall back to their defaults:
///
/// ```toml
/// bind_addr = "127.0.0.1:9000"
/// queue_capacity = 512
///
/// [watcher]
/// max_file_bytes = 1048576
/// read_timeout = 10
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP/WebSocket listener binds to.
    pub bind_addr: String,

    /// Per-subscriber queue depth.
    pub queue_capacity: usize,

    /// Watcher tunables.
    pub watcher: WatcherConfig,
}

impl ServerConfig {
    /// Read a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Set the listen address.
    pub fn with_bind_addr(mut self, bind_addr: impl Into<String>) -> Self {
        self.bind_addr = bind_addr.into();
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            watcher: WatcherConfig::default(),
        }
    }
}
