//! Server configuration, loaded from the `[tcp]` table of a TOML file.
//!
//! ```toml
//! [tcp]
//! name = "gateway-01"
//! port = 9000
//! max_conn = 5000
//! worker_pool_size = 8
//! ```
//!
//! Every key is optional; missing keys take the defaults below.

use std::io;
use std::path::{Path, PathBuf};

use ironlink_session::SessionConfig;
use ironlink_worker::WorkerConfig;
use serde::Deserialize;

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Everything a [`Server`](crate::Server) needs to know up front.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Shown in logs.
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Connections beyond this many are closed on accept.
    pub max_conn: usize,
    /// Largest accepted frame body in bytes. 0 disables the check.
    pub max_packet_size: usize,
    /// Worker tasks. 0 runs every request on its own task.
    pub worker_pool_size: usize,
    /// Queue depth per worker.
    pub max_worker_task_len: usize,
    /// Buffered outbound queue depth per connection.
    pub max_msg_chan_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "IronlinkServer".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8090,
            max_conn: 12000,
            max_packet_size: 4096,
            worker_pool_size: 10,
            max_worker_task_len: 1024,
            max_msg_chan_len: 1024,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    tcp: ServerConfig,
}

impl ServerConfig {
    /// Parses a TOML document. Only the `[tcp]` table is read.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(contents)?;
        Ok(file.tcp)
    }

    /// Loads the config file at `path`, falling back to defaults when the
    /// file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_toml_str(&contents),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "config file not found, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// `host:port`, bracketing IPv6 hosts.
    pub fn addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            max_msg_chan_len: self.max_msg_chan_len,
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            worker_pool_size: self.worker_pool_size,
            max_worker_task_len: self.max_worker_task_len,
        }
    }
}
