use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Transport parameters for connections to ensemble members
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// TCP connect + handshake timeout per attempt in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Iterate servers in configured order instead of a shuffled one
    #[serde(default)]
    pub deterministic_conn_order: bool,

    /// Largest frame accepted or sent, in bytes
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,

    #[serde(default = "default_tcp_nodelay")]
    pub tcp_nodelay: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            deterministic_conn_order: false,
            max_frame_size: default_max_frame_size(),
            tcp_nodelay: default_tcp_nodelay(),
        }
    }
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "connect timeout must be > 0".to_string(),
            )));
        }
        if self.max_frame_size < 1024 {
            return Err(Error::Config(ConfigError::Message(format!(
                "Frame size {} too small, minimum 1024 bytes",
                self.max_frame_size
            ))));
        }
        Ok(())
    }
}

fn default_connect_timeout_ms() -> u64 {
    1000
}
fn default_max_frame_size() -> usize {
    1 << 20
}
fn default_tcp_nodelay() -> bool {
    true
}
