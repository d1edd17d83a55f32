//! Configuration management for the session engine.
//!
//! Provides layered configuration loading with priority:
//! 1. Default values (hardcoded)
//! 2. Optional config file (toml)
//! 3. Environment variables (highest priority), e.g.
//!    `ZK_ENGINE__SESSION__SESSION_TIMEOUT_MS=5000`

mod connection;
mod retry;
mod session;
pub use connection::*;
pub use retry::*;
pub use session::*;


//---
use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::Result;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "ZK_ENGINE";

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ClientConfig {
    /// Session negotiation, heartbeat and resend behavior
    #[serde(default)]
    pub session: SessionConfig,
    /// Transport parameters
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Retry policies
    #[serde(default)]
    pub retry: RetryPolicies,
}

impl ClientConfig {
    /// Load configuration from defaults, an optional file and the environment.
    ///
    /// # Arguments
    /// * `path` - Optional path to a toml configuration file; must exist when given
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            debug!("loading client config from {}", path);
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: ClientConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<()> {
        self.session.validate()?;
        self.connection.validate()?;
        self.retry.reconnect.validate("reconnect")?;
        Ok(())
    }
}
