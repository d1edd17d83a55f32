use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Session negotiation and liveness parameters
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionConfig {
    /// Requested session timeout; the ensemble may negotiate it down or up
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,

    /// Fraction of the negotiated timeout of send-idleness after which a ping is sent
    #[serde(default = "default_ping_interval_ratio")]
    pub ping_interval_ratio: f64,

    /// Fraction of the negotiated timeout of receive-silence treated as connection loss
    #[serde(default = "default_read_timeout_ratio")]
    pub read_timeout_ratio: f64,

    /// Re-send in-flight requests after reconnect instead of failing them
    #[serde(default = "default_resend_on_connection_loss")]
    pub resend_on_connection_loss: bool,

    /// Upper bound a caller waits for one operation (0 disables)
    #[serde(default)]
    pub operation_timeout_ms: u64,

    /// How long close waits for the ensemble to acknowledge the session close
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_timeout_ms: default_session_timeout_ms(),
            ping_interval_ratio: default_ping_interval_ratio(),
            read_timeout_ratio: default_read_timeout_ratio(),
            resend_on_connection_loss: default_resend_on_connection_loss(),
            operation_timeout_ms: 0,
            close_timeout_ms: default_close_timeout_ms(),
        }
    }
}

impl SessionConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        (self.operation_timeout_ms > 0).then(|| Duration::from_millis(self.operation_timeout_ms))
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.session_timeout_ms == 0 || self.session_timeout_ms > i32::MAX as u64 {
            return Err(Error::Config(ConfigError::Message(format!(
                "session timeout {}ms must be in 1..={}",
                self.session_timeout_ms,
                i32::MAX
            ))));
        }

        for (name, ratio) in [
            ("ping interval ratio", self.ping_interval_ratio),
            ("read timeout ratio", self.read_timeout_ratio),
        ] {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(Error::Config(ConfigError::Message(format!(
                    "{name} {ratio} must be in (0, 1]"
                ))));
            }
        }

        if self.ping_interval_ratio >= self.read_timeout_ratio {
            return Err(Error::Config(ConfigError::Message(format!(
                "ping interval ratio {} must be < read timeout ratio {}",
                self.ping_interval_ratio, self.read_timeout_ratio
            ))));
        }

        Ok(())
    }
}

fn default_session_timeout_ms() -> u64 {
    10_000
}
fn default_ping_interval_ratio() -> f64 {
    1.0 / 3.0
}
fn default_read_timeout_ratio() -> f64 {
    1.0
}
fn default_resend_on_connection_loss() -> bool {
    true
}
fn default_close_timeout_ms() -> u64 {
    1000
}
