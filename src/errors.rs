//! Engine error hierarchy.
//!
//! Internal failures are categorized by layer. Every variant maps onto exactly
//! one caller-visible [`ZkError`] through [`Error::status`].

use std::time::Duration;

use config::ConfigError;

use crate::SessionState;
use crate::ZkError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport failures: recovered locally by reconnecting
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Wire contract violations: force a reconnect
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Session lifecycle failures
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Configuration validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Status returned verbatim by the ensemble or decided locally
    #[error(transparent)]
    Api(#[from] ZkError),

    /// Unrecoverable engine failures
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Connection to {addr} timed out after {duration:?}")]
    ConnectTimeout { addr: String, duration: Duration },

    /// Peer closed the stream
    #[error("Connection closed by {0}")]
    Closed(String),

    /// No server traffic within the read timeout
    #[error("No server traffic for {0:?}")]
    HeartbeatTimeout(Duration),

    #[error("Invalid server address: {0}")]
    InvalidAddress(String),

    #[error("Reconnect attempts exhausted after {0} tries")]
    RetriesExhausted(usize),
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Replies must arrive in submission order
    #[error("Reply xid {received} does not match oldest pending xid {expected:?}")]
    UnexpectedXid { expected: Option<i32>, received: i32 },

    #[error("Marshalling failed: {0}")]
    Marshalling(String),

    #[error("Frame of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("Unexpected {response} response to {request}")]
    UnexpectedResponse {
        request: &'static str,
        response: &'static str,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Illegal session transition {from} -> {to}")]
    InvalidTransition { from: SessionState, to: SessionState },

    #[error("Session expired")]
    Expired,

    #[error("Authentication failed")]
    AuthFailed,
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        ProtocolError::Marshalling(e.to_string()).into()
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        NetworkError::Io(e).into()
    }
}

impl Error {
    /// Caller-visible status for this failure.
    pub fn status(&self) -> ZkError {
        match self {
            Error::Network(NetworkError::ConnectTimeout { .. }) => ZkError::OperationTimeout,
            Error::Network(_) => ZkError::ConnectionLoss,
            Error::Protocol(ProtocolError::Marshalling(_)) => ZkError::MarshallingError,
            Error::Protocol(ProtocolError::FrameTooLarge { .. }) => ZkError::MarshallingError,
            Error::Protocol(_) => ZkError::ConnectionLoss,
            Error::Session(SessionError::InvalidTransition { .. }) => ZkError::InvalidState,
            Error::Session(SessionError::Expired) => ZkError::SessionExpired,
            Error::Session(SessionError::AuthFailed) => ZkError::AuthFailed,
            Error::Config(_) => ZkError::BadArguments,
            Error::Api(e) => *e,
            Error::Fatal(_) => ZkError::SystemError,
        }
    }
}
