use serde::Deserialize;
use serde::Serialize;

/// Result type surfaced to callers of the engine.
pub type ClientResult<T> = std::result::Result<T, ZkError>;

/// Status codes surfaced to callers.
///
/// `OK` is represented by `Ok(_)`; every failure maps onto exactly one variant.
/// Codes in `-1..=-99` are system errors, codes at or below `-100` are API errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
pub enum ZkError {
    #[error("system error")]
    SystemError,

    #[error("run time inconsistency")]
    RuntimeInconsistency,

    #[error("data inconsistency")]
    DataInconsistency,

    /// Transport to the ensemble was lost before the operation completed
    #[error("connection loss")]
    ConnectionLoss,

    #[error("marshalling error")]
    MarshallingError,

    #[error("unimplemented")]
    Unimplemented,

    #[error("operation timeout")]
    OperationTimeout,

    /// Rejected locally before any network activity
    #[error("bad arguments")]
    BadArguments,

    #[error("invalid zhandle state")]
    InvalidState,

    #[error("api error")]
    ApiError,

    #[error("no node")]
    NoNode,

    #[error("not authenticated")]
    NoAuth,

    /// Expected version did not match the stored version
    #[error("bad version")]
    BadVersion,

    #[error("no children for ephemerals")]
    NoChildrenForEphemerals,

    #[error("node exists")]
    NodeExists,

    #[error("not empty")]
    NotEmpty,

    #[error("session expired")]
    SessionExpired,

    #[error("invalid callback")]
    InvalidCallback,

    #[error("invalid acl")]
    InvalidAcl,

    #[error("authentication failed")]
    AuthFailed,

    /// The engine was closed before the result could be delivered
    #[error("zookeeper is closing")]
    Closing,

    #[error("(not error) no server responses to process")]
    Nothing,

    #[error("session moved to another server, so operation is ignored")]
    SessionMoved,
}

impl ZkError {
    /// Numeric status code.
    pub fn code(&self) -> i32 {
        match self {
            ZkError::SystemError => -1,
            ZkError::RuntimeInconsistency => -2,
            ZkError::DataInconsistency => -3,
            ZkError::ConnectionLoss => -4,
            ZkError::MarshallingError => -5,
            ZkError::Unimplemented => -6,
            ZkError::OperationTimeout => -7,
            ZkError::BadArguments => -8,
            ZkError::InvalidState => -9,
            ZkError::ApiError => -100,
            ZkError::NoNode => -101,
            ZkError::NoAuth => -102,
            ZkError::BadVersion => -103,
            ZkError::NoChildrenForEphemerals => -108,
            ZkError::NodeExists => -110,
            ZkError::NotEmpty => -111,
            ZkError::SessionExpired => -112,
            ZkError::InvalidCallback => -113,
            ZkError::InvalidAcl => -114,
            ZkError::AuthFailed => -115,
            ZkError::Closing => -116,
            ZkError::Nothing => -117,
            ZkError::SessionMoved => -118,
        }
    }

    /// Converts a status code received from the ensemble.
    ///
    /// # Returns
    /// - `Ok(())` for `0`
    /// - `Err(ZkError)` for known codes; unknown negative codes collapse to
    ///   `SystemError` (system range) or `ApiError` (API range)
    pub fn from_code(code: i32) -> ClientResult<()> {
        let err = match code {
            0 => return Ok(()),
            -1 => ZkError::SystemError,
            -2 => ZkError::RuntimeInconsistency,
            -3 => ZkError::DataInconsistency,
            -4 => ZkError::ConnectionLoss,
            -5 => ZkError::MarshallingError,
            -6 => ZkError::Unimplemented,
            -7 => ZkError::OperationTimeout,
            -8 => ZkError::BadArguments,
            -9 => ZkError::InvalidState,
            -100 => ZkError::ApiError,
            -101 => ZkError::NoNode,
            -102 => ZkError::NoAuth,
            -103 => ZkError::BadVersion,
            -108 => ZkError::NoChildrenForEphemerals,
            -110 => ZkError::NodeExists,
            -111 => ZkError::NotEmpty,
            -112 => ZkError::SessionExpired,
            -113 => ZkError::InvalidCallback,
            -114 => ZkError::InvalidAcl,
            -115 => ZkError::AuthFailed,
            -116 => ZkError::Closing,
            -117 => ZkError::Nothing,
            -118 => ZkError::SessionMoved,
            c if c <= -100 => ZkError::ApiError,
            _ => ZkError::SystemError,
        };
        Err(err)
    }

    /// System errors describe the engine or transport, not the request.
    pub fn is_system_error(&self) -> bool {
        let code = self.code();
        code < 0 && code > -100
    }

    /// API errors are returned verbatim by the ensemble for a specific request.
    pub fn is_api_error(&self) -> bool {
        self.code() <= -100
    }

    /// Session-fatal statuses: the engine will not recover from these.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ZkError::SessionExpired | ZkError::AuthFailed | ZkError::Closing
        )
    }
}
