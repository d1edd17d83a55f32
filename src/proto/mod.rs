//! Messages crossing the codec boundary.
//!
//! The engine only relies on the shape of these types; their byte
//! representation belongs to the [`Codec`](crate::Codec) in use.

use serde::Deserialize;
use serde::Serialize;

use crate::Acl;
use crate::Stat;

/// Reply xid carrying a watch notification.
pub const NOTIFICATION_XID: i32 = -1;
/// Heartbeat request/reply.
pub const PING_XID: i32 = -2;
/// Authentication request/reply.
pub const AUTH_XID: i32 = -4;
/// Watch re-arming request/reply.
pub const SET_WATCHES_XID: i32 = -8;

pub const PROTOCOL_VERSION: i32 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub protocol_version: i32,
    pub last_zxid_seen: i64,
    pub timeout_ms: i32,
    /// `0` asks for a brand-new session
    pub session_id: i64,
    pub passwd: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectResponse {
    pub protocol_version: i32,
    /// Negotiated timeout; `<= 0` means the requested session expired
    pub timeout_ms: i32,
    pub session_id: i64,
    pub passwd: Vec<u8>,
}

/// Request bodies. Paths are absolute server paths (chroot already applied).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    Ping,
    Create {
        path: String,
        data: Vec<u8>,
        acl: Vec<Acl>,
        flags: i32,
    },
    Delete {
        path: String,
        version: i32,
    },
    Exists {
        path: String,
        watch: bool,
    },
    GetData {
        path: String,
        watch: bool,
    },
    SetData {
        path: String,
        data: Vec<u8>,
        version: i32,
    },
    GetAcl {
        path: String,
    },
    SetAcl {
        path: String,
        acl: Vec<Acl>,
        version: i32,
    },
    GetChildren {
        path: String,
        watch: bool,
    },
    SetWatches {
        relative_zxid: i64,
        data_watches: Vec<String>,
        exist_watches: Vec<String>,
        child_watches: Vec<String>,
    },
    Auth {
        scheme: String,
        auth: Vec<u8>,
    },
    CloseSession,
}

impl Request {
    /// Short operation name used in logs and metric labels.
    pub fn op_name(&self) -> &'static str {
        match self {
            Request::Ping => "ping",
            Request::Create { .. } => "create",
            Request::Delete { .. } => "delete",
            Request::Exists { .. } => "exists",
            Request::GetData { .. } => "get",
            Request::SetData { .. } => "set",
            Request::GetAcl { .. } => "get_acl",
            Request::SetAcl { .. } => "set_acl",
            Request::GetChildren { .. } => "get_children",
            Request::SetWatches { .. } => "set_watches",
            Request::Auth { .. } => "auth",
            Request::CloseSession => "close_session",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPacket {
    pub xid: i32,
    pub request: Request,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyHeader {
    pub xid: i32,
    pub zxid: i64,
    /// Status code, `0` on success
    pub err: i32,
}

/// Server-pushed notification body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherEvent {
    pub event_type: i32,
    pub state: i32,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Empty,
    Create { path: String },
    Stat(Stat),
    Data { data: Vec<u8>, stat: Stat },
    Children { children: Vec<String> },
    Acl { acl: Vec<Acl>, stat: Stat },
    Notification(WatcherEvent),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyPacket {
    pub header: ReplyHeader,
    pub response: Response,
}

impl Response {
    /// Variant name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Response::Empty => "empty",
            Response::Create { .. } => "create",
            Response::Stat(_) => "stat",
            Response::Data { .. } => "data",
            Response::Children { .. } => "children",
            Response::Acl { .. } => "acl",
            Response::Notification(_) => "notification",
        }
    }
}
