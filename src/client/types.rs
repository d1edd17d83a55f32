use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::trace;

use super::ClientResult;
use super::ZkError;

/// Conventional "don't check" version for `set`, `delete` and `set_acl`.
pub const ANY_VERSION: i32 = -1;

/// Node metadata returned by the ensemble. Never cached locally.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    /// The transaction ID that created the node.
    pub czxid: i64,
    /// The last transaction that modified the node.
    pub mzxid: i64,
    /// Milliseconds since epoch when the node was created.
    pub ctime: i64,
    /// Milliseconds since epoch when the node was last modified.
    pub mtime: i64,
    /// The number of changes to the data of the node.
    pub version: i32,
    /// The number of changes to the children of the node.
    pub cversion: i32,
    /// The number of changes to the ACL of the node.
    pub aversion: i32,
    /// Owning session id for ephemeral nodes, `0` otherwise.
    pub ephemeral_owner: i64,
    pub data_length: i32,
    pub num_children: i32,
    /// The transaction ID that last modified the children of the node.
    pub pzxid: i64,
}

/// Flag bits accepted by `create`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CreateMode(i32);

impl CreateMode {
    pub const PERSISTENT: CreateMode = CreateMode(0);
    /// Node is deleted by the ensemble when the owning session ends.
    pub const EPHEMERAL: CreateMode = CreateMode(1);
    /// Ensemble appends a monotonically increasing 10 digit suffix.
    pub const SEQUENCE: CreateMode = CreateMode(2);

    /// Validates raw flag bits.
    pub fn from_flags(flags: i32) -> ClientResult<Self> {
        if flags & !(Self::EPHEMERAL.0 | Self::SEQUENCE.0) != 0 {
            return Err(ZkError::BadArguments);
        }
        Ok(CreateMode(flags))
    }

    pub const fn flags(&self) -> i32 {
        self.0
    }

    pub const fn is_ephemeral(&self) -> bool {
        self.0 & Self::EPHEMERAL.0 != 0
    }

    pub const fn is_sequential(&self) -> bool {
        self.0 & Self::SEQUENCE.0 != 0
    }
}

impl BitOr for CreateMode {
    type Output = CreateMode;

    fn bitor(
        self,
        rhs: Self,
    ) -> Self::Output {
        CreateMode(self.0 | rhs.0)
    }
}

/// Session identity that can be handed to another engine to resume the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientId {
    pub session_id: i64,
    pub passwd: Vec<u8>,
}

/// Lifecycle state of the session as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    NotConnected,
    Connecting,
    /// Handshake sent, session not confirmed yet
    Associating,
    Connected,
    Closed,
    Expired,
    AuthFailed,
}

impl SessionState {
    pub fn code(&self) -> i32 {
        match self {
            SessionState::Closed => 0,
            SessionState::Connecting => 1,
            SessionState::Associating => 2,
            SessionState::Connected => 3,
            SessionState::Expired => -112,
            SessionState::AuthFailed => -113,
            SessionState::NotConnected => 999,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(SessionState::Closed),
            1 => Some(SessionState::Connecting),
            2 => Some(SessionState::Associating),
            3 => Some(SessionState::Connected),
            -112 => Some(SessionState::Expired),
            -113 => Some(SessionState::AuthFailed),
            999 => Some(SessionState::NotConnected),
            _ => None,
        }
    }

    /// No automatic reconnection happens out of a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Closed | SessionState::Expired | SessionState::AuthFailed
        )
    }

    /// Status surfaced to operations submitted in a terminal state.
    pub(crate) fn terminal_status(&self) -> Option<ZkError> {
        match self {
            SessionState::Expired => Some(ZkError::SessionExpired),
            SessionState::AuthFailed => Some(ZkError::AuthFailed),
            SessionState::Closed => Some(ZkError::Closing),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            SessionState::NotConnected => "NOT_CONNECTED",
            SessionState::Connecting => "CONNECTING",
            SessionState::Associating => "ASSOCIATING",
            SessionState::Connected => "CONNECTED",
            SessionState::Closed => "CLOSED",
            SessionState::Expired => "EXPIRED",
            SessionState::AuthFailed => "AUTH_FAILED",
        };
        f.write_str(name)
    }
}

/// Kind of event delivered to a watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    Created,
    Deleted,
    Changed,
    Child,
    /// Session state transition, not tied to a path
    Session,
    /// Subscription was discarded without its event firing
    NotWatching,
}

impl EventType {
    pub fn code(&self) -> i32 {
        match self {
            EventType::Created => 1,
            EventType::Deleted => 2,
            EventType::Changed => 3,
            EventType::Child => 4,
            EventType::Session => -1,
            EventType::NotWatching => -2,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(EventType::Created),
            2 => Some(EventType::Deleted),
            3 => Some(EventType::Changed),
            4 => Some(EventType::Child),
            -1 => Some(EventType::Session),
            -2 => Some(EventType::NotWatching),
            _ => None,
        }
    }

    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            EventType::Created => "created",
            EventType::Deleted => "deleted",
            EventType::Changed => "changed",
            EventType::Child => "child",
            EventType::Session => "session",
            EventType::NotWatching => "not_watching",
        }
    }
}

/// Subscription kind a read operation can leave behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WatchKind {
    /// Left by `get`
    Data,
    /// Left by `exists`
    Exists,
    /// Left by `get_children`
    Child,
}

impl WatchKind {
    /// Whether an event of `event_type` satisfies a subscription of this kind.
    pub fn is_triggered_by(
        &self,
        event_type: EventType,
    ) -> bool {
        match (self, event_type) {
            (WatchKind::Data, EventType::Created | EventType::Deleted | EventType::Changed) => true,
            (WatchKind::Exists, EventType::Created | EventType::Deleted | EventType::Changed) => true,
            (WatchKind::Child, EventType::Deleted | EventType::Child) => true,
            _ => false,
        }
    }
}

/// Event handed to a watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedEvent {
    pub event_type: EventType,
    pub state: SessionState,
    /// Path relative to the chroot, `None` for session events
    pub path: Option<String>,
}

impl WatchedEvent {
    pub(crate) fn session(state: SessionState) -> Self {
        Self {
            event_type: EventType::Session,
            state,
            path: None,
        }
    }
}

/// Receives watch and session events. Invoked from the dispatcher thread.
pub trait Watcher: Send + Sync + 'static {
    fn process(
        &self,
        event: WatchedEvent,
    );
}

pub type WatcherRef = Arc<dyn Watcher>;

impl<F> Watcher for F
where F: Fn(WatchedEvent) + Send + Sync + 'static
{
    fn process(
        &self,
        event: WatchedEvent,
    ) {
        self(event)
    }
}

/// Forwards events into an async channel.
pub struct ChannelWatcher {
    tx: mpsc::UnboundedSender<WatchedEvent>,
}

impl ChannelWatcher {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<WatchedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl Watcher for ChannelWatcher {
    fn process(
        &self,
        event: WatchedEvent,
    ) {
        if self.tx.send(event).is_err() {
            trace!("watch receiver dropped");
        }
    }
}
