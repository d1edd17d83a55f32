//! Session identity and lifecycle.
//!
//! The session outlives individual connections: its id and password are
//! replayed on every handshake so the ensemble can resume it on any member.
//! Only the worker task mutates it; readers observe the published state
//! through a `watch` channel and the published [`SessionInfo`].

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::watch;
use tracing::debug;
use tracing::info;

use crate::proto::ConnectRequest;
use crate::proto::ConnectResponse;
use crate::proto::PROTOCOL_VERSION;
use crate::utils::time::duration_to_ms_i32;
use crate::utils::time::ms_i32_to_duration;
use crate::ClientId;
use crate::Result;
use crate::SessionError;
use crate::SessionState;

/// Snapshot readable from any thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SessionInfo {
    /// `0` until the first successful handshake
    pub(crate) session_id: i64,
    pub(crate) passwd: Vec<u8>,
    /// Negotiated timeout, or the requested one before negotiation
    pub(crate) timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HandshakeOutcome {
    /// A brand-new session was issued
    Created,
    /// The existing session was resumed on this member
    Resumed,
    /// The session we asked for no longer exists
    Expired,
}

#[derive(Debug)]
pub(crate) struct Session {
    state: SessionState,
    session_id: i64,
    passwd: Vec<u8>,
    requested_timeout: Duration,
    negotiated_timeout: Option<Duration>,
    /// Highest zxid observed in any reply
    last_zxid: i64,

    state_tx: watch::Sender<SessionState>,
    info: Arc<ArcSwap<SessionInfo>>,
}

impl Session {
    pub(crate) fn new(
        requested_timeout: Duration,
        resume: Option<ClientId>,
        state_tx: watch::Sender<SessionState>,
        info: Arc<ArcSwap<SessionInfo>>,
    ) -> Self {
        let (session_id, passwd) = resume.map(|id| (id.session_id, id.passwd)).unwrap_or_default();
        let session = Self {
            state: SessionState::NotConnected,
            session_id,
            passwd,
            requested_timeout,
            negotiated_timeout: None,
            last_zxid: 0,
            state_tx,
            info,
        };
        session.publish_info();
        session
    }

    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn session_id(&self) -> i64 {
        self.session_id
    }

    pub(crate) fn has_session(&self) -> bool {
        self.session_id != 0
    }

    pub(crate) fn last_zxid(&self) -> i64 {
        self.last_zxid
    }

    /// Timeout that governs heartbeats and reconnect pacing.
    pub(crate) fn timeout(&self) -> Duration {
        self.negotiated_timeout.unwrap_or(self.requested_timeout)
    }

    pub(crate) fn transition(
        &mut self,
        to: SessionState,
    ) -> Result<()> {
        if !Self::is_allowed(self.state, to) {
            return Err(SessionError::InvalidTransition { from: self.state, to }.into());
        }
        if self.state != to {
            info!(session_id = %format!("{:#x}", self.session_id), "session {} -> {}", self.state, to);
        }
        self.state = to;
        self.state_tx.send_replace(to);
        Ok(())
    }

    fn is_allowed(
        from: SessionState,
        to: SessionState,
    ) -> bool {
        use SessionState::*;
        match from {
            NotConnected => matches!(to, Connecting | Closed),
            Connecting => matches!(to, Connecting | Associating | Closed),
            Associating => matches!(to, Connecting | Connected | Expired | AuthFailed | Closed),
            Connected => matches!(to, Connecting | Expired | AuthFailed | Closed),
            Closed | Expired | AuthFailed => false,
        }
    }

    pub(crate) fn connect_request(&self) -> ConnectRequest {
        ConnectRequest {
            protocol_version: PROTOCOL_VERSION,
            last_zxid_seen: self.last_zxid,
            timeout_ms: duration_to_ms_i32(self.requested_timeout),
            session_id: self.session_id,
            passwd: self.passwd.clone(),
        }
    }

    /// Applies a handshake reply. A non-positive timeout, or a different id
    /// than the one being resumed, means the session is gone.
    pub(crate) fn on_handshake(
        &mut self,
        response: &ConnectResponse,
    ) -> HandshakeOutcome {
        if response.timeout_ms <= 0 {
            debug!(session_id = response.session_id, "handshake reports expired session");
            return HandshakeOutcome::Expired;
        }
        if self.has_session() && response.session_id != self.session_id {
            debug!(
                expected = self.session_id,
                received = response.session_id,
                "ensemble issued a new session instead of resuming"
            );
            return HandshakeOutcome::Expired;
        }

        let outcome = if self.has_session() {
            HandshakeOutcome::Resumed
        } else {
            HandshakeOutcome::Created
        };
        self.session_id = response.session_id;
        self.passwd = response.passwd.clone();
        self.negotiated_timeout = Some(ms_i32_to_duration(response.timeout_ms));
        self.publish_info();
        outcome
    }

    pub(crate) fn observe_zxid(
        &mut self,
        zxid: i64,
    ) {
        if zxid > self.last_zxid {
            self.last_zxid = zxid;
        }
    }

    fn publish_info(&self) {
        self.info.store(Arc::new(SessionInfo {
            session_id: self.session_id,
            passwd: self.passwd.clone(),
            timeout: self.timeout(),
        }));
    }
}
