//! In-process ensemble used by the engine's integration tests.
//!
//! Every member listens on its own loopback port and shares one data tree,
//! so a client failing over between members keeps seeing the same nodes and
//! sessions. Fault injection is driven through the control methods.

mod state;

use std::sync::Arc;

use bytes::Bytes;
use futures::SinkExt;
use futures::StreamExt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::codec::LengthDelimitedCodec;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;

use self::state::ConnEntry;
use self::state::EnsembleState;
use crate::proto::ConnectRequest;
use crate::proto::RequestPacket;

type ServerFramed = Framed<TcpStream, LengthDelimitedCodec>;

pub(crate) struct MockEnsemble {
    addrs: Vec<String>,
    members: Vec<CancellationToken>,
    root: CancellationToken,
    state: Arc<Mutex<EnsembleState>>,
}

impl MockEnsemble {
    pub(crate) async fn start(members: usize) -> Self {
        let root = CancellationToken::new();
        let state = Arc::new(Mutex::new(EnsembleState::default()));
        let mut addrs = Vec::with_capacity(members);
        let mut tokens = Vec::with_capacity(members);

        for member in 0..members {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock member");
            let addr = listener.local_addr().expect("local addr").to_string();
            let token = root.child_token();
            tokio::spawn(accept_loop(member, listener, state.clone(), token.clone()));
            debug!(member, %addr, "mock member listening");
            addrs.push(addr);
            tokens.push(token);
        }

        Self {
            addrs,
            members: tokens,
            root,
            state,
        }
    }

    /// Comma separated member addresses, ready for `Client::builder`.
    pub(crate) fn hosts(&self) -> String {
        self.addrs.join(",")
    }

    pub(crate) fn addr(
        &self,
        member: usize,
    ) -> &str {
        &self.addrs[member]
    }

    /// Expires the session server side and drops its connections.
    pub(crate) fn expire_session(
        &self,
        session_id: i64,
    ) {
        self.state.lock().expire_session(session_id);
    }

    pub(crate) fn has_session(
        &self,
        session_id: i64,
    ) -> bool {
        self.state.lock().has_session(session_id)
    }

    /// Drops every open connection. Sessions survive.
    pub(crate) fn drop_all_connections(&self) {
        for conn in self.state.lock().connections.values() {
            conn.cancel.cancel();
        }
    }

    /// Stops the member's listener and its connections for good.
    pub(crate) fn stop_member(
        &self,
        member: usize,
    ) {
        self.members[member].cancel();
    }

    /// Member currently serving `session_id`, if connected.
    pub(crate) fn member_of(
        &self,
        session_id: i64,
    ) -> Option<usize> {
        self.state
            .lock()
            .connections
            .values()
            .find(|c| c.session_id == session_id && !c.cancel.is_cancelled())
            .map(|c| c.member)
    }

    /// While muted, requests are read and counted but nothing is answered,
    /// handshakes included.
    pub(crate) fn set_mute(
        &self,
        muted: bool,
    ) {
        self.state.lock().muted = muted;
    }

    /// The next operation reply carries a wrong xid.
    pub(crate) fn corrupt_next_xid(&self) {
        self.state.lock().corrupt_next_xid = true;
    }

    pub(crate) fn ping_count(&self) -> usize {
        self.state.lock().ping_count
    }

    pub(crate) fn requests_received(&self) -> usize {
        self.state.lock().requests_received
    }

    pub(crate) fn connections_accepted(&self) -> usize {
        self.state.lock().connections_accepted
    }

    pub(crate) fn node_exists(
        &self,
        path: &str,
    ) -> bool {
        self.state.lock().node(path).is_some()
    }

    pub(crate) fn node_data(
        &self,
        path: &str,
    ) -> Option<Vec<u8>> {
        self.state.lock().node(path).map(|n| n.data.clone())
    }
}

impl Drop for MockEnsemble {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

async fn accept_loop(
    member: usize,
    listener: TcpListener,
    state: Arc<Mutex<EnsembleState>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(member, "mock member stopped");
                return;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        trace!(member, %peer, "accepted");
                        tokio::spawn(serve_connection(member, stream, state.clone(), cancel.child_token()));
                    }
                    Err(e) => {
                        debug!(member, "accept failed: {:?}", e);
                        return;
                    }
                }
            }
        }
    }
}

async fn serve_connection(
    member: usize,
    stream: TcpStream,
    state: Arc<Mutex<EnsembleState>>,
    cancel: CancellationToken,
) {
    let _ = stream.set_nodelay(true);
    let mut framed = Framed::new(stream, LengthDelimitedCodec::new());

    let first = tokio::select! {
        _ = cancel.cancelled() => return,
        frame = framed.next() => frame,
    };
    let Some(Ok(frame)) = first else { return };
    let Ok(request) = bincode::deserialize::<ConnectRequest>(&frame) else {
        return;
    };

    let response = {
        let mut state = state.lock();
        state.connections_accepted += 1;
        if state.muted {
            None
        } else {
            Some(state.handshake(&request))
        }
    };
    let Some(response) = response else {
        hold_silently(&mut framed, &cancel).await;
        return;
    };
    if response.timeout_ms <= 0 {
        let _ = write(&mut framed, &response).await;
        return;
    }

    let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel();
    let conn_id = state.lock().register_connection(ConnEntry::new(
        response.session_id,
        member,
        outbox_tx,
        cancel.clone(),
    ));
    if !write(&mut framed, &response).await {
        state.lock().unregister_connection(conn_id);
        return;
    }

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            Some(frame) = outbox_rx.recv() => {
                if !write(&mut framed, &frame).await {
                    break;
                }
            }
            incoming = framed.next() => {
                let Some(Ok(bytes)) = incoming else { break };
                let Ok(packet) = bincode::deserialize::<RequestPacket>(&bytes) else { break };
                let handled = {
                    let mut state = state.lock();
                    state.requests_received += 1;
                    if state.muted {
                        None
                    } else {
                        Some(state.handle(conn_id, packet.xid, packet.request))
                    }
                };
                let Some(handled) = handled else { continue };

                let mut ok = true;
                for frame in &handled.frames {
                    if !write(&mut framed, frame).await {
                        ok = false;
                        break;
                    }
                }
                if !ok || handled.close {
                    break;
                }
            }
        }
    }

    state.lock().unregister_connection(conn_id);
    trace!(member, conn_id, "connection closed");
}

/// Keeps the socket open without answering until the peer gives up.
async fn hold_silently(
    framed: &mut ServerFramed,
    cancel: &CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            frame = framed.next() => {
                if !matches!(frame, Some(Ok(_))) {
                    return;
                }
            }
        }
    }
}

async fn write<T: Serialize>(
    framed: &mut ServerFramed,
    packet: &T,
) -> bool {
    match bincode::serialize(packet) {
        Ok(bytes) => framed.send(Bytes::from(bytes)).await.is_ok(),
        Err(_) => false,
    }
}
