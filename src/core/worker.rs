//! The session worker: the single task that owns the connection and every
//! piece of session state.
//!
//! Client handles talk to it only through [`Command`]s. It alternates between
//! two phases:
//!
//! ```text
//!   establish: backoff -> dial next member -> handshake   (commands are queued)
//!        |
//!        v
//!   serve:     replay auth -> re-arm watches -> flush queue
//!              loop { command | reply | heartbeat tick }
//!        |
//!        +-- connection lost --> back to establish
//!        +-- close / expiry / auth failure / retries exhausted --> finish
//! ```
//!
//! Callbacks never run here; results go to the [`Dispatcher`].

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::AuthStore;
use super::Command;
use super::Dispatcher;
use super::HandshakeOutcome;
use super::HeartbeatTimer;
use super::PendingRequest;
use super::RequestPipeline;
use super::Session;
use super::SessionInfo;
use super::WatchRegistry;
use crate::metrics::IN_FLIGHT_REQUESTS;
use crate::metrics::PINGS_SENT;
use crate::metrics::RECONNECTS;
use crate::metrics::REQUESTS_SENT;
use crate::metrics::REQUEST_ERRORS;
use crate::metrics::REQUEST_LATENCY_MS;
use crate::metrics::SESSION_EXPIRATIONS;
use crate::network::Connection;
use crate::network::ConnectionManager;
use crate::network::HostList;
use crate::proto::ReplyPacket;
use crate::proto::Request;
use crate::proto::RequestPacket;
use crate::proto::Response;
use crate::proto::AUTH_XID;
use crate::proto::NOTIFICATION_XID;
use crate::proto::PING_XID;
use crate::proto::SET_WATCHES_XID;
use crate::utils::path::Chroot;
use crate::ClientConfig;
use crate::ClientId;
use crate::ClientResult;
use crate::Codec;
use crate::Error;
use crate::EventType;
use crate::NetworkError;
use crate::OpResult;
use crate::ProtocolError;
use crate::SessionState;
use crate::WatchedEvent;
use crate::WatcherRef;
use crate::ZkError;

/// Everything the worker needs besides its channels.
pub(crate) struct WorkerSetup {
    pub(crate) config: ClientConfig,
    pub(crate) codec: Arc<dyn Codec>,
    pub(crate) hosts: HostList,
    pub(crate) default_watcher: Option<WatcherRef>,
    pub(crate) resume: Option<ClientId>,
}

/// Why the worker stops.
#[derive(Debug)]
enum Exit {
    /// Explicit close or every client handle dropped
    Close(Option<Connection>),
    /// Session expired or authentication failed
    Fatal(SessionState),
    /// Reconnect attempts exhausted
    Exhausted(usize),
}

enum Served {
    Lost(String, Error),
    Exit(Exit),
}

/// A write that did not complete.
enum Stop {
    Lost(Error),
    Exit(Exit),
}

enum Step {
    Command(Option<Command>),
    Reply(crate::Result<ReplyPacket>),
    Tick,
}

enum Waited<T> {
    Command(Option<Command>),
    Done(T),
}

enum ReplyOutcome {
    Continue,
    Lost(Error),
    Fatal(SessionState),
}

pub(crate) struct SessionWorker {
    config: ClientConfig,
    codec: Arc<dyn Codec>,
    chroot: Chroot,
    manager: ConnectionManager,
    session: Session,
    pipeline: RequestPipeline,
    watches: WatchRegistry,
    auth: AuthStore,
    dispatcher: Dispatcher,
    default_watcher: Option<WatcherRef>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    /// Commands received while a write was in progress
    backlog: VecDeque<Command>,
    close_waiters: Vec<oneshot::Sender<()>>,
}

impl SessionWorker {
    pub(crate) fn new(
        setup: WorkerSetup,
        cmd_rx: mpsc::UnboundedReceiver<Command>,
        state_tx: watch::Sender<SessionState>,
        info: Arc<ArcSwap<SessionInfo>>,
        dispatcher: Dispatcher,
    ) -> Self {
        let WorkerSetup {
            config,
            codec,
            hosts,
            default_watcher,
            resume,
        } = setup;

        let manager = ConnectionManager::new(
            hosts.servers,
            config.connection.deterministic_conn_order,
            config.connection.connect_timeout(),
            config.retry.reconnect,
        );
        let session = Session::new(config.session.session_timeout(), resume, state_tx, info);

        Self {
            config,
            codec,
            chroot: hosts.chroot,
            manager,
            session,
            pipeline: RequestPipeline::new(),
            watches: WatchRegistry::default(),
            auth: AuthStore::default(),
            dispatcher,
            default_watcher,
            cmd_rx,
            backlog: VecDeque::new(),
            close_waiters: Vec::new(),
        }
    }

    pub(crate) async fn run(mut self) {
        let exit = self.run_loop().await;
        self.finish(exit).await;
    }

    async fn run_loop(&mut self) -> Exit {
        loop {
            let conn = match self.establish().await {
                Ok(conn) => conn,
                Err(exit) => return exit,
            };
            match self.serve(conn).await {
                Served::Exit(exit) => return exit,
                Served::Lost(addr, e) => self.on_connection_loss(&addr, e),
            }
        }
    }

    //---
    // establish phase

    async fn establish(&mut self) -> std::result::Result<Connection, Exit> {
        self.set_state(SessionState::Connecting);
        loop {
            let session_timeout = self.session.timeout();
            let delay = self.manager.backoff_delay(session_timeout);
            if !delay.is_zero() {
                debug!(?delay, "backing off before next connect attempt");
                self.with_commands(tokio::time::sleep(delay)).await?;
            }

            let addr = self.manager.next_server();
            if self.session.has_session() || self.manager.failed_attempts() > 0 {
                RECONNECTS.inc();
            }
            debug!(%addr, "connecting");
            let attempt = Connection::establish(
                addr.clone(),
                self.codec.clone(),
                self.config.connection.clone(),
                self.session.connect_request(),
                self.manager.attempt_timeout(session_timeout),
            );

            match self.with_commands(attempt).await? {
                Ok((conn, response)) => {
                    self.set_state(SessionState::Associating);
                    match self.session.on_handshake(&response) {
                        HandshakeOutcome::Expired => {
                            warn!(%addr, "session expired");
                            return Err(Exit::Fatal(SessionState::Expired));
                        }
                        outcome => {
                            info!(
                                %addr,
                                ?outcome,
                                session_id = %format!("{:#x}", self.session.session_id()),
                                timeout = ?self.session.timeout(),
                                "session established"
                            );
                            self.manager.record_success();
                            return Ok(conn);
                        }
                    }
                }
                Err(e) => {
                    let failed = self.manager.record_failure();
                    warn!(%addr, attempt = failed, "connect attempt failed: {}", e);
                    if self.manager.is_exhausted() {
                        return Err(Exit::Exhausted(failed));
                    }
                }
            }
        }
    }

    /// Drives `fut` to completion while still accepting commands, so callers
    /// never block on a connect in progress.
    async fn with_commands<F: Future>(
        &mut self,
        fut: F,
    ) -> std::result::Result<F::Output, Exit> {
        tokio::pin!(fut);
        loop {
            let waited = match self.backlog.pop_front() {
                Some(cmd) => Waited::Command(Some(cmd)),
                None => tokio::select! {
                    biased;
                    cmd = self.cmd_rx.recv() => Waited::Command(cmd),
                    out = &mut fut => Waited::Done(out),
                },
            };
            match waited {
                Waited::Done(out) => return Ok(out),
                Waited::Command(None) => return Err(Exit::Close(None)),
                Waited::Command(Some(Command::Close(done))) => {
                    self.close_waiters.push(done);
                    return Err(Exit::Close(None));
                }
                Waited::Command(Some(Command::Submit(request))) => {
                    let xid = self.pipeline.enqueue(request);
                    trace!(xid, "queued while disconnected");
                }
                Waited::Command(Some(Command::AddAuth {
                    scheme,
                    auth,
                    completion,
                })) => {
                    self.auth.add(scheme, auth, completion, false);
                }
                Waited::Command(Some(Command::SetWatcher(watcher))) => {
                    self.default_watcher = Some(watcher);
                }
            }
        }
    }

    //---
    // serve phase

    async fn serve(
        &mut self,
        mut conn: Connection,
    ) -> Served {
        let addr = conn.addr().to_string();
        self.set_state(SessionState::Connected);
        self.notify_default(SessionState::Connected);

        let mut timer = HeartbeatTimer::new(
            self.session.timeout(),
            self.config.session.ping_interval_ratio,
            self.config.session.read_timeout_ratio,
        );
        trace!(ping = ?timer.ping_interval(), read = ?timer.read_timeout(), "heartbeat armed");

        let stopped = |addr: &str, stop: Stop| match stop {
            Stop::Lost(e) => Served::Lost(addr.to_string(), e),
            Stop::Exit(exit) => Served::Exit(exit),
        };

        if let Err(stop) = self.replay(&mut conn, &mut timer).await {
            return stopped(&addr, stop);
        }

        loop {
            if let Err(stop) = self.flush(&mut conn, &mut timer).await {
                return stopped(&addr, stop);
            }

            let step = match self.backlog.pop_front() {
                Some(cmd) => Step::Command(Some(cmd)),
                None => tokio::select! {
                    biased;
                    cmd = self.cmd_rx.recv() => Step::Command(cmd),
                    reply = conn.recv() => Step::Reply(reply),
                    _ = tokio::time::sleep_until(timer.next_deadline()) => Step::Tick,
                },
            };

            match step {
                Step::Command(None) => return Served::Exit(Exit::Close(Some(conn))),
                Step::Command(Some(Command::Close(done))) => {
                    self.close_waiters.push(done);
                    return Served::Exit(Exit::Close(Some(conn)));
                }
                Step::Command(Some(Command::Submit(request))) => {
                    self.pipeline.enqueue(request);
                }
                Step::Command(Some(Command::AddAuth {
                    scheme,
                    auth,
                    completion,
                })) => {
                    if let Some(request) = self.auth.add(scheme, auth, completion, true) {
                        if let Err(stop) = self.send_control(&mut conn, &mut timer, AUTH_XID, request).await {
                            return stopped(&addr, stop);
                        }
                    }
                }
                Step::Command(Some(Command::SetWatcher(watcher))) => {
                    self.default_watcher = Some(watcher);
                }
                Step::Reply(Ok(packet)) => {
                    timer.reset_read();
                    match self.on_reply(packet) {
                        ReplyOutcome::Continue => {}
                        ReplyOutcome::Lost(e) => return Served::Lost(addr, e),
                        ReplyOutcome::Fatal(state) => return Served::Exit(Exit::Fatal(state)),
                    }
                }
                Step::Reply(Err(e)) => return Served::Lost(addr, e),
                Step::Tick => {
                    if timer.is_read_expired() {
                        return Served::Lost(addr, NetworkError::HeartbeatTimeout(timer.read_timeout()).into());
                    }
                    if timer.is_ping_due() {
                        if let Err(stop) = self.send_control(&mut conn, &mut timer, PING_XID, Request::Ping).await {
                            return stopped(&addr, stop);
                        }
                        PINGS_SENT.inc();
                    }
                }
            }
        }
    }

    /// Restores session-scoped server state on a fresh connection:
    /// credentials first, then watches.
    async fn replay(
        &mut self,
        conn: &mut Connection,
        timer: &mut HeartbeatTimer,
    ) -> std::result::Result<(), Stop> {
        for request in self.auth.replay() {
            self.send_control(conn, timer, AUTH_XID, request).await?;
        }
        if let Some(request) = self.watches.set_watches_request(self.session.last_zxid()) {
            debug!(
                count = self.watches.len(),
                relative_zxid = self.session.last_zxid(),
                "re-arming watches"
            );
            self.send_control(conn, timer, SET_WATCHES_XID, request).await?;
        }
        Ok(())
    }

    /// Writes every queued request in order.
    async fn flush(
        &mut self,
        conn: &mut Connection,
        timer: &mut HeartbeatTimer,
    ) -> std::result::Result<(), Stop> {
        while let Some(request) = self.pipeline.pop_outbound() {
            let packet = RequestPacket {
                xid: request.xid,
                request: request.request.clone(),
            };
            match self.write(conn, timer, &packet).await {
                Ok(()) => {
                    timer.reset_ping();
                    REQUESTS_SENT.with_label_values(&[request.op_name()]).inc();
                    IN_FLIGHT_REQUESTS.inc();
                    self.pipeline.mark_sent(request);
                }
                // Encoding and size checks fail before anything is written.
                Err(Stop::Lost(e @ Error::Protocol(_))) => {
                    warn!(xid = request.xid, op = request.op_name(), "request rejected: {}", e);
                    self.fail(request, e.status());
                }
                Err(stop) => {
                    self.pipeline.requeue_front(request);
                    return Err(stop);
                }
            }
        }
        Ok(())
    }

    async fn send_control(
        &mut self,
        conn: &mut Connection,
        timer: &mut HeartbeatTimer,
        xid: i32,
        request: Request,
    ) -> std::result::Result<(), Stop> {
        self.write(conn, timer, &RequestPacket { xid, request }).await?;
        timer.reset_ping();
        Ok(())
    }

    /// Writes one packet, bounded by the read deadline. Commands keep being
    /// accepted while the write is pending and a close abandons it.
    async fn write(
        &mut self,
        conn: &mut Connection,
        timer: &HeartbeatTimer,
        packet: &RequestPacket,
    ) -> std::result::Result<(), Stop> {
        let read_timeout = timer.read_timeout();
        let send = tokio::time::timeout_at(timer.read_deadline(), conn.send(packet));
        tokio::pin!(send);

        loop {
            let waited = tokio::select! {
                biased;
                out = &mut send => Waited::Done(out),
                cmd = self.cmd_rx.recv() => Waited::Command(cmd),
            };
            match waited {
                Waited::Done(Ok(sent)) => return sent.map_err(Stop::Lost),
                Waited::Done(Err(_)) => {
                    warn!(xid = packet.xid, ?read_timeout, "write stalled");
                    return Err(Stop::Lost(NetworkError::HeartbeatTimeout(read_timeout).into()));
                }
                Waited::Command(None) => return Err(Stop::Exit(Exit::Close(None))),
                Waited::Command(Some(Command::Close(done))) => {
                    self.close_waiters.push(done);
                    return Err(Stop::Exit(Exit::Close(None)));
                }
                Waited::Command(Some(Command::SetWatcher(watcher))) => {
                    self.default_watcher = Some(watcher);
                }
                Waited::Command(Some(cmd)) => self.backlog.push_back(cmd),
            }
        }
    }

    //---
    // replies

    fn on_reply(
        &mut self,
        packet: ReplyPacket,
    ) -> ReplyOutcome {
        let ReplyPacket { header, response } = packet;
        self.session.observe_zxid(header.zxid);

        match header.xid {
            NOTIFICATION_XID => self.on_notification(response),
            PING_XID => {
                trace!("ping acknowledged");
                ReplyOutcome::Continue
            }
            AUTH_XID => self.on_auth_reply(header.err),
            SET_WATCHES_XID => {
                match ZkError::from_code(header.err) {
                    Ok(()) => debug!("watches re-armed"),
                    Err(e) => warn!("re-arming watches failed: {}", e),
                }
                ReplyOutcome::Continue
            }
            xid if xid > 0 => self.on_op_reply(xid, header.err, response),
            xid => ReplyOutcome::Lost(
                ProtocolError::UnexpectedXid {
                    expected: None,
                    received: xid,
                }
                .into(),
            ),
        }
    }

    fn on_notification(
        &mut self,
        response: Response,
    ) -> ReplyOutcome {
        let Response::Notification(notification) = response else {
            return ReplyOutcome::Lost(
                ProtocolError::UnexpectedResponse {
                    request: "notification",
                    response: response.name(),
                }
                .into(),
            );
        };
        let Some(event_type) = EventType::from_code(notification.event_type) else {
            warn!(code = notification.event_type, "ignoring unknown event type");
            return ReplyOutcome::Continue;
        };

        let watchers = self.watches.trigger(event_type, &notification.path);
        if watchers.is_empty() {
            debug!(path = %notification.path, ?event_type, "event without local watcher");
            return ReplyOutcome::Continue;
        }
        let event = WatchedEvent {
            event_type,
            state: self.session.state(),
            path: Some(self.chroot.strip(&notification.path)),
        };
        self.dispatcher.event(watchers, event);
        ReplyOutcome::Continue
    }

    fn on_auth_reply(
        &mut self,
        err: i32,
    ) -> ReplyOutcome {
        let completion = self.auth.on_reply();
        let status = ZkError::from_code(err);
        let outcome = match status {
            Err(ZkError::AuthFailed) => {
                warn!("authentication rejected by the ensemble");
                ReplyOutcome::Fatal(SessionState::AuthFailed)
            }
            _ => ReplyOutcome::Continue,
        };
        if let Some(completion) = completion {
            self.dispatcher.complete(completion, status.map(|()| OpResult::Empty));
        }
        outcome
    }

    fn on_op_reply(
        &mut self,
        xid: i32,
        err: i32,
        response: Response,
    ) -> ReplyOutcome {
        let request = match self.pipeline.match_reply(xid) {
            Ok(request) => request,
            Err(e) => return ReplyOutcome::Lost(e),
        };
        IN_FLIGHT_REQUESTS.dec();
        REQUEST_LATENCY_MS
            .with_label_values(&[request.op_name()])
            .observe(request.submit_time.elapsed().as_secs_f64() * 1000.0);

        let status = ZkError::from_code(err);
        if status == Err(ZkError::SessionExpired) {
            self.fail(request, ZkError::SessionExpired);
            return ReplyOutcome::Fatal(SessionState::Expired);
        }

        let PendingRequest {
            request: sent,
            watch,
            completion,
            ..
        } = request;
        match self.reply_result(&sent, status, response) {
            Ok(result) => {
                match &result {
                    Ok(_) => {
                        if let Some(intent) = watch {
                            self.watches.register(intent);
                        }
                    }
                    Err(e) => REQUEST_ERRORS.with_label_values(&[&e.code().to_string()]).inc(),
                }
                self.dispatcher.complete(completion, result);
                ReplyOutcome::Continue
            }
            Err(e) => {
                error!(xid, "{}", e);
                self.dispatcher.complete(completion, Err(e.status()));
                ReplyOutcome::Lost(e)
            }
        }
    }

    /// Typed result for a matched reply. An `Err` means the reply does not fit
    /// the request at all.
    fn reply_result(
        &self,
        request: &Request,
        status: ClientResult<()>,
        response: Response,
    ) -> crate::Result<ClientResult<OpResult>> {
        if let Err(code) = status {
            return Ok(match (request, code) {
                (Request::Exists { .. }, ZkError::NoNode) => Ok(OpResult::Exists(None)),
                _ => Err(code),
            });
        }

        let result = match (request, response) {
            (Request::Create { .. }, Response::Create { path }) => OpResult::Created(self.chroot.strip(&path)),
            (Request::Delete { .. }, Response::Empty) => OpResult::Empty,
            (Request::Exists { .. }, Response::Stat(stat)) => OpResult::Exists(Some(stat)),
            (Request::GetData { .. }, Response::Data { data, stat }) => OpResult::Data(data, stat),
            (Request::SetData { .. } | Request::SetAcl { .. }, Response::Stat(stat)) => OpResult::Stat(stat),
            (Request::GetAcl { .. }, Response::Acl { acl, stat }) => OpResult::Acl(acl, stat),
            (Request::GetChildren { .. }, Response::Children { children }) => OpResult::Children(children),
            (request, response) => {
                return Err(ProtocolError::UnexpectedResponse {
                    request: request.op_name(),
                    response: response.name(),
                }
                .into())
            }
        };
        Ok(Ok(result))
    }

    //---
    // transitions

    fn on_connection_loss(
        &mut self,
        addr: &str,
        e: Error,
    ) {
        warn!(%addr, "connection lost: {}", e);
        IN_FLIGHT_REQUESTS.sub(self.pipeline.in_flight_len() as i64);
        for request in self.pipeline.on_connection_loss() {
            self.fail(request, ZkError::ConnectionLoss);
        }
        self.auth.on_connection_loss();
        self.set_state(SessionState::Connecting);
        self.notify_default(SessionState::Connecting);
    }

    async fn finish(
        mut self,
        exit: Exit,
    ) {
        match exit {
            Exit::Close(conn) => self.close(conn).await,
            Exit::Fatal(state) => {
                let status = state.terminal_status().unwrap_or(ZkError::SystemError);
                self.terminate(state, status);
            }
            Exit::Exhausted(attempts) => {
                error!(attempts, "reconnect attempts exhausted, giving up");
                self.terminate(SessionState::Closed, ZkError::ConnectionLoss);
            }
        }

        // Commands that raced with shutdown still get a terminal status.
        self.cmd_rx.close();
        let status = self.session.state().terminal_status().unwrap_or(ZkError::Closing);
        let mut leftover: Vec<Command> = self.backlog.drain(..).collect();
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            leftover.push(cmd);
        }
        for cmd in leftover {
            match cmd {
                Command::Submit(request) => self.dispatcher.complete(request.completion, Err(status)),
                Command::AddAuth { completion, .. } => self.dispatcher.complete(completion, Err(status)),
                Command::SetWatcher(_) => {}
                Command::Close(done) => self.close_waiters.push(done),
            }
        }

        let waiters = std::mem::take(&mut self.close_waiters);
        self.dispatcher.shutdown().await;
        for done in waiters {
            let _ = done.send(());
        }
        debug!("session worker stopped");
    }

    /// Explicit close: nothing is delivered afterwards except CLOSING
    /// statuses for pending work.
    async fn close(
        &mut self,
        conn: Option<Connection>,
    ) {
        info!(session_id = %format!("{:#x}", self.session.session_id()), "closing session");
        self.dispatcher.begin_close();

        IN_FLIGHT_REQUESTS.sub(self.pipeline.in_flight_len() as i64);
        for request in self.pipeline.drain_all() {
            self.dispatcher.complete(request.completion, Err(ZkError::Closing));
        }
        for completion in self.auth.take_waiting() {
            self.dispatcher.complete(completion, Err(ZkError::Closing));
        }
        self.watches.drain();

        if let Some(mut conn) = conn {
            if self.session.has_session() {
                self.close_session(&mut conn).await;
            }
        }
        self.set_state(SessionState::Closed);
    }

    /// Best effort: ask the ensemble to end the session now rather than at
    /// timeout, so ephemeral nodes disappear promptly.
    async fn close_session(
        &mut self,
        conn: &mut Connection,
    ) {
        let xid = self.pipeline.allocate_xid();
        let close_timeout = self.config.session.close_timeout();
        let exchange = async {
            conn.send(&RequestPacket {
                xid,
                request: Request::CloseSession,
            })
            .await?;
            loop {
                let reply = conn.recv().await?;
                if reply.header.xid == xid {
                    return Ok::<(), Error>(());
                }
            }
        };
        match tokio::time::timeout(close_timeout, exchange).await {
            Ok(Ok(())) => debug!("session close acknowledged"),
            Ok(Err(e)) => warn!("session close failed: {}", e),
            Err(_) => warn!(?close_timeout, "session close not acknowledged"),
        }
    }

    /// Fatal end of the session: pending work fails with `status`, every
    /// discarded watch gets a final NOTWATCHING event and the default watcher
    /// learns the new state.
    fn terminate(
        &mut self,
        state: SessionState,
        status: ZkError,
    ) {
        self.set_state(state);
        if state == SessionState::Expired {
            SESSION_EXPIRATIONS.inc();
        }

        IN_FLIGHT_REQUESTS.sub(self.pipeline.in_flight_len() as i64);
        for request in self.pipeline.drain_all() {
            self.fail(request, status);
        }
        for completion in self.auth.take_waiting() {
            self.dispatcher.complete(completion, Err(status));
        }
        for (path, watcher) in self.watches.drain() {
            let event = WatchedEvent {
                event_type: EventType::NotWatching,
                state,
                path: Some(self.chroot.strip(&path)),
            };
            self.dispatcher.event(vec![watcher], event);
        }
        self.notify_default(state);
    }

    //---
    // helpers

    fn set_state(
        &mut self,
        to: SessionState,
    ) {
        if let Err(e) = self.session.transition(to) {
            error!("{}", e);
        }
    }

    fn notify_default(
        &self,
        state: SessionState,
    ) {
        if let Some(watcher) = &self.default_watcher {
            self.dispatcher.event(vec![watcher.clone()], WatchedEvent::session(state));
        }
    }

    fn fail(
        &self,
        request: PendingRequest,
        status: ZkError,
    ) {
        trace!(xid = request.xid, op = request.op_name(), %status, "failing request");
        REQUEST_ERRORS.with_label_values(&[&status.code().to_string()]).inc();
        self.dispatcher.complete(request.completion, Err(status));
    }
}
