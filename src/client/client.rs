use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tracing::debug;
use tracing::error;

use super::ClientBuilder;
use crate::core::Command;
use crate::core::PendingRequest;
use crate::core::SessionInfo;
use crate::utils::path::Chroot;
use crate::utils::scoped_timer::ScopedTimer;
use crate::Acl;
use crate::ClientId;
use crate::ClientResult;
use crate::Completion;
use crate::CreateMode;
use crate::OpResult;
use crate::Operation;
use crate::SessionState;
use crate::Stat;
use crate::WatcherRef;
use crate::ZkError;

/// Handle to one session engine.
///
/// Cheap to clone; all clones share the same session. The session is closed
/// by [`close`](Client::close) or when the last clone is dropped.
#[derive(Clone)]
pub struct Client {
    pub(super) inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    pub(super) cmd_tx: mpsc::UnboundedSender<Command>,
    pub(super) state_rx: watch::Receiver<SessionState>,
    pub(super) info: Arc<ArcSwap<SessionInfo>>,
    pub(super) chroot: Chroot,
    pub(super) resend: bool,
    pub(super) operation_timeout: Option<Duration>,
    pub(super) closed: AtomicBool,
}

impl std::fmt::Debug for Client {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state())
            .field("chroot", &self.inner.chroot.as_deref())
            .finish_non_exhaustive()
    }
}

impl Client {
    pub fn builder(hosts: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(hosts)
    }

    /// Queues an operation. Returns as soon as it is accepted; `completion`
    /// is then resolved exactly once from the dispatcher.
    ///
    /// Rejections (bad path, bad watcher, closed or terminal engine) are
    /// returned here and the completion is dropped without being invoked.
    pub fn submit(
        &self,
        op: Operation,
        watcher: Option<WatcherRef>,
        completion: Completion,
    ) -> ClientResult<()> {
        self.ensure_usable()?;
        let (request, watch) = op.into_request(&self.inner.chroot, watcher)?;
        let pending = PendingRequest::new(request, watch, completion, self.inner.resend);
        self.inner
            .cmd_tx
            .send(Command::Submit(pending))
            .map_err(|_| ZkError::InvalidState)
    }

    /// Creates a node and returns its actual path (with the sequence suffix
    /// for sequential nodes).
    pub async fn create(
        &self,
        path: &str,
        data: &[u8],
        acl: Vec<Acl>,
        mode: CreateMode,
    ) -> ClientResult<String> {
        let _timer = ScopedTimer::with_path("create", path);
        let op = Operation::Create {
            path: path.to_string(),
            data: data.to_vec(),
            acl,
            mode,
        };
        match self.call(op, None).await? {
            OpResult::Created(path) => Ok(path),
            other => Err(unexpected(other)),
        }
    }

    /// Deletes a node if its version matches (`-1` skips the check).
    pub async fn delete(
        &self,
        path: &str,
        version: i32,
    ) -> ClientResult<()> {
        let _timer = ScopedTimer::with_path("delete", path);
        let op = Operation::Delete {
            path: path.to_string(),
            version,
        };
        match self.call(op, None).await? {
            OpResult::Empty => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Returns the node's stat, or `None` if it does not exist. A watcher is
    /// left behind in both cases and fires on creation, deletion or change.
    pub async fn exists(
        &self,
        path: &str,
        watcher: Option<WatcherRef>,
    ) -> ClientResult<Option<Stat>> {
        let _timer = ScopedTimer::with_path("exists", path);
        let op = Operation::Exists { path: path.to_string() };
        match self.call(op, watcher).await? {
            OpResult::Exists(stat) => Ok(stat),
            other => Err(unexpected(other)),
        }
    }

    /// Reads data and stat. A watcher fires on the next change or deletion.
    pub async fn get(
        &self,
        path: &str,
        watcher: Option<WatcherRef>,
    ) -> ClientResult<(Vec<u8>, Stat)> {
        let _timer = ScopedTimer::with_path("get", path);
        let op = Operation::GetData { path: path.to_string() };
        match self.call(op, watcher).await? {
            OpResult::Data(data, stat) => Ok((data, stat)),
            other => Err(unexpected(other)),
        }
    }

    /// Like [`get`](Client::get) but returns at most `max_size` bytes of data.
    /// The stat still reports the full `data_length`.
    pub async fn get_limited(
        &self,
        path: &str,
        watcher: Option<WatcherRef>,
        max_size: usize,
    ) -> ClientResult<(Vec<u8>, Stat)> {
        let (mut data, stat) = self.get(path, watcher).await?;
        data.truncate(max_size);
        Ok((data, stat))
    }

    /// Writes data if the version matches (`-1` skips the check).
    pub async fn set(
        &self,
        path: &str,
        data: &[u8],
        version: i32,
    ) -> ClientResult<Stat> {
        let _timer = ScopedTimer::with_path("set", path);
        let op = Operation::SetData {
            path: path.to_string(),
            data: data.to_vec(),
            version,
        };
        match self.call(op, None).await? {
            OpResult::Stat(stat) => Ok(stat),
            other => Err(unexpected(other)),
        }
    }

    /// Lists child names. A watcher fires when a child is added or removed,
    /// or the node itself is deleted.
    pub async fn get_children(
        &self,
        path: &str,
        watcher: Option<WatcherRef>,
    ) -> ClientResult<Vec<String>> {
        let _timer = ScopedTimer::with_path("get_children", path);
        let op = Operation::GetChildren { path: path.to_string() };
        match self.call(op, watcher).await? {
            OpResult::Children(children) => Ok(children),
            other => Err(unexpected(other)),
        }
    }

    pub async fn get_acl(
        &self,
        path: &str,
    ) -> ClientResult<(Vec<Acl>, Stat)> {
        let _timer = ScopedTimer::with_path("get_acl", path);
        let op = Operation::GetAcl { path: path.to_string() };
        match self.call(op, None).await? {
            OpResult::Acl(acl, stat) => Ok((acl, stat)),
            other => Err(unexpected(other)),
        }
    }

    pub async fn set_acl(
        &self,
        path: &str,
        acl: Vec<Acl>,
        version: i32,
    ) -> ClientResult<Stat> {
        let _timer = ScopedTimer::with_path("set_acl", path);
        let op = Operation::SetAcl {
            path: path.to_string(),
            acl,
            version,
        };
        match self.call(op, None).await? {
            OpResult::Stat(stat) => Ok(stat),
            other => Err(unexpected(other)),
        }
    }

    /// Adds credentials to the session. They are replayed on every reconnect.
    /// A rejected credential is fatal: the session moves to AUTH_FAILED.
    pub async fn add_auth(
        &self,
        scheme: &str,
        auth: &[u8],
    ) -> ClientResult<()> {
        let _timer = ScopedTimer::new("add_auth");
        self.ensure_usable()?;
        let (tx, rx) = oneshot::channel();
        self.inner
            .cmd_tx
            .send(Command::AddAuth {
                scheme: scheme.to_string(),
                auth: auth.to_vec(),
                completion: Completion::Channel(tx),
            })
            .map_err(|_| ZkError::InvalidState)?;
        self.await_result(rx).await.map(|_| ())
    }

    /// Replaces the default watcher. Session events from now on go to
    /// `watcher`; events already handed to the dispatcher are not redirected.
    pub fn set_watcher(
        &self,
        watcher: WatcherRef,
    ) -> ClientResult<()> {
        self.ensure_usable()?;
        self.inner
            .cmd_tx
            .send(Command::SetWatcher(watcher))
            .map_err(|_| ZkError::InvalidState)
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state_rx.borrow()
    }

    /// Whether the engine will keep reconnecting on its own.
    pub fn is_recoverable(&self) -> bool {
        !self.state().is_terminal()
    }

    /// Session id and password, once a session has been established.
    pub fn client_id(&self) -> Option<ClientId> {
        let info = self.inner.info.load();
        (info.session_id != 0).then(|| ClientId {
            session_id: info.session_id,
            passwd: info.passwd.clone(),
        })
    }

    /// Negotiated session timeout (the requested one before negotiation).
    pub fn recv_timeout(&self) -> Duration {
        self.inner.info.load().timeout
    }

    /// Waits until the session reaches `target`.
    ///
    /// Fails with the terminal status if the session ends in another state,
    /// or OPERATIONTIMEOUT after `timeout`.
    pub async fn wait_for_state(
        &self,
        target: SessionState,
        timeout: Duration,
    ) -> ClientResult<()> {
        let mut rx = self.inner.state_rx.clone();
        let wait = async move {
            loop {
                let current = *rx.borrow_and_update();
                if current == target {
                    return Ok(());
                }
                if current.is_terminal() {
                    return Err(current.terminal_status().unwrap_or(ZkError::InvalidState));
                }
                if rx.changed().await.is_err() {
                    let last = *rx.borrow();
                    return if last == target {
                        Ok(())
                    } else {
                        Err(last.terminal_status().unwrap_or(ZkError::Closing))
                    };
                }
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| ZkError::OperationTimeout)?
    }

    /// Closes the session. Pending operations complete with CLOSING and no
    /// watch event is delivered afterwards. Idempotent.
    pub async fn close(&self) -> ClientResult<()> {
        self.inner.closed.store(true, Ordering::Release);
        let (tx, rx) = oneshot::channel();
        if self.inner.cmd_tx.send(Command::Close(tx)).is_err() {
            debug!("session worker already stopped");
            return Ok(());
        }
        let _ = rx.await;
        Ok(())
    }

    fn ensure_usable(&self) -> ClientResult<()> {
        if self.inner.closed.load(Ordering::Acquire) || self.state().is_terminal() {
            return Err(ZkError::InvalidState);
        }
        Ok(())
    }

    async fn call(
        &self,
        op: Operation,
        watcher: Option<WatcherRef>,
    ) -> ClientResult<OpResult> {
        let (tx, rx) = oneshot::channel();
        self.submit(op, watcher, Completion::Channel(tx))?;
        self.await_result(rx).await
    }

    async fn await_result(
        &self,
        rx: oneshot::Receiver<ClientResult<OpResult>>,
    ) -> ClientResult<OpResult> {
        let received = match self.inner.operation_timeout {
            Some(timeout) => tokio::time::timeout(timeout, rx)
                .await
                .map_err(|_| ZkError::OperationTimeout)?,
            None => rx.await,
        };
        // The worker resolves every completion; a dropped sender means it is gone.
        received.unwrap_or(Err(ZkError::Closing))
    }
}

fn unexpected(result: OpResult) -> ZkError {
    error!(?result, "result does not match the operation");
    ZkError::MarshallingError
}
