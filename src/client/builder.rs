use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::error;
use tracing::info;

use super::Client;
use super::ClientInner;
use crate::core::Dispatcher;
use crate::core::SessionInfo;
use crate::core::SessionWorker;
use crate::core::WorkerSetup;
use crate::network::HostList;
use crate::BackoffPolicy;
use crate::BincodeCodec;
use crate::ClientConfig;
use crate::ClientId;
use crate::ClientResult;
use crate::Codec;
use crate::SessionState;
use crate::WatcherRef;
use crate::ZkError;

pub struct ClientBuilder {
    hosts: String,
    config: ClientConfig,
    default_watcher: Option<WatcherRef>,
    resume: Option<ClientId>,
    codec: Arc<dyn Codec>,
}

impl ClientBuilder {
    /// Create a new builder with default config.
    ///
    /// `hosts` is `host1:port1,host2:port2` optionally followed by a chroot
    /// path, e.g. `"10.0.0.1:2181,10.0.0.2:2181/app"`.
    pub fn new(hosts: impl Into<String>) -> Self {
        Self {
            hosts: hosts.into(),
            config: ClientConfig::default(),
            default_watcher: None,
            resume: None,
            codec: Arc::new(BincodeCodec),
        }
    }

    /// Requested session timeout (default: 10s). The ensemble may negotiate
    /// a different value.
    pub fn session_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.config.session.session_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Watcher receiving every session state change.
    pub fn default_watcher(
        mut self,
        watcher: WatcherRef,
    ) -> Self {
        self.default_watcher = Some(watcher);
        self
    }

    /// Try servers in the configured order instead of a shuffled one
    /// (default: shuffled).
    pub fn deterministic_conn_order(
        mut self,
        enable: bool,
    ) -> Self {
        self.config.connection.deterministic_conn_order = enable;
        self
    }

    /// Resume an existing session instead of creating a new one.
    pub fn resume_session(
        mut self,
        client_id: ClientId,
    ) -> Self {
        self.resume = Some(client_id);
        self
    }

    /// Replace the default bincode codec.
    pub fn codec(
        mut self,
        codec: Arc<dyn Codec>,
    ) -> Self {
        self.codec = codec;
        self
    }

    /// Re-send in-flight requests after a reconnect (default: enabled).
    /// When disabled they fail with CONNECTIONLOSS.
    pub fn resend_on_connection_loss(
        mut self,
        enable: bool,
    ) -> Self {
        self.config.session.resend_on_connection_loss = enable;
        self
    }

    /// Upper bound a typed operation waits for its result (default: none).
    pub fn operation_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.config.session.operation_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Per-attempt connect + handshake timeout (default: 1s).
    pub fn connect_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.config.connection.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Reconnect pacing and retry limit.
    pub fn reconnect_policy(
        mut self,
        policy: BackoffPolicy,
    ) -> Self {
        self.config.retry.reconnect = policy;
        self
    }

    /// Completely replaces the configuration
    ///
    /// # Warning: Configuration Override
    /// This will discard all previous settings configured through individual
    /// methods like [`session_timeout`](ClientBuilder::session_timeout) or
    /// [`connect_timeout`](ClientBuilder::connect_timeout).
    pub fn set_config(
        mut self,
        config: ClientConfig,
    ) -> Self {
        self.config = config;
        self
    }

    /// Starts the engine and returns immediately; the session is established
    /// in the background. Must be called inside a tokio runtime.
    pub fn build(self) -> ClientResult<Client> {
        self.config.validate().map_err(|e| {
            error!("invalid client config: {}", e);
            e.status()
        })?;
        let hosts = HostList::parse(&self.hosts)?;
        let runtime = Handle::try_current().map_err(|e| {
            error!("client must be built inside a tokio runtime: {}", e);
            ZkError::SystemError
        })?;
        let dispatcher = Dispatcher::start().map_err(|e| {
            error!("failed to start dispatcher thread: {}", e);
            ZkError::SystemError
        })?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::NotConnected);
        let info = Arc::new(ArcSwap::from_pointee(SessionInfo::default()));
        let chroot = hosts.chroot.clone();

        info!(hosts = %self.hosts, "starting session engine");
        let worker = SessionWorker::new(
            WorkerSetup {
                config: self.config.clone(),
                codec: self.codec,
                hosts,
                default_watcher: self.default_watcher,
                resume: self.resume,
            },
            cmd_rx,
            state_tx,
            info.clone(),
            dispatcher,
        );
        runtime.spawn(worker.run());

        Ok(Client {
            inner: Arc::new(ClientInner {
                cmd_tx,
                state_rx,
                info,
                chroot,
                resend: self.config.session.resend_on_connection_loss,
                operation_timeout: self.config.session.operation_timeout(),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Like [`build`](ClientBuilder::build) but waits until the session is
    /// CONNECTED, giving up after one session timeout.
    pub async fn connect(self) -> ClientResult<Client> {
        let wait = self.config.session.session_timeout();
        let client = self.build()?;
        if let Err(e) = client.wait_for_state(SessionState::Connected, wait).await {
            client.close().await?;
            return Err(e);
        }
        Ok(client)
    }
}
