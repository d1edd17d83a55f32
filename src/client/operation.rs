use std::fmt;

use tokio::sync::oneshot;
use tracing::trace;

use crate::core::WatchIntent;
use crate::proto::Request;
use crate::utils::path::validate_path;
use crate::utils::path::Chroot;
use crate::Acl;
use crate::ClientResult;
use crate::CreateMode;
use crate::Stat;
use crate::WatchKind;
use crate::WatcherRef;
use crate::ZkError;

/// A node operation as submitted by the caller. Paths are relative to the
/// chroot, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Create {
        path: String,
        data: Vec<u8>,
        acl: Vec<Acl>,
        mode: CreateMode,
    },
    Delete {
        path: String,
        version: i32,
    },
    Exists {
        path: String,
    },
    GetData {
        path: String,
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
    },
}

impl Operation {
    pub fn path(&self) -> &str {
        match self {
            Operation::Create { path, .. }
            | Operation::Delete { path, .. }
            | Operation::Exists { path }
            | Operation::GetData { path }
            | Operation::SetData { path, .. }
            | Operation::GetAcl { path }
            | Operation::SetAcl { path, .. }
            | Operation::GetChildren { path } => path,
        }
    }

    /// Watch kind a successful read leaves behind, `None` for writes.
    pub fn watch_kind(&self) -> Option<WatchKind> {
        match self {
            Operation::Exists { .. } => Some(WatchKind::Exists),
            Operation::GetData { .. } => Some(WatchKind::Data),
            Operation::GetChildren { .. } => Some(WatchKind::Child),
            _ => None,
        }
    }

    /// Validates the operation and turns it into a wire request with the
    /// chroot applied.
    pub(crate) fn into_request(
        self,
        chroot: &Chroot,
        watcher: Option<WatcherRef>,
    ) -> ClientResult<(Request, Option<WatchIntent>)> {
        let sequential = matches!(&self, Operation::Create { mode, .. } if mode.is_sequential());
        validate_path(self.path(), sequential)?;

        let server_path = chroot.prepend(self.path());
        let watch = match (self.watch_kind(), watcher) {
            (Some(kind), Some(watcher)) => Some(WatchIntent {
                path: server_path.clone(),
                kind,
                watcher,
            }),
            (None, Some(_)) => {
                trace!(path = self.path(), "watcher passed to a non-read operation");
                return Err(ZkError::BadArguments);
            }
            (_, None) => None,
        };
        let watch_flag = watch.is_some();

        let request = match self {
            Operation::Create { data, acl, mode, .. } => {
                if acl.is_empty() {
                    return Err(ZkError::InvalidAcl);
                }
                Request::Create {
                    path: server_path,
                    data,
                    acl,
                    flags: mode.flags(),
                }
            }
            Operation::Delete { version, .. } => Request::Delete {
                path: server_path,
                version,
            },
            Operation::Exists { .. } => Request::Exists {
                path: server_path,
                watch: watch_flag,
            },
            Operation::GetData { .. } => Request::GetData {
                path: server_path,
                watch: watch_flag,
            },
            Operation::SetData { data, version, .. } => Request::SetData {
                path: server_path,
                data,
                version,
            },
            Operation::GetAcl { .. } => Request::GetAcl { path: server_path },
            Operation::SetAcl { acl, version, .. } => {
                if acl.is_empty() {
                    return Err(ZkError::InvalidAcl);
                }
                Request::SetAcl {
                    path: server_path,
                    acl,
                    version,
                }
            }
            Operation::GetChildren { .. } => Request::GetChildren {
                path: server_path,
                watch: watch_flag,
            },
        };
        Ok((request, watch))
    }
}

/// Successful outcome of an [`Operation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpResult {
    /// Actual path of the created node (sequence suffix included)
    Created(String),
    /// Delete or add-auth acknowledgement
    Empty,
    /// `None` when the node does not exist
    Exists(Option<Stat>),
    Data(Vec<u8>, Stat),
    /// Metadata after a write
    Stat(Stat),
    Children(Vec<String>),
    Acl(Vec<Acl>, Stat),
}

pub type CompletionCallback = Box<dyn FnOnce(ClientResult<OpResult>) + Send + 'static>;

/// Where the final status of an operation goes. Every submitted completion
/// is resolved exactly once.
pub enum Completion {
    /// Resolved through a oneshot channel (typed async façade)
    Channel(oneshot::Sender<ClientResult<OpResult>>),
    /// Invoked on the dispatcher thread
    Callback(CompletionCallback),
}

impl Completion {
    pub fn callback<F>(f: F) -> Self
    where F: FnOnce(ClientResult<OpResult>) + Send + 'static {
        Completion::Callback(Box::new(f))
    }

    pub(crate) fn complete(
        self,
        result: ClientResult<OpResult>,
    ) {
        match self {
            Completion::Channel(tx) => {
                if tx.send(result).is_err() {
                    trace!("caller stopped waiting for the result");
                }
            }
            Completion::Callback(f) => f(result),
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Completion::Channel(_) => f.write_str("Completion::Channel"),
            Completion::Callback(_) => f.write_str("Completion::Callback"),
        }
    }
}
