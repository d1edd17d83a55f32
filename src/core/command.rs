use std::fmt;

use tokio::sync::oneshot;

use super::PendingRequest;
use crate::Completion;
use crate::WatcherRef;

/// Messages from client handles to the session worker.
pub(crate) enum Command {
    Submit(PendingRequest),
    AddAuth {
        scheme: String,
        auth: Vec<u8>,
        completion: Completion,
    },
    /// Replaces the default session watcher
    SetWatcher(WatcherRef),
    Close(oneshot::Sender<()>),
}

impl fmt::Debug for Command {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Command::Submit(request) => f.debug_tuple("Submit").field(request).finish(),
            Command::AddAuth { scheme, .. } => f.debug_struct("AddAuth").field("scheme", scheme).finish_non_exhaustive(),
            Command::SetWatcher(_) => f.write_str("SetWatcher"),
            Command::Close(_) => f.write_str("Close"),
        }
    }
}
