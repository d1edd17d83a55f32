//! Client-side record of one-shot watch subscriptions.
//!
//! Keys are server paths (chroot applied). A subscription is removed before
//! its watcher is handed out, so it can never be delivered twice.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::proto::Request;
use crate::EventType;
use crate::WatchKind;
use crate::WatcherRef;

/// Watch requested alongside a read; applied once the reply arrives.
pub(crate) struct WatchIntent {
    pub(crate) path: String,
    pub(crate) kind: WatchKind,
    pub(crate) watcher: WatcherRef,
}

impl fmt::Debug for WatchIntent {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("WatchIntent")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub(crate) struct WatchRegistry {
    subscriptions: BTreeMap<(String, WatchKind), WatcherRef>,
}

impl fmt::Debug for WatchRegistry {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_list().entries(self.subscriptions.keys()).finish()
    }
}

impl WatchRegistry {
    /// Last writer wins for the same `(path, kind)`.
    pub(crate) fn register(
        &mut self,
        intent: WatchIntent,
    ) {
        trace!(path = %intent.path, kind = ?intent.kind, "watch registered");
        self.subscriptions.insert((intent.path, intent.kind), intent.watcher);
    }

    /// Removes and returns the watchers satisfied by an event on `path`.
    ///
    /// The same watcher registered under several kinds is returned once.
    pub(crate) fn trigger(
        &mut self,
        event_type: EventType,
        path: &str,
    ) -> Vec<WatcherRef> {
        let mut fired: Vec<WatcherRef> = Vec::new();
        for kind in [WatchKind::Data, WatchKind::Exists, WatchKind::Child] {
            if !kind.is_triggered_by(event_type) {
                continue;
            }
            if let Some(watcher) = self.subscriptions.remove(&(path.to_string(), kind)) {
                if !fired.iter().any(|w| Arc::ptr_eq(w, &watcher)) {
                    fired.push(watcher);
                }
            }
        }
        trace!(%path, ?event_type, fired = fired.len(), "watch event matched");
        fired
    }

    /// Re-arming request for every live subscription, `None` when there is
    /// nothing to re-arm.
    pub(crate) fn set_watches_request(
        &self,
        relative_zxid: i64,
    ) -> Option<Request> {
        if self.subscriptions.is_empty() {
            return None;
        }
        let mut data_watches = Vec::new();
        let mut exist_watches = Vec::new();
        let mut child_watches = Vec::new();
        for (path, kind) in self.subscriptions.keys() {
            match kind {
                WatchKind::Data => data_watches.push(path.clone()),
                WatchKind::Exists => exist_watches.push(path.clone()),
                WatchKind::Child => child_watches.push(path.clone()),
            }
        }
        Some(Request::SetWatches {
            relative_zxid,
            data_watches,
            exist_watches,
            child_watches,
        })
    }

    /// Empties the registry, returning every discarded subscription.
    pub(crate) fn drain(&mut self) -> Vec<(String, WatcherRef)> {
        std::mem::take(&mut self.subscriptions)
            .into_iter()
            .map(|((path, _), watcher)| (path, watcher))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub(crate) fn contains(
        &self,
        path: &str,
        kind: WatchKind,
    ) -> bool {
        self.subscriptions.contains_key(&(path.to_string(), kind))
    }
}
