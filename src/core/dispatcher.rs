//! Delivery of completions and watch events off the I/O task.
//!
//! The worker pushes deliveries into an unbounded channel; a dedicated OS
//! thread drains it in order and runs caller code. A slow or panicking
//! callback therefore never stalls heartbeats or reply matching.

use std::panic::catch_unwind;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::unbounded;
use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use tracing::debug;
use tracing::error;
use tracing::trace;
use tracing::warn;

use crate::metrics::WATCH_EVENTS;
use crate::ClientResult;
use crate::Completion;
use crate::OpResult;
use crate::WatchedEvent;
use crate::WatcherRef;
use crate::ZkError;

pub(crate) enum Delivery {
    Complete {
        completion: Completion,
        result: ClientResult<OpResult>,
    },
    Event {
        watchers: Vec<WatcherRef>,
        event: WatchedEvent,
    },
    Shutdown,
}

#[derive(Debug)]
pub(crate) struct Dispatcher {
    tx: Sender<Delivery>,
    /// Once set, queued completions resolve as CLOSING and events are dropped
    closing: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Dispatcher {
    pub(crate) fn start() -> std::io::Result<Self> {
        let (tx, rx) = unbounded();
        let closing = Arc::new(AtomicBool::new(false));
        let flag = closing.clone();
        let handle = std::thread::Builder::new()
            .name("zk-dispatcher".to_string())
            .spawn(move || Self::run(rx, flag))?;
        Ok(Self {
            tx,
            closing,
            handle: Some(handle),
        })
    }

    fn run(
        rx: Receiver<Delivery>,
        closing: Arc<AtomicBool>,
    ) {
        debug!("dispatcher thread started");
        while let Ok(delivery) = rx.recv() {
            match delivery {
                Delivery::Complete { completion, result } => {
                    let result = if closing.load(Ordering::Acquire) {
                        Err(ZkError::Closing)
                    } else {
                        result
                    };
                    Self::guarded("completion", || completion.complete(result));
                }
                Delivery::Event { watchers, event } => {
                    if closing.load(Ordering::Acquire) {
                        trace!(?event, "dropping event after close");
                        continue;
                    }
                    WATCH_EVENTS.with_label_values(&[event.event_type.as_str()]).inc();
                    for watcher in watchers {
                        let event = event.clone();
                        Self::guarded("watcher", || watcher.process(event));
                    }
                }
                Delivery::Shutdown => break,
            }
        }
        debug!("dispatcher thread stopped");
    }

    fn guarded<F: FnOnce()>(
        what: &str,
        f: F,
    ) {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(f)) {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("{} callback panicked: {}", what, msg);
        }
    }

    pub(crate) fn complete(
        &self,
        completion: Completion,
        result: ClientResult<OpResult>,
    ) {
        self.push(Delivery::Complete { completion, result });
    }

    pub(crate) fn event(
        &self,
        watchers: Vec<WatcherRef>,
        event: WatchedEvent,
    ) {
        if watchers.is_empty() {
            return;
        }
        self.push(Delivery::Event { watchers, event });
    }

    fn push(
        &self,
        delivery: Delivery,
    ) {
        if let Err(e) = self.tx.send(delivery) {
            // Thread is gone: resolve completions inline rather than lose them.
            warn!("dispatcher stopped, delivering inline");
            if let Delivery::Complete { completion, .. } = e.into_inner() {
                completion.complete(Err(ZkError::Closing));
            }
        }
    }

    /// Everything queued from now on resolves as CLOSING.
    pub(crate) fn begin_close(&self) {
        self.closing.store(true, Ordering::Release);
    }

    /// Stops the thread after it drains what is already queued and waits for
    /// it to exit.
    pub(crate) async fn shutdown(mut self) {
        let _ = self.tx.send(Delivery::Shutdown);
        if let Some(handle) = self.handle.take() {
            match tokio::task::spawn_blocking(move || handle.join()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => error!("dispatcher thread panicked"),
                Err(e) => error!("failed to join dispatcher thread: {}", e),
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.tx.send(Delivery::Shutdown);
        }
    }
}
