use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::WatchedEvent;
use crate::Watcher;
use crate::WatcherRef;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = env_logger::builder().is_test(true).try_init();
});

pub(crate) fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for unit test.");
}

/// Watcher recording every event it receives.
#[derive(Default)]
pub(crate) struct RecordingWatcher {
    events: Mutex<Vec<WatchedEvent>>,
}

impl RecordingWatcher {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn events(&self) -> Vec<WatchedEvent> {
        self.events.lock().clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub(crate) fn handle(self: &Arc<Self>) -> WatcherRef {
        self.clone()
    }
}

impl Watcher for RecordingWatcher {
    fn process(
        &self,
        event: WatchedEvent,
    ) {
        self.events.lock().push(event);
    }
}

/// Polls `condition` every 10ms until it holds or `timeout` passes.
pub(crate) async fn wait_until<F>(
    timeout: Duration,
    mut condition: F,
) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Bounds `fut` so a hung engine fails the test instead of the suite.
pub(crate) async fn within<T>(
    timeout: Duration,
    fut: impl Future<Output = T>,
) -> T {
    match tokio::time::timeout(timeout, fut).await {
        Ok(v) => v,
        Err(_) => panic!("timed out after {:?}", timeout),
    }
}
