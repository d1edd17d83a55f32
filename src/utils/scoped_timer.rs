use tokio::time::Instant;
use tracing::trace;

/// Logs how long a caller-facing operation took when dropped.
pub(crate) struct ScopedTimer {
    start: Instant,
    op: &'static str,
    path: Option<String>,
}

impl ScopedTimer {
    pub(crate) fn new(op: &'static str) -> Self {
        Self {
            start: Instant::now(),
            op,
            path: None,
        }
    }

    pub(crate) fn with_path(
        op: &'static str,
        path: &str,
    ) -> Self {
        Self {
            path: Some(path.to_string()),
            ..Self::new(op)
        }
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        match &self.path {
            Some(path) => trace!(
                target: "timing",
                "[TIMING] {} {} took {} ms",
                self.op,
                path,
                elapsed.as_millis()
            ),
            None => trace!(target: "timing", "[TIMING] {} took {} ms", self.op, elapsed.as_millis()),
        }
    }
}
