use std::time::Duration;

use tokio::time::Instant;

/// Tracks the two liveness deadlines of a connection: when a ping is due
/// (send idleness) and when silence from the server means the connection is
/// dead (receive idleness).
#[derive(Clone, Debug)]
pub(crate) struct HeartbeatTimer {
    ping_interval: Duration,
    read_timeout: Duration,
    ping_deadline: Instant,
    read_deadline: Instant,
}

impl HeartbeatTimer {
    pub(crate) fn new(
        session_timeout: Duration,
        ping_ratio: f64,
        read_ratio: f64,
    ) -> Self {
        let ping_interval = session_timeout.mul_f64(ping_ratio);
        let read_timeout = session_timeout.mul_f64(read_ratio);
        let now = Instant::now();
        Self {
            ping_interval,
            read_timeout,
            ping_deadline: now + ping_interval,
            read_deadline: now + read_timeout,
        }
    }

    /// Called after every write.
    pub(crate) fn reset_ping(&mut self) {
        self.ping_deadline = Instant::now() + self.ping_interval;
    }

    /// Called after every frame received.
    pub(crate) fn reset_read(&mut self) {
        self.read_deadline = Instant::now() + self.read_timeout;
    }

    pub(crate) fn next_deadline(&self) -> Instant {
        self.ping_deadline.min(self.read_deadline)
    }

    /// Bound for a write: a member that stops reading is as dead as one
    /// that stops writing.
    pub(crate) fn read_deadline(&self) -> Instant {
        self.read_deadline
    }

    pub(crate) fn is_ping_due(&self) -> bool {
        self.ping_deadline <= Instant::now()
    }

    pub(crate) fn is_read_expired(&self) -> bool {
        self.read_deadline <= Instant::now()
    }

    pub(crate) fn ping_interval(&self) -> Duration {
        self.ping_interval
    }

    pub(crate) fn read_timeout(&self) -> Duration {
        self.read_timeout
    }
}
