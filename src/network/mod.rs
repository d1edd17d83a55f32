//! Transport to the ensemble: server selection, reconnect pacing and the
//! framed connection itself.

mod connection;
mod host_list;

pub(crate) use connection::*;
pub(crate) use host_list::*;


use std::time::Duration;

use rand::seq::SliceRandom;
use tracing::debug;

use crate::BackoffPolicy;

/// Chooses which member to dial next and how long to wait before doing so.
///
/// The server order is fixed at construction: either as configured or
/// shuffled once. Every attempt advances the cursor, wrapping around.
#[derive(Debug)]
pub(crate) struct ConnectionManager {
    servers: Vec<String>,
    cursor: usize,
    policy: BackoffPolicy,
    connect_timeout: Duration,
    /// Consecutive failed attempts since the last successful handshake
    failed_attempts: usize,
}

impl ConnectionManager {
    pub(crate) fn new(
        mut servers: Vec<String>,
        deterministic: bool,
        connect_timeout: Duration,
        policy: BackoffPolicy,
    ) -> Self {
        if !deterministic {
            servers.shuffle(&mut rand::thread_rng());
        }
        debug!(?servers, deterministic, "server order decided");
        Self {
            servers,
            cursor: 0,
            policy,
            connect_timeout,
            failed_attempts: 0,
        }
    }

    pub(crate) fn servers(&self) -> &[String] {
        &self.servers
    }

    /// Returns the next server in order and advances the cursor.
    pub(crate) fn next_server(&mut self) -> String {
        let addr = self.servers[self.cursor % self.servers.len()].clone();
        self.cursor = (self.cursor + 1) % self.servers.len();
        addr
    }

    /// Bound for one connect + handshake attempt, so a full pass over the
    /// server list fits in one session timeout.
    pub(crate) fn attempt_timeout(
        &self,
        session_timeout: Duration,
    ) -> Duration {
        let share = session_timeout / self.servers.len() as u32;
        self.connect_timeout.min(share).max(Duration::from_millis(1))
    }

    /// Pause before the next attempt. Zero right after a loss.
    pub(crate) fn backoff_delay(
        &self,
        session_timeout: Duration,
    ) -> Duration {
        if self.failed_attempts == 0 {
            return Duration::ZERO;
        }
        let cap = session_timeout / (self.servers.len() as u32 + 1);
        self.policy.delay_for(self.failed_attempts - 1).min(cap)
    }

    pub(crate) fn record_failure(&mut self) -> usize {
        self.failed_attempts += 1;
        self.failed_attempts
    }

    pub(crate) fn record_success(&mut self) {
        self.failed_attempts = 0;
    }

    pub(crate) fn failed_attempts(&self) -> usize {
        self.failed_attempts
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.policy.is_exhausted(self.failed_attempts)
    }
}
