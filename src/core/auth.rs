//! Credentials added with `add_auth`. They belong to the session, so every
//! new connection replays them before anything else is sent.

use std::collections::VecDeque;

use tracing::debug;

use crate::proto::Request;
use crate::Completion;

#[derive(Debug)]
struct AuthEntry {
    scheme: String,
    auth: Vec<u8>,
    /// Caller waiting for the first answer to this credential
    completion: Option<Completion>,
}

#[derive(Debug, Default)]
pub(crate) struct AuthStore {
    entries: Vec<AuthEntry>,
    /// Entry index per auth packet written on the current connection,
    /// in send order
    awaiting: VecDeque<usize>,
}

impl AuthStore {
    /// Remembers a credential. Returns the request to write now if a
    /// connection is up.
    pub(crate) fn add(
        &mut self,
        scheme: String,
        auth: Vec<u8>,
        completion: Completion,
        connected: bool,
    ) -> Option<Request> {
        let request = Request::Auth {
            scheme: scheme.clone(),
            auth: auth.clone(),
        };
        self.entries.push(AuthEntry {
            scheme,
            auth,
            completion: Some(completion),
        });
        if connected {
            self.awaiting.push_back(self.entries.len() - 1);
            Some(request)
        } else {
            None
        }
    }

    /// Auth requests for a fresh connection, in the order they were added.
    pub(crate) fn replay(&mut self) -> Vec<Request> {
        self.awaiting = (0..self.entries.len()).collect();
        if !self.entries.is_empty() {
            debug!(count = self.entries.len(), "replaying credentials");
        }
        self.entries
            .iter()
            .map(|e| Request::Auth {
                scheme: e.scheme.clone(),
                auth: e.auth.clone(),
            })
            .collect()
    }

    /// Matches an auth reply to the oldest unanswered packet. The completion
    /// is handed out only the first time its credential is answered.
    pub(crate) fn on_reply(&mut self) -> Option<Completion> {
        let idx = self.awaiting.pop_front()?;
        self.entries.get_mut(idx).and_then(|e| e.completion.take())
    }

    /// Unanswered packets died with the connection; their completions stay
    /// with the entries until the replay is answered.
    pub(crate) fn on_connection_loss(&mut self) {
        self.awaiting.clear();
    }

    /// Takes every completion still waiting for an answer.
    pub(crate) fn take_waiting(&mut self) -> Vec<Completion> {
        self.awaiting.clear();
        self.entries.iter_mut().filter_map(|e| e.completion.take()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
