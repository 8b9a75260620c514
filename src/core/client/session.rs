// src/core/client/session.rs

//! Session state machine shared by the client wrapper, retry engine, and
//! recovery API: `Disconnected -> Connecting -> Connected -> Expired`, with
//! `Fenced` as a terminal state reachable from any of the above.

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Expired,
    Fenced,
}

/// Tracks the session's current state and holds the candidate/active handle
/// promotion described for the coordination client: a freshly (re)connecting
/// session is a *candidate* until its watcher observes `SyncConnected`, at
/// which point it is promoted to *active* and reads/writes are allowed to
/// proceed against it.
pub struct SessionHandle {
    state_tx: watch::Sender<SessionState>,
    state_rx: watch::Receiver<SessionState>,
}

impl SessionHandle {
    pub fn new() -> Arc<Self> {
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);
        Arc::new(Self { state_tx, state_rx })
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    pub fn set_state(&self, state: SessionState) {
        // Fenced is terminal: once set, nothing may move the session out of it.
        if self.state() == SessionState::Fenced {
            return;
        }
        let _ = self.state_tx.send(state);
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    pub fn is_fenced(&self) -> bool {
        self.state() == SessionState::Fenced
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_state_is_sticky() {
        let handle = SessionHandle::new();
        handle.set_state(SessionState::Connected);
        handle.set_state(SessionState::Fenced);
        handle.set_state(SessionState::Connecting);
        assert_eq!(handle.state(), SessionState::Fenced);
        assert!(handle.is_fenced());
    }

    #[test]
    fn transitions_through_normal_states() {
        let handle = SessionHandle::new();
        assert_eq!(handle.state(), SessionState::Disconnected);
        handle.set_state(SessionState::Connecting);
        handle.set_state(SessionState::Connected);
        assert_eq!(handle.state(), SessionState::Connected);
        handle.set_state(SessionState::Expired);
        assert_eq!(handle.state(), SessionState::Expired);
    }
}
