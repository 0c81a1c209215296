// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-connection lifecycle.

use std::fmt;

use tokio::sync::watch;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Listening,
    Accepted,
    Authenticating,
    Authenticated,
    AuthFailed,
    AgentChannelOpening,
    AgentChannelOpen,
    AgentChannelFailed,
    Minting,
    MintSucceeded,
    MintFailed,
    Notifying,
    Closed,
}

impl SessionState {
    /// No transition leaves a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::AuthFailed | SessionState::AgentChannelFailed | SessionState::Closed
        )
    }

    /// True once the agent channel question has been settled either way.
    pub fn agent_channel_settled(self) -> bool {
        matches!(
            self,
            SessionState::AgentChannelOpen
                | SessionState::AgentChannelFailed
                | SessionState::Minting
                | SessionState::MintSucceeded
                | SessionState::MintFailed
                | SessionState::Notifying
                | SessionState::Closed
        )
    }

    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        if self.is_terminal() {
            return false;
        }
        if next == Closed {
            return true;
        }
        matches!(
            (self, next),
            (Listening, Accepted)
                | (Accepted, Authenticating)
                | (Authenticating, Authenticated)
                | (Authenticating, AuthFailed)
                | (Authenticated, AgentChannelOpening)
                | (AgentChannelOpening, AgentChannelOpen)
                | (AgentChannelOpening, AgentChannelFailed)
                | (AgentChannelOpen, Minting)
                | (AgentChannelOpen, MintFailed)
                | (Minting, MintSucceeded)
                | (Minting, MintFailed)
                | (MintSucceeded, Notifying)
                | (MintFailed, Notifying)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Observable state cell shared by the transport handler and both
/// per-connection tasks.
#[derive(Debug)]
pub struct StateTracker {
    tx: watch::Sender<SessionState>,
}

impl StateTracker {
    pub fn new(initial: SessionState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn current(&self) -> SessionState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    /// Move to `next` if the transition table allows it. Illegal
    /// transitions are logged and leave the state untouched.
    pub fn advance(&self, next: SessionState) -> bool {
        let mut from = next;
        let moved = self.tx.send_if_modified(|state| {
            from = *state;
            if state.can_transition_to(next) {
                *state = next;
                true
            } else {
                false
            }
        });
        if moved {
            debug!(%from, to = %next, "session state");
        } else {
            warn!(%from, to = %next, "illegal session state transition ignored");
        }
        moved
    }

    /// Wait until `pred` holds, returning the state that satisfied it.
    pub async fn wait_until<F>(&self, pred: F) -> SessionState
    where
        F: Fn(SessionState) -> bool,
    {
        let mut rx = self.subscribe();
        let result = match rx.wait_for(|s| pred(*s)).await {
            Ok(state) => *state,
            Err(_) => self.current(),
        };
        result
    }
}
