//! Per-connection session state.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};

use crate::models::profile::Profile;

use super::events::{IdentityEcho, Participant};
use super::fanout::BroadcastPayload;

/// Protocol state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected; only `hi` is accepted.
    Unauthenticated,
    /// Logged in; all message types are routed.
    Active,
    /// Retired. Terminal.
    Closed,
}

/// State for a single live connection.
#[derive(Debug)]
pub struct Session {
    /// Ephemeral token identifying this connection. Never persisted.
    pub token: String,
    /// Profile of the identity behind this connection.
    pub profile: Profile,
    state: SessionState,
    /// Broadcast subscription, attached on login and dropped on close, so
    /// only batches published while the session is active reach it.
    inbox: Option<broadcast::Receiver<Arc<BroadcastPayload>>>,
}

impl Session {
    pub fn new(token: String, profile: Profile) -> Self {
        Self {
            token,
            profile,
            state: SessionState::Unauthenticated,
            inbox: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Move to `Active`. Repeated logins keep the session active; a closed
    /// session stays closed.
    pub fn activate(&mut self) -> bool {
        match self.state {
            SessionState::Closed => false,
            _ => {
                self.state = SessionState::Active;
                true
            }
        }
    }

    /// Move to `Closed`. Returns `false` if the session was already closed,
    /// so retirement side effects run exactly once.
    pub fn close(&mut self) -> bool {
        if self.state == SessionState::Closed {
            return false;
        }
        self.state = SessionState::Closed;
        self.inbox = None;
        true
    }

    /// Start receiving broadcasts. Ignored once a subscription exists or the
    /// session is closed.
    pub fn attach_inbox(&mut self, rx: broadcast::Receiver<Arc<BroadcastPayload>>) {
        if self.inbox.is_none() && self.state != SessionState::Closed {
            self.inbox = Some(rx);
        }
    }

    pub fn has_inbox(&self) -> bool {
        self.inbox.is_some()
    }

    /// Next broadcast batch. Never resolves while no subscription is attached.
    pub async fn next_broadcast(&mut self) -> Result<Arc<BroadcastPayload>, RecvError> {
        match self.inbox.as_mut() {
            Some(rx) => rx.recv().await,
            None => std::future::pending().await,
        }
    }

    pub fn stable_id(&self) -> &str {
        &self.profile.stable_id
    }

    /// Public snapshot of this session as seen by other participants.
    pub fn participant(&self) -> Participant {
        Participant {
            stable_id: self.profile.stable_id.clone(),
            name: self.profile.display_name.clone(),
            color: self.profile.color_hex.clone(),
            id: self.token.clone(),
        }
    }

    pub fn identity_echo(&self) -> IdentityEcho {
        IdentityEcho {
            stable_id: self.profile.stable_id.clone(),
            name: self.profile.display_name.clone(),
            id: self.token.clone(),
        }
    }
}
