//! Broadcast hub delivering outbound batches to every connected session.
//!
//! Uses a single `tokio::sync::broadcast` channel. Each session subscribes on
//! login and filters payloads locally: a frame is forwarded unless the
//! session's token is in the payload's exclusion list.

use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use tokio::sync::broadcast;

use super::events::{encode_batch, ServerMessage};

/// Capacity of the broadcast channel. Slow receivers that fall behind will
/// skip frames (RecvError::Lagged).
const BROADCAST_CAPACITY: usize = 4096;

/// One batch, already encoded as a single text frame.
#[derive(Debug, Clone)]
pub struct BroadcastPayload {
    pub frame: Utf8Bytes,
    /// Session tokens that must not receive this frame.
    pub exclude: Vec<String>,
}

impl BroadcastPayload {
    pub fn excludes(&self, token: &str) -> bool {
        self.exclude.iter().any(|t| t == token)
    }
}

/// The broadcast hub. Cloneable.
#[derive(Clone)]
pub struct Broadcaster {
    sender: broadcast::Sender<Arc<BroadcastPayload>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { sender }
    }

    /// Subscribe to the hub. A session subscribes once, when it logs in, and
    /// receives every batch published from then on.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<BroadcastPayload>> {
        self.sender.subscribe()
    }

    /// Deliver `messages` as one ordered frame to every session not in `exclude`.
    ///
    /// Best-effort: no acknowledgement and no retry.
    pub fn broadcast(&self, messages: &[ServerMessage], exclude: &[&str]) {
        let frame = match encode_batch(messages) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::error!(%err, "failed to encode broadcast batch");
                return;
            }
        };
        let payload = BroadcastPayload {
            frame: frame.into(),
            exclude: exclude.iter().map(|t| t.to_string()).collect(),
        };
        // send() errors when nobody is subscribed; nothing to do then.
        let _ = self.sender.send(Arc::new(payload));
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}
