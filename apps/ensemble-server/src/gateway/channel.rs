//! The single shared channel: roster, chat history and settings.
//!
//! All roster and history mutation happens under one `parking_lot::Mutex`,
//! together with the broadcast that announces it, so every session observes
//! mutations in the order they were applied.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;

use super::events::{ChannelInfo, ChatMessage, Participant, ServerMessage, CHANNEL_ID};
use super::fanout::{BroadcastPayload, Broadcaster};

/// Maximum number of chat messages replayed to a joining session.
pub const CHAT_REPLAY_LIMIT: usize = 50;

/// Fixed channel settings reported in the channel snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelSettings {
    pub chat: bool,
    pub color: String,
    pub color2: String,
    pub crownsolo: bool,
    pub lobby: bool,
    pub visible: bool,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            chat: true,
            color: "#000000".to_string(),
            color2: "#000000".to_string(),
            crownsolo: false,
            lobby: true,
            visible: true,
        }
    }
}

/// What a joining session needs for its snapshot reply.
pub struct JoinSnapshot {
    pub roster: Vec<Participant>,
    pub recent_chat: Vec<ChatMessage>,
}

#[derive(Default)]
struct ChannelState {
    /// Present users keyed by `stable_id`.
    roster: HashMap<String, Participant>,
    /// Full chat history. Grows without bound; only the tail is replayed.
    history: Vec<ChatMessage>,
}

/// The shared broadcast domain every session joins.
pub struct Channel {
    state: Mutex<ChannelState>,
    settings: ChannelSettings,
    broadcaster: Broadcaster,
}

impl Channel {
    pub fn new(settings: ChannelSettings) -> Self {
        Self {
            state: Mutex::new(ChannelState::default()),
            settings,
            broadcaster: Broadcaster::new(),
        }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<std::sync::Arc<BroadcastPayload>> {
        self.broadcaster.subscribe()
    }

    pub fn info(&self) -> ChannelInfo {
        ChannelInfo {
            id: CHANNEL_ID,
            settings: self.settings.clone(),
        }
    }

    /// Add `participant` to the roster (replacing any entry for the same
    /// identity) and announce it to everyone else.
    pub fn join(&self, participant: Participant) -> JoinSnapshot {
        let mut state = self.state.lock();
        state
            .roster
            .insert(participant.stable_id.clone(), participant.clone());

        let snapshot = JoinSnapshot {
            roster: state.roster.values().cloned().collect(),
            recent_chat: tail(&state.history, CHAT_REPLAY_LIMIT),
        };

        let token = participant.id.clone();
        self.broadcaster
            .broadcast(&[ServerMessage::Participant(participant)], &[token.as_str()]);
        snapshot
    }

    /// Append a chat line to history and deliver it to every session.
    pub fn append_chat(&self, message: ChatMessage) {
        let mut state = self.state.lock();
        self.broadcaster
            .broadcast(&[ServerMessage::Chat(message.clone())], &[]);
        state.history.push(message);
    }

    /// Refresh the roster entry of a changed profile (if present) and
    /// announce the change to every session.
    pub fn update_participant(&self, participant: Participant) {
        let mut state = self.state.lock();
        if let Some(entry) = state.roster.get_mut(&participant.stable_id) {
            *entry = participant.clone();
        }
        self.broadcaster
            .broadcast(&[ServerMessage::Participant(participant)], &[]);
    }

    /// Remove the identity held by `token` from the roster and tell everyone
    /// else that the session left.
    pub fn depart(&self, stable_id: &str, token: &str) {
        let mut state = self.state.lock();
        let owned = state
            .roster
            .get(stable_id)
            .is_some_and(|entry| entry.id == token);
        if owned {
            state.roster.remove(stable_id);
        }
        self.broadcaster.broadcast(
            &[ServerMessage::Bye {
                p: token.to_string(),
            }],
            &[token],
        );
    }

    /// Fan out a batch that does not touch channel state.
    pub fn broadcast(&self, messages: &[ServerMessage], exclude: &[&str]) {
        self.broadcaster.broadcast(messages, exclude);
    }

    /// The most recent `limit` chat messages in chronological order.
    pub fn recent_chat(&self, limit: usize) -> Vec<ChatMessage> {
        tail(&self.state.lock().history, limit)
    }

    pub fn roster(&self) -> Vec<Participant> {
        self.state.lock().roster.values().cloned().collect()
    }

    pub fn is_present(&self, stable_id: &str) -> bool {
        self.state.lock().roster.contains_key(stable_id)
    }

    pub fn roster_len(&self) -> usize {
        self.state.lock().roster.len()
    }

    pub fn history_len(&self) -> usize {
        self.state.lock().history.len()
    }
}

impl Default for Channel {
    fn default() -> Self {
        Self::new(ChannelSettings::default())
    }
}

fn tail(history: &[ChatMessage], limit: usize) -> Vec<ChatMessage> {
    history[history.len().saturating_sub(limit)..].to_vec()
}
