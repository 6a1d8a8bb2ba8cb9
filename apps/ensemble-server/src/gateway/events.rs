//! Wire-format messages.
//!
//! Every frame in either direction is a JSON array of objects tagged by their
//! `m` field.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::channel::ChannelSettings;

/// Identifier of the single shared channel as sent to clients.
pub const CHANNEL_ID: &str = "lobby";

/// One note entry of an `n` event. Arbitrary client fields pass through untouched.
pub type NoteEntry = Map<String, Value>;

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// A message received from a client. Unrecognized tags become `Unknown`.
#[derive(Debug, Deserialize)]
#[serde(tag = "m")]
pub enum ClientMessage {
    #[serde(rename = "hi")]
    Hi,
    #[serde(rename = "ch")]
    Join,
    #[serde(rename = "a")]
    Chat {
        #[serde(default)]
        message: Option<Value>,
    },
    #[serde(rename = "userset")]
    UserSet {
        #[serde(default)]
        set: Option<ProfilePatch>,
    },
    #[serde(rename = "m")]
    Move {
        #[serde(default)]
        x: Value,
        #[serde(default)]
        y: Value,
    },
    #[serde(rename = "n")]
    Notes {
        #[serde(default)]
        n: Option<Vec<NoteEntry>>,
        #[serde(default)]
        t: Value,
    },
    #[serde(rename = "t")]
    Ping {
        #[serde(default)]
        e: Option<Value>,
    },
    #[serde(other)]
    Unknown,
}

/// Payload of a `userset` message.
///
/// A field is `Some` whenever its key is present, including an explicit `null`.
#[derive(Debug, Default, Deserialize)]
pub struct ProfilePatch {
    #[serde(default, deserialize_with = "present")]
    pub name: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub color: Option<Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// Public view of a present user: profile plus the live session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Participant {
    #[serde(rename = "_id")]
    pub stable_id: String,
    pub name: String,
    pub color: String,
    pub id: String,
}

/// `u` field of the `hi` reply.
#[derive(Debug, Clone, Serialize)]
pub struct IdentityEcho {
    #[serde(rename = "_id")]
    pub stable_id: String,
    pub name: String,
    pub id: String,
}

/// A chat line as broadcast and as kept in history. Immutable once built.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub a: Option<Value>,
    pub p: Participant,
    pub t: i64,
}

/// `ch` field of the channel snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelInfo {
    #[serde(rename = "_id")]
    pub id: &'static str,
    pub settings: ChannelSettings,
}

/// Ad-hoc UI alert. Only ever built from server-side constants.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<&'static str>,
    pub target: &'static str,
    pub duration: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<&'static str>,
}

impl Notification {
    /// Greeting sent after joining the channel.
    pub fn welcome() -> Self {
        Self {
            id: "welcome",
            title: Some("Welcome!"),
            text: Some("Welcome to tinympp."),
            target: "#piano",
            duration: 7000,
            class: None,
            html: None,
        }
    }

    /// Notice shown to a client whose address already has a live session.
    pub fn already_connected() -> Self {
        Self {
            id: "notice",
            title: Some("Notice"),
            text: Some("You are already connected to the server on this IP."),
            target: "#volume",
            duration: 7000,
            class: None,
            html: None,
        }
    }

    /// Markup that makes the receiving client stop its own connection loop.
    pub fn stop_client() -> Self {
        Self {
            id: "script",
            title: None,
            text: None,
            target: "#names",
            duration: 1,
            class: Some("short"),
            html: Some("<script>MPP.client.stop()</script>"),
        }
    }
}

/// A message sent from the server to a client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "m")]
pub enum ServerMessage {
    #[serde(rename = "hi")]
    Hi { motd: String, u: IdentityEcho },
    #[serde(rename = "t")]
    Time {
        t: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        e: Option<Value>,
    },
    #[serde(rename = "ch")]
    Channel {
        ch: ChannelInfo,
        ppl: Vec<Participant>,
        p: String,
    },
    #[serde(rename = "c")]
    ChatHistory { c: Vec<ServerMessage> },
    #[serde(rename = "a")]
    Chat(ChatMessage),
    #[serde(rename = "p")]
    Participant(Participant),
    #[serde(rename = "m")]
    Cursor { x: Value, y: Value, id: String },
    #[serde(rename = "n")]
    Notes { t: Value, n: Vec<NoteEntry>, p: String },
    #[serde(rename = "bye")]
    Bye { p: String },
    #[serde(rename = "notification")]
    Notification(Notification),
}

/// Serialize one batch as a single JSON-array text frame.
pub fn encode_batch(messages: &[ServerMessage]) -> Result<String, serde_json::Error> {
    serde_json::to_string(messages)
}
