//! Session admission, inbound message dispatch and retirement.

use ensemble_common::{id::session_token, is_hex_color, now_ms};
use serde_json::Value;

use crate::models::profile::Profile;
use crate::AppState;

use super::events::{
    ChatMessage, ClientMessage, NoteEntry, Notification, ProfilePatch, ServerMessage,
};
use super::session::{Session, SessionState};

/// Duration (ms) reported for a note event that did not carry a usable one.
pub const DEFAULT_NOTE_DURATION_MS: u64 = 1000;

/// Frames to send straight back to the session that sent the inbound frame.
///
/// Each inner batch goes out as one text frame, in order.
#[derive(Debug, Default)]
pub struct Outbox {
    frames: Vec<Vec<ServerMessage>>,
}

impl Outbox {
    fn push(&mut self, batch: Vec<ServerMessage>) {
        self.frames.push(batch);
    }

    pub fn frames(&self) -> &[Vec<ServerMessage>] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<Vec<ServerMessage>> {
        self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// An address already has a live session; the new connection is refused.
#[derive(Debug)]
pub struct DuplicateSession {
    pub stable_id: String,
    pub existing_token: String,
}

// ---------------------------------------------------------------------------
// Admission and retirement
// ---------------------------------------------------------------------------

/// Admit a connection from `address`, or refuse it if its identity is taken.
///
/// Registration is atomic, so of two connections racing for one identity
/// exactly one is admitted.
pub async fn admit(state: &AppState, address: &str) -> Result<Session, DuplicateSession> {
    let stable_id = state.identity.derive_stable_id(address);
    let token = session_token();

    if let Err(existing_token) = state.sessions.try_register(&stable_id, &token) {
        return Err(DuplicateSession {
            stable_id,
            existing_token,
        });
    }

    let profile = load_or_create_profile(state, &stable_id).await;
    Ok(Session::new(token, profile))
}

/// Batch sent to a refused connection before it is closed.
pub fn duplicate_notice() -> Vec<ServerMessage> {
    vec![
        ServerMessage::Notification(Notification::already_connected()),
        ServerMessage::Notification(Notification::stop_client()),
    ]
}

/// Retire a session: leave the roster, say goodbye, free the identity.
///
/// Runs once per session; later calls are no-ops.
pub fn retire(state: &AppState, session: &mut Session) {
    if !session.close() {
        return;
    }
    state.channel.depart(session.stable_id(), &session.token);
    state.sessions.release(session.stable_id(), &session.token);
}

async fn load_or_create_profile(state: &AppState, stable_id: &str) -> Profile {
    match state.profiles.get(stable_id).await {
        Ok(Some(profile)) => return profile,
        Ok(None) => {}
        Err(err) => {
            tracing::warn!(%err, %stable_id, "profile lookup failed; creating a fresh profile");
        }
    }

    let profile = Profile::new(stable_id, state.identity.derive_default_color(stable_id));
    if let Err(err) = state.profiles.set(&profile).await {
        tracing::warn!(%err, %stable_id, "failed to persist new profile");
    }
    profile
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Handle one inbound text frame: a JSON array of tagged messages.
///
/// Malformed frames and messages are dropped without telling the sender.
pub async fn handle_frame(state: &AppState, session: &mut Session, text: &str) -> Outbox {
    let mut outbox = Outbox::default();

    let items = match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(items)) => items,
        Ok(_) => {
            tracing::warn!(session_token = %session.token, "inbound frame is not an array; discarded");
            return outbox;
        }
        Err(err) => {
            tracing::warn!(%err, session_token = %session.token, "inbound frame is not JSON; discarded");
            return outbox;
        }
    };

    for item in items {
        let message = match serde_json::from_value::<ClientMessage>(item) {
            Ok(message) => message,
            Err(err) => {
                tracing::debug!(%err, session_token = %session.token, "dropping malformed message");
                continue;
            }
        };
        handle_message(state, session, message, &mut outbox).await;
    }

    outbox
}

async fn handle_message(
    state: &AppState,
    session: &mut Session,
    message: ClientMessage,
    outbox: &mut Outbox,
) {
    match session.state() {
        SessionState::Closed => return,
        SessionState::Unauthenticated if !matches!(message, ClientMessage::Hi) => return,
        _ => {}
    }

    match message {
        ClientMessage::Hi => handle_hi(state, session, outbox),
        ClientMessage::Join => handle_join(state, session, outbox),
        ClientMessage::Chat { message } => handle_chat(state, session, message),
        ClientMessage::UserSet { set } => handle_userset(state, session, set).await,
        ClientMessage::Move { x, y } => handle_move(state, session, x, y),
        ClientMessage::Notes { n, t } => handle_notes(state, session, n, t),
        ClientMessage::Ping { e } => outbox.push(vec![time_reply(e)]),
        ClientMessage::Unknown => {}
    }
}

fn handle_hi(state: &AppState, session: &mut Session, outbox: &mut Outbox) {
    if session.activate() && !session.has_inbox() {
        session.attach_inbox(state.channel.subscribe());
        tracing::debug!(session_token = %session.token, stable_id = %session.stable_id(), "session logged in");
    }
    outbox.push(vec![ServerMessage::Hi {
        motd: state.config.motd.clone(),
        u: session.identity_echo(),
    }]);
    outbox.push(vec![time_reply(None)]);
}

fn handle_join(state: &AppState, session: &Session, outbox: &mut Outbox) {
    let snapshot = state.channel.join(session.participant());
    let history = snapshot
        .recent_chat
        .into_iter()
        .map(ServerMessage::Chat)
        .collect();

    outbox.push(vec![
        ServerMessage::Channel {
            ch: state.channel.info(),
            ppl: snapshot.roster,
            p: session.token.clone(),
        },
        ServerMessage::ChatHistory { c: history },
        ServerMessage::Notification(Notification::welcome()),
    ]);
}

fn handle_chat(state: &AppState, session: &Session, message: Option<Value>) {
    state.channel.append_chat(ChatMessage {
        a: message,
        p: session.participant(),
        t: now_ms(),
    });
}

async fn handle_userset(state: &AppState, session: &mut Session, set: Option<ProfilePatch>) {
    let Some(patch) = set else {
        return;
    };
    if patch.name.is_none() && patch.color.is_none() {
        return;
    }

    if let Some(name) = patch.name.as_ref().and_then(display_name_from) {
        session.profile.display_name = name;
    }
    // Invalid colors are ignored; the name above still applies.
    if let Some(Value::String(color)) = patch.color {
        if is_hex_color(&color) {
            session.profile.color_hex = color;
        }
    }

    if let Err(err) = state.profiles.set(&session.profile).await {
        tracing::warn!(%err, stable_id = %session.stable_id(), "failed to persist profile update");
    }
    state.channel.update_participant(session.participant());
}

fn handle_move(state: &AppState, session: &Session, x: Value, y: Value) {
    if !is_coordinate(&x) || !is_coordinate(&y) {
        return;
    }
    // Position updates echo back to the sender as well.
    state.channel.broadcast(
        &[ServerMessage::Cursor {
            x,
            y,
            id: session.token.clone(),
        }],
        &[],
    );
}

fn handle_notes(state: &AppState, session: &Session, notes: Option<Vec<NoteEntry>>, duration: Value) {
    let Some(mut notes) = notes.filter(|n| !n.is_empty()) else {
        return;
    };
    for note in &mut notes {
        apply_note_defaults(note);
    }
    let duration = if is_falsy(&duration) {
        Value::from(DEFAULT_NOTE_DURATION_MS)
    } else {
        duration
    };

    state.channel.broadcast(
        &[ServerMessage::Notes {
            t: duration,
            n: notes,
            p: session.token.clone(),
        }],
        &[session.token.as_str()],
    );
}

fn time_reply(echo: Option<Value>) -> ServerMessage {
    ServerMessage::Time {
        t: now_ms(),
        e: echo.filter(Value::is_number),
    }
}

/// Display name carried by a `userset` name field.
///
/// Strings are used verbatim, numbers and booleans by their JSON text. Null,
/// objects and arrays leave the name unchanged.
fn display_name_from(value: &Value) -> Option<String> {
    match value {
        Value::String(name) => Some(name.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn is_coordinate(value: &Value) -> bool {
    value.is_number() || value.is_string()
}

/// Default `d` (delay) to 0 and `v` (velocity) to 1 when absent *or falsy*.
///
/// Clients have always relied on falsy defaulting, so an explicit velocity of
/// 0 is rewritten to 1 rather than passed through as silence.
pub fn apply_note_defaults(note: &mut NoteEntry) {
    if note.get("d").map_or(true, is_falsy) {
        note.insert("d".to_string(), Value::from(0));
    }
    if note.get("v").map_or(true, is_falsy) {
        note.insert("v".to_string(), Value::from(1));
    }
}

/// Whether a JSON value counts as "not set": null, false, zero or "".
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}
