//! WebSocket upgrade handler and per-connection event loop.

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio::time::{self, Instant};

use crate::identity::resolve_address;
use crate::AppState;

use super::events::{encode_batch, ServerMessage};
use super::handler;
use super::session::Session;

/// Close codes (4000-range for application-level).
const CLOSE_ALREADY_CONNECTED: u16 = 4005;
const CLOSE_SESSION_TIMEOUT: u16 = 4009;

/// Placeholder deadline for the idle timer when the timeout is disabled.
const IDLE_DISABLED: Duration = Duration::from_secs(24 * 60 * 60);

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(ws_upgrade))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let address = resolve_address(peer, &headers);
    ws.on_upgrade(move |socket| handle_connection(socket, state, address))
}

async fn handle_connection(socket: WebSocket, state: AppState, address: String) {
    let (mut ws_tx, ws_rx) = socket.split();

    let mut session = match handler::admit(&state, &address).await {
        Ok(session) => session,
        Err(duplicate) => {
            tracing::info!(
                stable_id = %duplicate.stable_id,
                existing_session = %duplicate.existing_token,
                "rejecting second connection for identity"
            );
            let _ = send_batch(&mut ws_tx, &handler::duplicate_notice()).await;
            let _ = send_close(&mut ws_tx, CLOSE_ALREADY_CONNECTED, "Already connected").await;
            return;
        }
    };

    tracing::info!(
        session_token = %session.token,
        stable_id = %session.stable_id(),
        "session admitted"
    );

    run_session(&state, &mut session, ws_tx, ws_rx).await;

    handler::retire(&state, &mut session);

    tracing::info!(
        session_token = %session.token,
        stable_id = %session.stable_id(),
        "session ended"
    );
}

/// Main session event loop: read client frames, forward broadcasts, enforce
/// the optional idle timeout.
async fn run_session(
    state: &AppState,
    session: &mut Session,
    mut ws_tx: WsSink,
    mut ws_rx: WsStream,
) {
    let idle_timeout = state.config.idle_timeout;
    let idle = time::sleep(idle_timeout.unwrap_or(IDLE_DISABLED));
    tokio::pin!(idle);

    loop {
        tokio::select! {
            // Client sends us a frame.
            msg = ws_rx.next() => {
                if let Some(timeout) = idle_timeout {
                    idle.as_mut().reset(Instant::now() + timeout);
                }

                let text = match msg {
                    Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => text.to_owned(),
                        Err(err) => {
                            tracing::warn!(%err, session_token = %session.token, "binary frame is not UTF-8; discarded");
                            continue;
                        }
                    },
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, session_token = %session.token, "ws read error");
                        break;
                    }
                };

                let outbox = handler::handle_frame(state, session, &text).await;
                if !send_frames(&mut ws_tx, outbox.into_frames()).await {
                    break;
                }
            }

            // Batch from the broadcast hub (only once logged in).
            result = session.next_broadcast() => {
                match result {
                    Ok(payload) => {
                        if !session.is_active() || payload.excludes(&session.token) {
                            continue;
                        }
                        if ws_tx.send(Message::Text(payload.frame.clone())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(
                            session_token = %session.token,
                            skipped = n,
                            "session lagged behind broadcast"
                        );
                        // Missed batches are dropped.
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }

            // Idle timeout, only armed when configured.
            _ = &mut idle, if idle_timeout.is_some() => {
                tracing::debug!(
                    session_token = %session.token,
                    "idle timeout, closing connection"
                );
                let _ = send_close(&mut ws_tx, CLOSE_SESSION_TIMEOUT, "Idle timeout").await;
                break;
            }
        }
    }
}

/// Send each batch as its own frame. Returns `false` once the socket is gone.
async fn send_frames(ws_tx: &mut WsSink, frames: Vec<Vec<ServerMessage>>) -> bool {
    for batch in frames {
        if send_batch(ws_tx, &batch).await.is_err() {
            return false;
        }
    }
    true
}

async fn send_batch(ws_tx: &mut WsSink, batch: &[ServerMessage]) -> Result<(), axum::Error> {
    let json = match encode_batch(batch) {
        Ok(json) => json,
        Err(err) => {
            tracing::error!(%err, "failed to encode reply batch");
            return Ok(());
        }
    };
    ws_tx.send(Message::Text(json.into())).await
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(ws_tx: &mut WsSink, code: u16, reason: &str) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(axum::extract::ws::CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
