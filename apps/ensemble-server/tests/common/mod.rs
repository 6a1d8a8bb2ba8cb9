#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use ensemble_server::config::Config;
use ensemble_server::db::profiles::MemoryStore;
use ensemble_server::AppState;

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long a test waits for a frame before failing.
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub fn test_config() -> Config {
    Config {
        salt: "integration-salt".to_string(),
        port: 0,
        users_file: PathBuf::from("unused.json"),
        motd: "tinympp".to_string(),
        idle_timeout: None,
    }
}

/// Start an actual TCP server for WebSocket testing. The server runs in the background.
pub async fn start_server() -> (SocketAddr, AppState) {
    start_server_with(test_config()).await
}

pub async fn start_server_with(config: Config) -> (SocketAddr, AppState) {
    let state = AppState::new(config, Arc::new(MemoryStore::new()));
    let app = ensemble_server::routes::router().with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    (addr, state)
}

/// Connect as `client_ip`. The test peer is loopback, so the server derives
/// the identity from the forwarded address.
pub async fn connect_as(addr: SocketAddr, client_ip: &str) -> WsClient {
    let mut request = format!("ws://{addr}/")
        .into_client_request()
        .expect("client request");
    request
        .headers_mut()
        .insert("x-forwarded-for", client_ip.parse().expect("header value"));

    let (ws, _) = tokio_tungstenite::connect_async(request)
        .await
        .expect("ws connect");
    ws
}

pub async fn send(ws: &mut WsClient, batch: Value) {
    ws.send(Message::Text(batch.to_string().into()))
        .await
        .expect("send frame");
}

/// Next non-ping message, whatever its kind.
pub async fn next_message(ws: &mut WsClient) -> Message {
    loop {
        let msg = time::timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for frame")
            .expect("stream ended")
            .expect("read error");
        match msg {
            Message::Ping(_) | Message::Pong(_) => continue,
            other => return other,
        }
    }
}

/// Next text frame, parsed as a JSON array.
pub async fn recv_frame(ws: &mut WsClient) -> Value {
    match next_message(ws).await {
        Message::Text(text) => {
            let frame: Value = serde_json::from_str(&text).expect("parse frame");
            assert!(frame.is_array(), "frame is not an array: {frame}");
            frame
        }
        other => panic!("Expected text frame, got: {other:?}"),
    }
}

/// Skip frames until one whose first message is tagged `m`; return that frame.
pub async fn recv_until(ws: &mut WsClient, m: &str) -> Value {
    loop {
        let frame = recv_frame(ws).await;
        if frame[0]["m"] == m {
            return frame;
        }
    }
}

/// Assert nothing arrives within `wait`.
pub async fn assert_silent(ws: &mut WsClient, wait: Duration) {
    if let Ok(Some(Ok(msg))) = time::timeout(wait, ws.next()).await {
        panic!("Expected silence, got: {msg:?}");
    }
}

/// Send `hi` and consume the identity echo and probe reply. Returns the `u` object.
pub async fn login(ws: &mut WsClient) -> Value {
    send(ws, serde_json::json!([{ "m": "hi" }])).await;
    let hi = recv_frame(ws).await;
    assert_eq!(hi[0]["m"], "hi");
    let t = recv_frame(ws).await;
    assert_eq!(t[0]["m"], "t");
    hi[0]["u"].clone()
}

/// Log in and join the channel. Returns the `u` object.
pub async fn login_and_join(ws: &mut WsClient) -> Value {
    let me = login(ws).await;
    send(ws, serde_json::json!([{ "m": "ch", "_id": "lobby" }])).await;
    let reply = recv_until(ws, "ch").await;
    assert_eq!(reply[0]["p"], me["id"]);
    me
}

pub fn close_code(msg: &Message) -> Option<u16> {
    match msg {
        Message::Close(Some(frame)) => Some(frame.code.into()),
        _ => None,
    }
}

