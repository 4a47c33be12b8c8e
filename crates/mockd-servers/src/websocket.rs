//! WebSocket server factory.
//!
//! The listener exists only as an upgrade target: any path upgrades. Each
//! connection gets a welcome frame, then every inbound frame is logged and
//! answered according to the configured message handlers, falling back to
//! an echo.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{CloseFrame, Message, WebSocket, close_code},
    },
    response::Response,
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use mockd_protocol::{LogKind, MessageHandler};
use serde_json::{Value, json};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::handle::{BoundServer, ConnectionTracker, bind_localhost, wait_until_set};
use crate::registry::LogSink;

struct WsState {
    name: String,
    port: u16,
    handlers: Vec<MessageHandler>,
    log: LogSink,
    shutdown: watch::Receiver<bool>,
    connections: ConnectionTracker,
}

/// An inbound frame, classified by whether its text parses as JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Json(Value),
    Text(String),
}

/// Bind `127.0.0.1:<port>` and attach the WebSocket protocol handler.
pub async fn bind(
    name: &str,
    port: u16,
    handlers: &[MessageHandler],
    log: LogSink,
) -> std::io::Result<BoundServer> {
    let listener = bind_localhost(port).await?;
    let port = listener.local_addr()?.port();
    let connections = ConnectionTracker::new();

    BoundServer::new(listener, Some(connections.clone()), |handle| {
        let state = Arc::new(WsState {
            name: name.to_string(),
            port,
            handlers: handlers.to_vec(),
            log,
            shutdown: handle.shutdown_signal(),
            connections,
        });
        Router::new().fallback(upgrade).with_state(state)
    })
}

impl Inbound {
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(raw.to_string()),
        }
    }

    /// The reply for this frame under `handlers`.
    ///
    /// JSON frames match a handler by their `type` field; plain text matches
    /// a handler typed `message` or `text`. A matched handler without a
    /// configured response answers `{echo}`; no match answers a typed echo.
    pub fn reply(&self, handlers: &[MessageHandler]) -> Value {
        match self {
            Self::Json(message) => {
                let message_type = message.get("type").and_then(Value::as_str);
                let handler = handlers
                    .iter()
                    .find(|h| Some(h.message_type.as_str()) == message_type);
                match handler {
                    Some(h) => h
                        .response
                        .clone()
                        .unwrap_or_else(|| json!({ "echo": message })),
                    None => json!({
                        "type": "echo",
                        "original": message,
                        "timestamp": Utc::now(),
                    }),
                }
            }
            Self::Text(raw) => {
                let handler = handlers
                    .iter()
                    .find(|h| h.message_type == "message" || h.message_type == "text");
                match handler {
                    Some(h) => h.response.clone().unwrap_or_else(|| json!({ "echo": raw })),
                    None => json!({
                        "type": "echo",
                        "message": raw,
                        "timestamp": Utc::now(),
                    }),
                }
            }
        }
    }

    fn log_message(&self) -> &'static str {
        match self {
            Self::Json(_) => "Received JSON message",
            Self::Text(_) => "Received text message",
        }
    }
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<Arc<WsState>>) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: Arc<WsState>) {
    let _guard = state.connections.enter();
    let mut shutdown = state.shutdown.clone();
    if *shutdown.borrow_and_update() {
        return;
    }

    let connection_id = uuid::Uuid::now_v7().to_string();
    state.log.append(
        state.port,
        LogKind::Connection {
            connection_id: connection_id.clone(),
            message: "Client connected".into(),
        },
    );
    debug!("[{}] Client connected: {connection_id}", state.name);

    let (mut ws_tx, mut ws_rx) = socket.split();

    let welcome = json!({
        "type": "welcome",
        "message": format!("Connected to {}", state.name),
        "server": state.name,
        "timestamp": Utc::now(),
    });
    if let Err(e) = ws_tx.send(Message::Text(welcome.to_string().into())).await {
        warn!("[{}] Failed to send welcome to {connection_id}: {e}", state.name);
    }

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                let raw = match msg {
                    Some(Ok(Message::Text(text))) => text.as_str().to_string(),
                    Some(Ok(Message::Binary(data))) => String::from_utf8_lossy(&data).into_owned(),
                    // The socket answers pings on its own.
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!("[{}] WebSocket error for {connection_id}: {e}", state.name);
                        break;
                    }
                };

                if let Err(e) = respond(&state, &connection_id, &raw, &mut ws_tx).await {
                    warn!("[{}] Failed to reply to {connection_id}: {e}", state.name);
                    break;
                }
            }

            _ = wait_until_set(&mut shutdown) => {
                let close = CloseFrame {
                    code: close_code::AWAY,
                    reason: "Server stopping".into(),
                };
                let _ = ws_tx.send(Message::Close(Some(close))).await;
                break;
            }
        }
    }

    state.log.append(
        state.port,
        LogKind::Disconnection {
            connection_id: connection_id.clone(),
            message: "Client disconnected".into(),
        },
    );
    debug!("[{}] Client disconnected: {connection_id}", state.name);
}

async fn respond(
    state: &WsState,
    connection_id: &str,
    raw: &str,
    ws_tx: &mut SplitSink<WebSocket, Message>,
) -> Result<(), axum::Error> {
    let inbound = Inbound::parse(raw);
    state.log.append(
        state.port,
        LogKind::Message {
            connection_id: connection_id.to_string(),
            message: inbound.log_message().into(),
            data: raw.to_string(),
        },
    );

    let reply = inbound.reply(&state.handlers);
    ws_tx.send(Message::Text(reply.to_string().into())).await
}
