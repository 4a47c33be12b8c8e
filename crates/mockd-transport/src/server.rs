//! WebSocket control server using Axum.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use mockd_protocol::{
    ControlError, ControlErrorCode, ControlRequest, ControlResponse, HandlerResult, Notification,
    Notifications, RequestId,
};
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Implemented by the control router to handle incoming requests.
/// The transport calls this for every well-formed JSON-RPC request.
pub trait RequestHandler: Send + Sync + 'static {
    /// Handle a JSON-RPC request and return its result.
    fn handle_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> impl std::future::Future<Output = HandlerResult> + Send;
}

/// Transport server configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Hostname to bind to
    pub hostname: String,
    /// Maximum concurrent control clients
    pub max_connections: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: 7071,
            hostname: "127.0.0.1".into(),
            max_connections: 8,
        }
    }
}

struct AppState<H: RequestHandler> {
    handler: Arc<H>,
    max_connections: usize,
    /// Broadcast channel for notifications (server → all clients)
    notification_tx: broadcast::Sender<String>,
    client_count: Arc<AtomicUsize>,
}

/// A reserved client slot. Taken before the upgrade is accepted and
/// released when the connection task ends, so the count never passes the cap.
struct ClientSlot(Arc<AtomicUsize>);

impl ClientSlot {
    fn acquire(count: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .ok()
            .map(|_| Self(count.clone()))
    }
}

impl Drop for ClientSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// The transport server: accepts control connections and routes messages.
pub struct TransportServer {
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
    /// Actual bound port
    port: u16,
}

impl TransportServer {
    /// Start the transport server. Anything published on `notification_tx`
    /// is pushed to every connected client, so other subsystems can hold a
    /// sender before the transport exists.
    pub async fn start<H: RequestHandler>(
        config: TransportConfig,
        handler: Arc<H>,
        notification_tx: broadcast::Sender<String>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        let state = Arc::new(AppState {
            handler,
            max_connections: config.max_connections,
            notification_tx,
            client_count: Arc::new(AtomicUsize::new(0)),
        });

        let app = Router::new()
            .route("/ws", get(ws_upgrade_handler::<H>))
            .route("/health", get(health_handler::<H>))
            .with_state(state);

        let addr: SocketAddr = format!("{}:{}", config.hostname, config.port).parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let actual_port = listener.local_addr()?.port();

        info!("Control channel listening on ws://{}:{}/ws", config.hostname, actual_port);

        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await;
            if let Err(e) = result {
                error!("Control channel stopped with error: {e}");
            }
        });

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            port: actual_port,
        })
    }

    /// Get the actual bound port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Gracefully stop the server.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("Control channel stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn ws_upgrade_handler<H: RequestHandler>(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState<H>>>,
) -> impl IntoResponse {
    let Some(slot) = ClientSlot::acquire(&state.client_count, state.max_connections) else {
        warn!(
            "Control connection rejected: max connections reached ({})",
            state.max_connections
        );
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    ws.on_upgrade(move |socket| handle_ws_connection(socket, state, slot))
        .into_response()
}

async fn health_handler<H: RequestHandler>(
    State(state): State<Arc<AppState<H>>>,
) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "clients": state.client_count.load(Ordering::Acquire),
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Connection Handler
// ─────────────────────────────────────────────────────────────────────────────

async fn handle_ws_connection<H: RequestHandler>(
    socket: WebSocket,
    state: Arc<AppState<H>>,
    slot: ClientSlot,
) {
    let client_id = uuid::Uuid::new_v4().to_string();
    info!("Control client connected: {client_id}");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut notification_rx = state.notification_tx.subscribe();

    let welcome = Notification::new(
        Notifications::SERVER_CONNECTED,
        json!({
            "clientId": client_id,
            "serverVersion": env!("CARGO_PKG_VERSION"),
        }),
    );
    if let Some(text) = encode(&welcome) {
        let _ = ws_tx.send(Message::Text(text.into())).await;
    }

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let response = handle_message(text.as_str(), &state.handler).await;
                        let Some(response) = encode(&response) else { continue };
                        if let Err(e) = ws_tx.send(Message::Text(response.into())).await {
                            error!("Failed to send response to {client_id}: {e}");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Control client closed: {client_id}");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error for {client_id}: {e}");
                        break;
                    }
                    // Pings are answered by the socket itself.
                    Some(Ok(_)) => {}
                }
            }

            notification = notification_rx.recv() => {
                match notification {
                    Ok(msg) => {
                        if let Err(e) = ws_tx.send(Message::Text(msg.into())).await {
                            error!("Failed to push notification to {client_id}: {e}");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Client {client_id} lagged; dropped {skipped} notifications");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    drop(slot);
    info!(
        "Control client disconnected: {client_id} (total: {})",
        state.client_count.load(Ordering::Acquire)
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Decode one text frame and run it through the handler.
///
/// Unparseable JSON answers with id `null`. A frame that parses but is not a
/// valid request still echoes its id when one can be read.
async fn handle_message<H: RequestHandler>(text: &str, handler: &Arc<H>) -> ControlResponse {
    let raw: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            return ControlResponse::new(
                None,
                Err(ControlError::new(ControlErrorCode::ParseError, format!("Failed to parse JSON: {e}"))),
            );
        }
    };

    let id: Option<RequestId> = raw.get("id").cloned().and_then(|v| serde_json::from_value(v).ok());
    let request = match serde_json::from_value::<ControlRequest>(raw) {
        Ok(request) if !request.method.is_empty() => request,
        Ok(_) => return invalid_request(id, "method must not be empty"),
        Err(e) => return invalid_request(id, &e.to_string()),
    };

    let result = handler.handle_request(&request.method, request.params).await;
    ControlResponse::new(request.id, result)
}

fn invalid_request(id: Option<RequestId>, reason: &str) -> ControlResponse {
    ControlResponse::new(
        id,
        Err(ControlError::new(
            ControlErrorCode::InvalidRequest,
            format!("Invalid JSON-RPC 2.0 request: {reason}"),
        )),
    )
}

fn encode<T: serde::Serialize>(message: &T) -> Option<String> {
    serde_json::to_string(message)
        .map_err(|e| error!("Failed to encode control message: {e}"))
        .ok()
}
