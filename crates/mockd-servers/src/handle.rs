//! Listener handles shared by both server factories.
//!
//! A factory binds the socket first and hands back a [`BoundServer`]; the
//! registry records its [`ServerHandle`] and only then starts serving, so
//! nothing a client sends can be logged against an unregistered port.

use std::future::IntoFuture;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, warn};

/// How long a closing server waits for in-flight connections before it
/// drops them and releases the port anyway.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Cloneable handle to a running mock server.
#[derive(Clone)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: Arc<watch::Sender<bool>>,
    closed_rx: watch::Receiver<bool>,
    /// WebSocket protocol handle; `None` for HTTP servers.
    connections: Option<ConnectionTracker>,
}

/// Counts open WebSocket connections so close can wait for them to drain.
#[derive(Clone)]
pub struct ConnectionTracker {
    count: Arc<watch::Sender<usize>>,
}

/// Decrements the connection count when dropped.
pub struct ConnectionGuard {
    count: Arc<watch::Sender<usize>>,
}

/// A bound but not yet serving listener.
pub struct BoundServer {
    listener: TcpListener,
    app: Router,
    handle: ServerHandle,
    closed_tx: watch::Sender<bool>,
}

/// Bind the IPv4 loopback only; mock servers are never exposed on other interfaces.
pub(crate) async fn bind_localhost(port: u16) -> std::io::Result<TcpListener> {
    TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await
}

/// Wait for a flag to become `true`. Returns `false` if the sender went
/// away first. Cancel-safe, so it can sit in a `select!` loop.
pub(crate) async fn wait_until_set(rx: &mut watch::Receiver<bool>) -> bool {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return false;
        }
    }
    true
}

impl ServerHandle {
    fn new(local_addr: SocketAddr, connections: Option<ConnectionTracker>) -> (Self, watch::Sender<bool>) {
        let (shutdown_tx, _) = watch::channel(false);
        let (closed_tx, closed_rx) = watch::channel(false);
        let handle = Self {
            local_addr,
            shutdown_tx: Arc::new(shutdown_tx),
            closed_rx,
            connections,
        };
        (handle, closed_tx)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Receiver that flips to `true` once close has been requested.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn connections(&self) -> Option<&ConnectionTracker> {
        self.connections.as_ref()
    }

    /// Close the server and wait until it is fully down: open WebSocket
    /// connections first, then the listener task.
    pub async fn close(self) {
        self.shutdown_tx.send_replace(true);

        if let Some(connections) = &self.connections {
            if tokio::time::timeout(SHUTDOWN_GRACE, connections.wait_idle()).await.is_err() {
                warn!(
                    "{} WebSocket connection(s) on {} still open after {SHUTDOWN_GRACE:?}",
                    connections.count(),
                    self.local_addr
                );
            }
        }

        let mut closed = self.closed_rx;
        if !wait_until_set(&mut closed).await {
            warn!("Listener on {} exited without reporting close", self.local_addr);
        }
        debug!("Listener on {} closed", self.local_addr);
    }
}

impl ConnectionTracker {
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self {
            count: Arc::new(count),
        }
    }

    /// Register an open connection for as long as the guard lives.
    pub fn enter(&self) -> ConnectionGuard {
        self.count.send_modify(|n| *n += 1);
        ConnectionGuard {
            count: self.count.clone(),
        }
    }

    pub fn count(&self) -> usize {
        *self.count.borrow()
    }

    pub async fn wait_idle(&self) {
        let mut rx = self.count.subscribe();
        while *rx.borrow_and_update() != 0 {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.count.send_modify(|n| *n = n.saturating_sub(1));
    }
}

impl BoundServer {
    /// Wrap a freshly bound listener. `build_app` receives the handle so the
    /// app can subscribe to the shutdown signal before serving starts.
    pub(crate) fn new(
        listener: TcpListener,
        connections: Option<ConnectionTracker>,
        build_app: impl FnOnce(&ServerHandle) -> Router,
    ) -> std::io::Result<Self> {
        let local_addr = listener.local_addr()?;
        let (handle, closed_tx) = ServerHandle::new(local_addr, connections);
        let app = build_app(&handle);
        Ok(Self {
            listener,
            app,
            handle,
            closed_tx,
        })
    }

    pub fn handle(&self) -> &ServerHandle {
        &self.handle
    }

    pub fn port(&self) -> u16 {
        self.handle.port()
    }

    /// Start accepting connections. Returns the handle used to close it.
    pub fn serve(self) -> ServerHandle {
        let Self {
            listener,
            app,
            handle,
            closed_tx,
        } = self;
        let mut shutdown_rx = handle.shutdown_signal();
        let mut grace_rx = handle.shutdown_signal();
        let addr = handle.local_addr();

        tokio::spawn(async move {
            let serve = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                wait_until_set(&mut shutdown_rx).await;
            });

            // A client that never finishes its request would hold graceful
            // shutdown open forever.
            let result = tokio::select! {
                result = serve.into_future() => result,
                _ = async {
                    wait_until_set(&mut grace_rx).await;
                    tokio::time::sleep(SHUTDOWN_GRACE).await;
                } => {
                    warn!("Mock server on {addr} did not drain within {SHUTDOWN_GRACE:?}; dropping it");
                    Ok(())
                }
            };

            if let Err(e) = result {
                warn!("Mock server on {addr} stopped with error: {e}");
            }
            closed_tx.send_replace(true);
        });

        handle
    }
}
