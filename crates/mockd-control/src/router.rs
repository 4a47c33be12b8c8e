//! Control router: dispatches JSON-RPC requests to services.

use std::collections::HashMap;

use mockd_protocol::{ControlError, ControlErrorCode, HandlerResult};
use mockd_servers::Service;
use mockd_transport::RequestHandler;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{info, warn};

type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// The control server: owns services and routes requests by the method's
/// namespace (`server/start` goes to the `server` service).
pub struct ControlServer {
    services: HashMap<String, Box<dyn ServiceDyn>>,
    state: Mutex<ServerState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerState {
    Uninitialized,
    Running,
    Shutdown,
}

/// Object-safe wrapper for the Service trait.
trait ServiceDyn: Send + Sync {
    fn handle_dyn<'a>(&'a self, method: &'a str, params: Option<Value>) -> BoxFuture<'a, HandlerResult>;
    fn init_dyn(&self) -> BoxFuture<'_, Result<(), Box<dyn std::error::Error + Send + Sync>>>;
    fn shutdown_dyn(&self) -> BoxFuture<'_, ()>;
}

impl<T: Service> ServiceDyn for T {
    fn handle_dyn<'a>(&'a self, method: &'a str, params: Option<Value>) -> BoxFuture<'a, HandlerResult> {
        Box::pin(self.handle(method, params))
    }
    fn init_dyn(&self) -> BoxFuture<'_, Result<(), Box<dyn std::error::Error + Send + Sync>>> {
        Box::pin(self.init())
    }
    fn shutdown_dyn(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.shutdown())
    }
}

impl Default for ControlServer {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlServer {
    pub fn new() -> Self {
        Self {
            services: HashMap::new(),
            state: Mutex::new(ServerState::Uninitialized),
        }
    }

    /// Register a service under its namespace. A later service with the
    /// same namespace replaces the earlier one.
    pub fn register_service<S: Service + 'static>(&mut self, service: S) {
        let namespace = service.namespace().to_string();
        info!("Registering service: {namespace}");
        if self.services.insert(namespace.clone(), Box::new(service)).is_some() {
            warn!("Service {namespace} registered twice; keeping the last one");
        }
    }

    /// Initialize all services. Requests are rejected until this succeeds.
    pub async fn initialize(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        for service in self.services.values() {
            service.init_dyn().await?;
        }

        *self.state.lock() = ServerState::Running;
        info!("Control server initialized ({} services)", self.services.len());
        Ok(())
    }

    /// Shut down all services. Safe to call more than once.
    pub async fn shutdown(&self) {
        {
            let mut state = self.state.lock();
            if *state == ServerState::Shutdown {
                return;
            }
            *state = ServerState::Shutdown;
        }

        info!("Shutting down control server...");
        for service in self.services.values() {
            service.shutdown_dyn().await;
        }
        info!("Control server shutdown complete");
    }
}

impl RequestHandler for ControlServer {
    async fn handle_request(&self, method: &str, params: Option<Value>) -> HandlerResult {
        let state = *self.state.lock();
        match state {
            ServerState::Shutdown => {
                return Err(ControlError::new(ControlErrorCode::ShuttingDown, "Server is shutting down"));
            }
            ServerState::Uninitialized => {
                return Err(ControlError::new(ControlErrorCode::NotInitialized, "Server not initialized"));
            }
            ServerState::Running => {}
        }

        let namespace = method.split_once('/').map_or(method, |(ns, _)| ns);
        match self.services.get(namespace) {
            Some(service) => service.handle_dyn(method, params).await,
            None => Err(ControlError::method_not_found(method)),
        }
    }
}
