//! Mock server core
//!
//! Provisions, tracks, and tears down HTTP and WebSocket mock servers at
//! runtime, keyed by port. The [`ServerRegistry`] owns running servers and
//! their bounded logs; the [`http`] and [`websocket`] factories build the
//! listeners; the [`ConfigStore`] persists configurations across restarts.
//!
//! The [`Service`] implementations in [`service`] expose the registry to the
//! control router, one namespace each.

pub mod error;
pub mod handle;
pub mod http;
pub mod registry;
pub mod routes;
pub mod service;
pub mod store;
pub mod websocket;

pub use error::{RegistryError, StoreError};
pub use registry::{NotifySender, ServerRegistry};
pub use store::ConfigStore;

use mockd_protocol::HandlerResult;

/// Trait implemented by all control services.
///
/// Each service handles a namespace of methods (e.g., "server/*", "config/*").
pub trait Service: Send + Sync {
    /// The namespace prefix this service handles (e.g., "server").
    fn namespace(&self) -> &str;

    /// Handle a JSON-RPC request within this service's namespace.
    ///
    /// `method` is the full method string (e.g., "server/stop").
    fn handle(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> impl std::future::Future<Output = HandlerResult> + Send;

    /// Initialize the service (called once at startup).
    fn init(&self) -> impl std::future::Future<Output = Result<(), Box<dyn std::error::Error + Send + Sync>>> + Send {
        async { Ok(()) }
    }

    /// Shutdown the service (called once at server shutdown).
    fn shutdown(&self) -> impl std::future::Future<Output = ()> + Send {
        async {}
    }
}
