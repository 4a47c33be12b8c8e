//! mockd control protocol - wire types
//!
//! What the desktop UI and the backend exchange: JSON-RPC 2.0 envelopes,
//! method names, error codes, mock server configurations and the per-port
//! log entries.

pub mod config;
pub mod error;
pub mod jsonrpc;
pub mod logs;
pub mod methods;

pub use config::{
    MessageHandler, PersistedConfig, RouteConfig, RouteMethod, ServerConfig, ServerKind,
    ServerType, UnsupportedMethod,
};
pub use error::{ControlError, ControlErrorCode};
pub use jsonrpc::{ControlRequest, ControlResponse, HandlerResult, Notification, Outcome, RequestId};
pub use logs::{LogEntry, LogKind};
pub use methods::{Methods, Notifications};
