//! mockd control transport
//!
//! Carries the control channel between the desktop UI and the backend:
//! JSON-RPC 2.0 over a WebSocket at `/ws`, plus `GET /health`. It handles
//! connection lifecycle, the welcome notification, and broadcasting
//! notifications to every connected client.
//!
//! The transport is decoupled from request routing via the `RequestHandler` trait.

pub mod server;

pub use server::{RequestHandler, TransportConfig, TransportServer};
