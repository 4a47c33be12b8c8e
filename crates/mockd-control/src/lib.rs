//! mockd control router
//!
//! Owns the registered services and routes each JSON-RPC request to the
//! service whose namespace matches the method prefix.

pub mod router;

pub use router::ControlServer;
