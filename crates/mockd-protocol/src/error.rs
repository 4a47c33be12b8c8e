//! Control-channel errors as they travel in a JSON-RPC `error` object.

use serde::{Deserialize, Serialize};

/// Every error code the backend emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ControlErrorCode {
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,

    /// Request arrived before the services finished `init`.
    NotInitialized = -32001,
    ShuttingDown = -32002,

    PortInUse = -32020,
    NoServerOnPort = -32021,
    BindFailure = -32022,
    PersistenceFailure = -32023,
}

impl ControlErrorCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} ({code})")]
pub struct ControlError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ControlError {
    pub fn new(code: ControlErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    /// An error about one mock server; the port travels in `data`.
    pub fn for_port(code: ControlErrorCode, port: u16, message: impl Into<String>) -> Self {
        Self {
            data: Some(serde_json::json!({ "port": port })),
            ..Self::new(code, message)
        }
    }

    pub fn is(&self, code: ControlErrorCode) -> bool {
        self.code == code.code()
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(ControlErrorCode::MethodNotFound, format!("Unknown method {method:?}"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ControlErrorCode::InvalidParams, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ControlErrorCode::InternalError, message)
    }
}
