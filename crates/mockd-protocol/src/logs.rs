//! Per-port log entries recorded by running mock servers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry in a server's bounded log buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: LogKind,
}

/// What happened, tagged on the wire by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum LogKind {
    /// Lifecycle message (started, stopped).
    Server { message: String },
    Connection {
        connection_id: String,
        message: String,
    },
    Disconnection {
        connection_id: String,
        message: String,
    },
    /// Inbound HTTP request, recorded before route matching.
    Request {
        method: String,
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        query: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ip: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<Value>,
    },
    /// Response sent by a user-declared route.
    Response {
        method: String,
        path: String,
        status_code: u16,
    },
    /// Inbound WebSocket payload; `data` holds the raw text.
    Message {
        connection_id: String,
        message: String,
        data: String,
    },
}

impl LogKind {
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    /// The wire `type` tag.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Server { .. } => "server",
            Self::Connection { .. } => "connection",
            Self::Disconnection { .. } => "disconnection",
            Self::Request { .. } => "request",
            Self::Response { .. } => "response",
            Self::Message { .. } => "message",
        }
    }
}

impl LogEntry {
    pub fn new(id: impl Into<String>, kind: LogKind) -> Self {
        Self {
            id: id.into(),
            timestamp: Utc::now(),
            kind,
        }
    }
}
