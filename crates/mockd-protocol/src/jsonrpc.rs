//! JSON-RPC 2.0 envelopes for the control channel.
//!
//! The transport deserializes every inbound frame into a [`ControlRequest`]
//! and answers with a [`ControlResponse`]; backend-initiated pushes are
//! [`Notification`]s.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::error::ControlError;

/// The literal `"jsonrpc": "2.0"` marker. Any other value fails to deserialize.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct V2;

impl Serialize for V2 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("2.0")
    }
}

impl<'de> Deserialize<'de> for V2 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match String::deserialize(deserializer)?.as_str() {
            "2.0" => Ok(V2),
            other => Err(de::Error::custom(format!("unsupported jsonrpc version {other:?}"))),
        }
    }
}

/// Request id, echoed back on the response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControlRequest {
    pub jsonrpc: V2,
    #[serde(default)]
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// Either `result` or `error`, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Result(Value),
    Error(ControlError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub jsonrpc: V2,
    /// `null` when the request could not be read far enough to find its id.
    pub id: Option<RequestId>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Server-to-client push; carries no id and expects no reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub jsonrpc: V2,
    pub method: String,
    pub params: Value,
}

/// What a service handler returns.
pub type HandlerResult = Result<Value, ControlError>;

impl ControlResponse {
    pub fn new(id: Option<RequestId>, result: HandlerResult) -> Self {
        let outcome = match result {
            Ok(value) => Outcome::Result(value),
            Err(err) => Outcome::Error(err),
        };
        Self {
            jsonrpc: V2,
            id,
            outcome,
        }
    }
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: V2,
            method: method.into(),
            params,
        }
    }
}
