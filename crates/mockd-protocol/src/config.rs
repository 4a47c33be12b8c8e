//! Mock server configuration schema.
//!
//! A [`ServerConfig`] is the blueprint the UI submits: common fields plus a
//! `type`-tagged [`ServerKind`] carrying either HTTP routes or WebSocket
//! message handlers. On the wire the tag and the kind-specific list sit at
//! the top level of the object, next to `id`, `name`, and `port`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// User-declared blueprint for a mock server.
///
/// Fields the backend does not know about are carried in `extra` so a
/// save/load cycle hands the UI back exactly what it stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct ServerConfig {
    /// Opaque identifier used for bookkeeping in the UI; distinct from the port.
    pub id: String,
    /// Display label.
    pub name: String,
    /// Listening port; the registry key while the server runs.
    pub port: u16,
    pub kind: ServerKind,
    pub extra: Map<String, Value>,
}

/// Kind-specific part of a [`ServerConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerKind {
    #[serde(rename = "http")]
    Http {
        #[serde(default)]
        routes: Vec<RouteConfig>,
    },
    #[serde(rename = "websocket")]
    WebSocket {
        #[serde(default, rename = "messageHandlers")]
        message_handlers: Vec<MessageHandler>,
    },
}

/// The bare `type` tag of a server, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServerType {
    #[serde(rename = "http")]
    Http,
    #[serde(rename = "websocket")]
    WebSocket,
}

/// A static HTTP route: `(method, path)` answered with a fixed status and body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteConfig {
    /// Kept as the raw string so unsupported methods survive a round trip;
    /// the HTTP factory skips them when it builds the route table.
    pub method: String,
    pub path: String,
    #[serde(default = "default_status_code")]
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
}

/// WebSocket reply rule keyed by an incoming message `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageHandler {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
}

/// A [`ServerConfig`] as written to the configuration store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedConfig {
    #[serde(flatten)]
    pub config: ServerConfig,
    pub saved_at: DateTime<Utc>,
}

/// HTTP methods a route may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

/// Returned when a route declares a method outside GET/POST/PUT/DELETE/PATCH.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported route method: {0}")]
pub struct UnsupportedMethod(pub String);

impl ServerConfig {
    pub fn server_type(&self) -> ServerType {
        self.kind.server_type()
    }
}

impl ServerKind {
    pub fn server_type(&self) -> ServerType {
        match self {
            Self::Http { .. } => ServerType::Http,
            Self::WebSocket { .. } => ServerType::WebSocket,
        }
    }
}

impl ServerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::WebSocket => "websocket",
        }
    }

    /// URL scheme used when reporting a running server's base URL.
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::WebSocket => "ws",
        }
    }
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RouteMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
        }
    }
}

impl FromStr for RouteMethod {
    type Err = UnsupportedMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            "PATCH" => Ok(Self::Patch),
            _ => Err(UnsupportedMethod(s.to_string())),
        }
    }
}

impl fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_status_code() -> u16 {
    200
}

impl TryFrom<Map<String, Value>> for ServerConfig {
    type Error = serde_json::Error;

    fn try_from(mut fields: Map<String, Value>) -> Result<Self, Self::Error> {
        // The UI generates ids from timestamps, so they may arrive as numbers.
        let id = match fields.remove("id") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
        };
        let name = match fields.remove("name") {
            None | Some(Value::Null) => String::new(),
            Some(value) => serde_json::from_value(value)?,
        };
        let port = fields
            .remove("port")
            .ok_or_else(|| serde_json::Error::missing_field("port"))?;
        let port = serde_json::from_value(port)?;

        let tag = fields
            .remove("type")
            .ok_or_else(|| serde_json::Error::missing_field("type"))?;
        let list_key = match tag.as_str() {
            Some("http") => "routes",
            Some("websocket") => "messageHandlers",
            _ => return Err(serde_json::Error::custom(format!("unknown server type {tag}"))),
        };
        let mut kind = Map::new();
        kind.insert("type".into(), tag);
        if let Some(list) = fields.remove(list_key) {
            kind.insert(list_key.into(), list);
        }
        let kind = serde_json::from_value(Value::Object(kind))?;

        Ok(Self {
            id,
            name,
            port,
            kind,
            extra: fields,
        })
    }
}

impl From<ServerConfig> for Map<String, Value> {
    fn from(config: ServerConfig) -> Self {
        let mut fields = config.extra;
        if let Ok(Value::Object(kind)) = serde_json::to_value(&config.kind) {
            fields.extend(kind);
        }
        fields.insert("id".into(), Value::String(config.id));
        fields.insert("name".into(), Value::String(config.name));
        fields.insert("port".into(), Value::from(config.port));
        fields
    }
}
