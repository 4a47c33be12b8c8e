//! Control-channel services over the [`ServerRegistry`].
//!
//! `server/*` covers running servers and their logs; `config/*` covers the
//! saved configurations. Both share one registry.

use std::sync::Arc;

use mockd_protocol::{ControlError, HandlerResult, Methods, ServerConfig, ServerType};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::Service;
use crate::registry::ServerRegistry;

/// Handles `server/*`: create, stop, status, list, logs.
pub struct ServerService {
    registry: Arc<ServerRegistry>,
}

/// Handles `config/*`: save, load, list, delete.
pub struct ConfigService {
    registry: Arc<ServerRegistry>,
}

impl ServerService {
    pub fn new(registry: Arc<ServerRegistry>) -> Self {
        Self { registry }
    }
}

impl ConfigService {
    pub fn new(registry: Arc<ServerRegistry>) -> Self {
        Self { registry }
    }
}

impl Service for ServerService {
    fn namespace(&self) -> &str {
        "server"
    }

    async fn handle(&self, method: &str, params: Option<Value>) -> HandlerResult {
        match method {
            // { success, port, url }
            Methods::SERVER_CREATE_HTTP => {
                let config = parse_config(params, Some(ServerType::Http))?;
                to_result(&self.registry.create(config).await?)
            }

            Methods::SERVER_CREATE_WEBSOCKET => {
                let config = parse_config(params, Some(ServerType::WebSocket))?;
                to_result(&self.registry.create(config).await?)
            }

            // { success, port }
            Methods::SERVER_STOP => {
                let p: PortParam = parse_params(params)?;
                to_result(&self.registry.stop(p.port).await?)
            }

            // { running, type?, startTime?, config? }
            Methods::SERVER_STATUS => {
                let p: PortParam = parse_params(params)?;
                to_result(&self.registry.status(p.port))
            }

            Methods::SERVER_LIST => to_result(&self.registry.all_servers()),

            Methods::SERVER_LOGS => {
                let p: PortParam = parse_params(params)?;
                to_result(&self.registry.logs(p.port))
            }

            // { success, cleared }
            Methods::SERVER_CLEAR_LOGS => {
                let p: PortParam = parse_params(params)?;
                let cleared = self.registry.clear_logs(p.port);
                Ok(json!({
                    "success": cleared.is_some(),
                    "cleared": cleared.unwrap_or(0),
                }))
            }

            _ => Err(ControlError::method_not_found(method)),
        }
    }

    async fn shutdown(&self) {
        self.registry.shutdown_all().await;
    }
}

impl Service for ConfigService {
    fn namespace(&self) -> &str {
        "config"
    }

    async fn init(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.registry.startup().await;
        Ok(())
    }

    async fn handle(&self, method: &str, params: Option<Value>) -> HandlerResult {
        match method {
            // { success }
            Methods::CONFIG_SAVE => {
                let config = parse_config(params, None)?;
                self.registry.save_config(config).await?;
                Ok(json!({ "success": true }))
            }

            // { "<port>": { ...config, savedAt } }
            Methods::CONFIG_LOAD | Methods::CONFIG_LIST => {
                to_result(&self.registry.load_configurations().await)
            }

            // { success, error? }, never an error response
            Methods::CONFIG_DELETE => {
                let p: PortParam = parse_params(params)?;
                match self.registry.delete_config(p.port).await {
                    Ok(_) => Ok(json!({ "success": true })),
                    Err(e) => Ok(json!({ "success": false, "error": e.to_string() })),
                }
            }

            _ => Err(ControlError::method_not_found(method)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Params
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct PortParam {
    port: u16,
}

fn parse_params<T: for<'de> Deserialize<'de>>(params: Option<Value>) -> Result<T, ControlError> {
    match params {
        Some(v) => serde_json::from_value(v)
            .map_err(|e| ControlError::invalid_params(format!("Invalid parameters: {e}"))),
        None => Err(ControlError::invalid_params("Parameters required")),
    }
}

/// Parse a server config. When the method fixes the kind, a missing `type`
/// defaults to it and a conflicting one is rejected.
fn parse_config(params: Option<Value>, expected: Option<ServerType>) -> Result<ServerConfig, ControlError> {
    let mut params = match params {
        Some(Value::Object(map)) => map,
        Some(_) => return Err(ControlError::invalid_params("Server config must be an object")),
        None => return Err(ControlError::invalid_params("Parameters required")),
    };

    if let Some(expected) = expected {
        match params.get("type").and_then(Value::as_str) {
            None => {
                params.insert("type".into(), Value::String(expected.as_str().into()));
            }
            Some(found) if found != expected.as_str() => {
                return Err(ControlError::invalid_params(format!(
                    "Expected a {expected} server config, got type {found:?}"
                )));
            }
            Some(_) => {}
        }
    }

    serde_json::from_value(Value::Object(params))
        .map_err(|e| ControlError::invalid_params(format!("Invalid server config: {e}")))
}

fn to_result<T: Serialize>(value: &T) -> HandlerResult {
    serde_json::to_value(value).map_err(|e| ControlError::internal(format!("Failed to encode result: {e}")))
}
