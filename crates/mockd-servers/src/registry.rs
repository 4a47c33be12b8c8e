//! ServerRegistry: owns every running mock server, keyed by port.
//!
//! Three maps sit behind one lock: running entries, their configs, and
//! their log buffers. They are only ever updated together, so no reader
//! sees a port in one map but not the others. Network and file I/O happen
//! outside the lock.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use mockd_protocol::{
    LogEntry, LogKind, Notifications, PersistedConfig, ServerConfig, ServerKind, ServerType,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::RegistryError;
use crate::handle::ServerHandle;
use crate::store::ConfigStore;
use crate::{http, websocket};

/// Most log entries kept per port; older entries are evicted first.
pub const MAX_LOG_ENTRIES: usize = 100;

/// Callback for emitting notifications to connected control clients.
pub type NotifySender = Arc<dyn Fn(&str, Value) + Send + Sync>;

pub struct ServerRegistry {
    shared: Arc<Shared>,
    store: ConfigStore,
}

/// Appends entries to the registry's per-port log buffers.
///
/// Handed to the server factories so their request and connection handlers
/// can log without a reference to the registry itself.
#[derive(Clone)]
pub struct LogSink {
    shared: Arc<Shared>,
}

struct Shared {
    state: RwLock<RegistryState>,
    notify: RwLock<Option<NotifySender>>,
}

#[derive(Default)]
struct RegistryState {
    servers: HashMap<u16, RunningServer>,
    configs: HashMap<u16, ServerConfig>,
    logs: HashMap<u16, VecDeque<LogEntry>>,
}

struct RunningServer {
    server_type: ServerType,
    handle: ServerHandle,
    started_at: DateTime<Utc>,
}

/// Result of a successful create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedServer {
    pub success: bool,
    pub port: u16,
    pub url: String,
}

/// Result of a successful stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoppedServer {
    pub success: bool,
    pub port: u16,
}

/// Live status of one port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub running: bool,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub server_type: Option<ServerType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ServerConfig>,
    /// Open connections, for WebSocket servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connections: Option<usize>,
}

/// One row of the running-server listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSummary {
    pub port: u16,
    #[serde(rename = "type")]
    pub server_type: ServerType,
    pub config: ServerConfig,
    pub start_time: DateTime<Utc>,
    pub running: bool,
}

impl ServerRegistry {
    pub fn new(store: ConfigStore) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(RegistryState::default()),
                notify: RwLock::new(None),
            }),
            store,
        }
    }

    /// Set the notification callback for pushing events to control clients.
    pub fn set_notify_sender(&self, sender: NotifySender) {
        *self.shared.notify.write() = Some(sender);
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// Load persisted configs and report what was found. Saved servers are
    /// not restarted; they stay inert until the UI creates them again.
    pub async fn startup(&self) -> usize {
        let saved = self.load_configurations().await;
        if saved.is_empty() {
            info!("No saved server configurations in {}", self.store.path().display());
        } else {
            let ports: Vec<String> = saved.keys().map(u16::to_string).collect();
            info!(
                "Found {} saved server configurations (ports: {}); auto-start is not supported",
                saved.len(),
                ports.join(", ")
            );
        }
        saved.len()
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────

    /// Bind and start a server for `config`.
    ///
    /// Fails with [`RegistryError::PortInUse`] if the port already runs a
    /// server, or [`RegistryError::Bind`] if the OS refuses the listener. A
    /// port of 0 takes an OS-assigned port; everything is then keyed by the
    /// bound port. The config is not persisted.
    pub async fn create(&self, mut config: ServerConfig) -> Result<CreatedServer, RegistryError> {
        let requested = config.port;
        if requested != 0 && self.shared.state.read().servers.contains_key(&requested) {
            return Err(RegistryError::PortInUse(requested));
        }

        let sink = self.log_sink();
        let bound = match &config.kind {
            ServerKind::Http { routes } => http::bind(&config.name, requested, routes, sink).await,
            ServerKind::WebSocket { message_handlers } => {
                websocket::bind(&config.name, requested, message_handlers, sink).await
            }
        }
        .map_err(|source| RegistryError::Bind {
            port: requested,
            source,
        })?;

        let port = bound.port();
        let server_type = config.server_type();
        config.port = port;

        {
            let mut state = self.shared.state.write();
            state.servers.insert(
                port,
                RunningServer {
                    server_type,
                    handle: bound.handle().clone(),
                    started_at: Utc::now(),
                },
            );
            state.configs.insert(port, config.clone());
            state.logs.insert(port, VecDeque::with_capacity(MAX_LOG_ENTRIES));
        }

        let url = format!("{}://localhost:{port}", server_type.scheme());
        let label = match server_type {
            ServerType::Http => "HTTP",
            ServerType::WebSocket => "WebSocket",
        };
        self.add_log(port, LogKind::server(format!("{label} server \"{}\" started on {url}", config.name)));

        bound.serve();

        info!("{label} server \"{}\" started on {url}", config.name);
        self.shared.emit(
            Notifications::SERVER_DID_START,
            json!({ "port": port, "type": server_type, "url": url }),
        );

        Ok(CreatedServer {
            success: true,
            port,
            url,
        })
    }

    /// Close the server on `port` and wait for it to go down, then forget
    /// it. Also drops any saved config for the port, best-effort.
    pub async fn stop(&self, port: u16) -> Result<StoppedServer, RegistryError> {
        let handle = self
            .shared
            .state
            .read()
            .servers
            .get(&port)
            .map(|server| server.handle.clone())
            .ok_or(RegistryError::NoServerOnPort(port))?;

        handle.close().await;

        self.add_log(port, LogKind::server(format!("Server on port {port} stopped")));

        let removed = {
            let mut state = self.shared.state.write();
            let removed = state.servers.remove(&port);
            state.configs.remove(&port);
            state.logs.remove(&port);
            removed
        };
        if removed.is_none() {
            // A concurrent stop finished first.
            return Err(RegistryError::NoServerOnPort(port));
        }

        self.cleanup_best_effort(port).await;

        info!("Server on port {port} stopped");
        self.shared
            .emit(Notifications::SERVER_DID_STOP, json!({ "port": port }));

        Ok(StoppedServer {
            success: true,
            port,
        })
    }

    /// Close every running server (process exit). Saved configs are kept.
    pub async fn shutdown_all(&self) {
        let handles: Vec<(u16, ServerHandle)> = self
            .shared
            .state
            .read()
            .servers
            .iter()
            .map(|(port, server)| (*port, server.handle.clone()))
            .collect();

        if handles.is_empty() {
            return;
        }
        info!("Shutting down {} mock servers", handles.len());

        let ports: Vec<u16> = handles.iter().map(|(port, _)| *port).collect();
        join_all(handles.into_iter().map(|(_, handle)| handle.close())).await;

        let mut state = self.shared.state.write();
        for port in ports {
            state.servers.remove(&port);
            state.configs.remove(&port);
            state.logs.remove(&port);
        }
    }

    // ── Queries ───────────────────────────────────────────────────────────

    /// Live status of `port`. Never fails; an idle port reports `running: false`.
    pub fn status(&self, port: u16) -> ServerStatus {
        let state = self.shared.state.read();
        match state.servers.get(&port) {
            Some(server) => ServerStatus {
                running: true,
                server_type: Some(server.server_type),
                start_time: Some(server.started_at),
                config: state.configs.get(&port).cloned(),
                connections: server.handle.connections().map(|c| c.count()),
            },
            None => ServerStatus {
                running: false,
                server_type: None,
                start_time: None,
                config: None,
                connections: None,
            },
        }
    }

    /// Snapshot of every running server, ordered by port.
    pub fn all_servers(&self) -> Vec<ServerSummary> {
        let state = self.shared.state.read();
        let mut servers: Vec<ServerSummary> = state
            .servers
            .iter()
            .filter_map(|(port, server)| {
                let config = state.configs.get(port)?.clone();
                Some(ServerSummary {
                    port: *port,
                    server_type: server.server_type,
                    config,
                    start_time: server.started_at,
                    running: true,
                })
            })
            .collect();
        servers.sort_by_key(|s| s.port);
        servers
    }

    pub fn is_running(&self, port: u16) -> bool {
        self.shared.state.read().servers.contains_key(&port)
    }

    // ── Logs ──────────────────────────────────────────────────────────────

    /// Current log buffer for `port`, oldest first; empty if none.
    pub fn logs(&self, port: u16) -> Vec<LogEntry> {
        self.shared
            .state
            .read()
            .logs
            .get(&port)
            .map(|buffer| buffer.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Append an entry for a running server. Entries for ports that are not
    /// registered are dropped.
    pub fn add_log(&self, port: u16, kind: LogKind) {
        self.shared.append_log(port, kind);
    }

    /// Empty the buffer for `port`. Returns how many entries were dropped,
    /// or `None` when the port is not running.
    pub fn clear_logs(&self, port: u16) -> Option<usize> {
        let mut state = self.shared.state.write();
        let buffer = state.logs.get_mut(&port)?;
        let cleared = buffer.len();
        buffer.clear();
        Some(cleared)
    }

    pub fn log_sink(&self) -> LogSink {
        LogSink {
            shared: self.shared.clone(),
        }
    }

    // ── Persistence ───────────────────────────────────────────────────────

    /// Persist `config` under its port, stamped with `savedAt`. Independent
    /// of whether the server is running.
    pub async fn save_config(&self, config: ServerConfig) -> Result<PersistedConfig, RegistryError> {
        let port = config.port;
        let record = PersistedConfig {
            config,
            saved_at: Utc::now(),
        };
        self.store
            .put(port, record.clone())
            .await
            .map_err(|source| RegistryError::Persistence { port, source })?;
        debug!("Saved configuration for port {port}");
        Ok(record)
    }

    /// Every persisted config, keyed by port.
    pub async fn load_configurations(&self) -> BTreeMap<u16, PersistedConfig> {
        self.store.read_all().await
    }

    /// Remove the persisted config for `port`. Removing a missing record
    /// succeeds; returns whether one existed.
    pub async fn delete_config(&self, port: u16) -> Result<bool, RegistryError> {
        self.store
            .remove(port)
            .await
            .map_err(|source| RegistryError::Persistence { port, source })
    }

    /// Delete the saved config for a stopped server. Never fails the caller.
    async fn cleanup_best_effort(&self, port: u16) {
        if let Err(e) = self.delete_config(port).await {
            warn!("Stopped server on port {port} but could not delete its saved config: {e}");
        }
    }
}

impl LogSink {
    pub fn append(&self, port: u16, kind: LogKind) {
        self.shared.append_log(port, kind);
    }
}

impl Shared {
    fn append_log(&self, port: u16, kind: LogKind) {
        let entry = LogEntry::new(uuid::Uuid::new_v4().to_string(), kind);
        {
            let mut state = self.state.write();
            let Some(buffer) = state.logs.get_mut(&port) else {
                debug!("Dropping {} log entry for idle port {port}", entry.kind.name());
                return;
            };
            buffer.push_back(entry.clone());
            while buffer.len() > MAX_LOG_ENTRIES {
                buffer.pop_front();
            }
        }
        self.emit(
            Notifications::SERVER_DID_LOG,
            json!({ "port": port, "entry": entry }),
        );
    }

    fn emit(&self, method: &str, params: Value) {
        let sender = self.notify.read().clone();
        if let Some(send) = sender {
            send(method, params);
        }
    }
}
