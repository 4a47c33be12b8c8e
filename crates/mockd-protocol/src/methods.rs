//! Method and notification names on the control channel.

/// Requests the UI sends.
pub struct Methods;

impl Methods {
    pub const SERVER_CREATE_HTTP: &str = "server/createHttp";
    pub const SERVER_CREATE_WEBSOCKET: &str = "server/createWebSocket";
    pub const SERVER_STOP: &str = "server/stop";
    pub const SERVER_STATUS: &str = "server/status";
    pub const SERVER_LIST: &str = "server/list";
    pub const SERVER_LOGS: &str = "server/logs";
    pub const SERVER_CLEAR_LOGS: &str = "server/clearLogs";

    pub const CONFIG_SAVE: &str = "config/save";
    pub const CONFIG_LOAD: &str = "config/load";
    pub const CONFIG_LIST: &str = "config/list";
    pub const CONFIG_DELETE: &str = "config/delete";
}

/// Pushes the backend sends.
pub struct Notifications;

impl Notifications {
    /// Sent once per control connection, right after the upgrade.
    pub const SERVER_CONNECTED: &str = "server/connected";

    pub const SERVER_DID_START: &str = "server/didStart";
    pub const SERVER_DID_STOP: &str = "server/didStop";
    pub const SERVER_DID_LOG: &str = "server/didLog";
}
