//! Service-level functional tests.
//!
//! Drives each service through `Service::handle`, checking the JSON-RPC
//! results and error codes exactly as the desktop UI sees them.

use std::sync::Arc;

use mockd_protocol::ControlErrorCode;
use mockd_servers::service::{ConfigService, ServerService};
use mockd_servers::{ConfigStore, ServerRegistry, Service};
use serde_json::{Value, json};
use tempfile::TempDir;

fn registry() -> (TempDir, Arc<ServerRegistry>) {
    let dir = TempDir::new().unwrap();
    let store = ConfigStore::new(dir.path().join("server-configs.json"));
    (dir, Arc::new(ServerRegistry::new(store)))
}

// ─────────────────────────────────────────────────────────────────────────────
// server/*
// ─────────────────────────────────────────────────────────────────────────────

mod server {
    use super::*;

    #[tokio::test]
    async fn create_http_defaults_type_from_method() {
        let (_dir, registry) = registry();
        let s = ServerService::new(registry.clone());

        let result = s
            .handle(
                "server/createHttp",
                Some(json!({
                    "id": "1",
                    "name": "API",
                    "port": 0,
                    "routes": [{"method": "GET", "path": "/ping", "response": {"ok": true}}],
                })),
            )
            .await
            .unwrap();

        assert_eq!(result["success"], true);
        let port = result["port"].as_u64().unwrap() as u16;
        assert_ne!(port, 0);
        assert_eq!(result["url"], format!("http://localhost:{port}"));
        assert!(registry.is_running(port));

        registry.shutdown_all().await;
    }

    #[tokio::test]
    async fn create_rejects_mismatched_type() {
        let (_dir, registry) = registry();
        let s = ServerService::new(registry);

        let err = s
            .handle("server/createHttp", Some(json!({"port": 0, "type": "websocket"})))
            .await
            .unwrap_err();
        assert!(err.is(ControlErrorCode::InvalidParams));
    }

    #[tokio::test]
    async fn create_requires_params() {
        let (_dir, registry) = registry();
        let s = ServerService::new(registry);

        let err = s.handle("server/createWebSocket", None).await.unwrap_err();
        assert!(err.is(ControlErrorCode::InvalidParams));

        let err = s
            .handle("server/createWebSocket", Some(json!([1, 2])))
            .await
            .unwrap_err();
        assert!(err.is(ControlErrorCode::InvalidParams));
    }

    #[tokio::test]
    async fn stop_unknown_port() {
        let (_dir, registry) = registry();
        let s = ServerService::new(registry);

        let err = s.handle("server/stop", Some(json!({"port": 1}))).await.unwrap_err();
        assert!(err.is(ControlErrorCode::NoServerOnPort));
        assert_eq!(err.data, Some(json!({"port": 1})));
    }

    #[tokio::test]
    async fn status_of_idle_port() {
        let (_dir, registry) = registry();
        let s = ServerService::new(registry);

        let result = s.handle("server/status", Some(json!({"port": 1}))).await.unwrap();
        assert_eq!(result, json!({"running": false}));
    }

    #[tokio::test]
    async fn full_lifecycle() {
        let (_dir, registry) = registry();
        let s = ServerService::new(registry);

        let created = s
            .handle("server/createWebSocket", Some(json!({"name": "Chat", "port": 0})))
            .await
            .unwrap();
        let port = created["port"].clone();
        assert!(created["url"].as_str().unwrap().starts_with("ws://localhost:"));

        let status = s.handle("server/status", Some(json!({"port": port}))).await.unwrap();
        assert_eq!(status["running"], true);
        assert_eq!(status["type"], "websocket");
        assert_eq!(status["config"]["name"], "Chat");
        assert_eq!(status["config"]["port"], port);
        assert_eq!(status["connections"], 0);
        assert!(status["startTime"].is_string());

        let list = s.handle("server/list", None).await.unwrap();
        let list = list.as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["port"], port);
        assert_eq!(list[0]["running"], true);

        let logs = s.handle("server/logs", Some(json!({"port": port}))).await.unwrap();
        let logs = logs.as_array().unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0]["type"], "server");

        let cleared = s.handle("server/clearLogs", Some(json!({"port": port}))).await.unwrap();
        assert_eq!(cleared, json!({"success": true, "cleared": 1}));

        let stopped = s.handle("server/stop", Some(json!({"port": port}))).await.unwrap();
        assert_eq!(stopped, json!({"success": true, "port": port}));

        let list = s.handle("server/list", None).await.unwrap();
        assert_eq!(list, json!([]));
        let logs = s.handle("server/logs", Some(json!({"port": port}))).await.unwrap();
        assert_eq!(logs, json!([]));
    }

    #[tokio::test]
    async fn clear_logs_on_idle_port() {
        let (_dir, registry) = registry();
        let s = ServerService::new(registry);

        let result = s.handle("server/clearLogs", Some(json!({"port": 1}))).await.unwrap();
        assert_eq!(result, json!({"success": false, "cleared": 0}));
    }

    #[tokio::test]
    async fn unknown_method() {
        let (_dir, registry) = registry();
        let s = ServerService::new(registry);

        let err = s.handle("server/restart", None).await.unwrap_err();
        assert!(err.is(ControlErrorCode::MethodNotFound));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// config/*
// ─────────────────────────────────────────────────────────────────────────────

mod config {
    use super::*;

    fn http_config(port: u16) -> Value {
        json!({
            "id": format!("cfg-{port}"),
            "name": format!("Saved {port}"),
            "port": port,
            "type": "http",
            "routes": [{"method": "GET", "path": "/", "statusCode": 204}],
        })
    }

    #[tokio::test]
    async fn save_then_load() {
        let (dir, registry) = registry();
        let s = ConfigService::new(registry);

        let result = s.handle("config/save", Some(http_config(3000))).await.unwrap();
        assert_eq!(result, json!({"success": true}));
        s.handle("config/save", Some(http_config(3001))).await.unwrap();

        let loaded = s.handle("config/load", None).await.unwrap();
        assert_eq!(loaded["3000"]["name"], "Saved 3000");
        assert_eq!(loaded["3000"]["routes"][0]["statusCode"], 204);
        assert!(loaded["3000"]["savedAt"].is_string());
        assert_eq!(loaded["3001"]["port"], 3001);

        let listed = s.handle("config/list", None).await.unwrap();
        assert_eq!(listed, loaded);

        assert!(dir.path().join("server-configs.json").exists());
    }

    #[tokio::test]
    async fn save_overwrites_same_port() {
        let (_dir, registry) = registry();
        let s = ConfigService::new(registry);

        s.handle("config/save", Some(http_config(3000))).await.unwrap();
        let mut updated = http_config(3000);
        updated["name"] = json!("Renamed");
        s.handle("config/save", Some(updated)).await.unwrap();

        let loaded = s.handle("config/load", None).await.unwrap();
        assert_eq!(loaded.as_object().unwrap().len(), 1);
        assert_eq!(loaded["3000"]["name"], "Renamed");
    }

    #[tokio::test]
    async fn save_requires_type() {
        let (_dir, registry) = registry();
        let s = ConfigService::new(registry);

        let err = s
            .handle("config/save", Some(json!({"port": 3000})))
            .await
            .unwrap_err();
        assert!(err.is(ControlErrorCode::InvalidParams));
    }

    #[tokio::test]
    async fn save_keeps_fields_it_does_not_know() {
        let (_dir, registry) = registry();
        let s = ConfigService::new(registry);

        let mut config = http_config(3000);
        config["color"] = json!("blue");
        config["tags"] = json!(["team-a"]);
        s.handle("config/save", Some(config)).await.unwrap();

        let loaded = s.handle("config/load", None).await.unwrap();
        assert_eq!(loaded["3000"]["color"], "blue");
        assert_eq!(loaded["3000"]["tags"], json!(["team-a"]));
        assert_eq!(loaded["3000"]["routes"][0]["statusCode"], 204);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_dir, registry) = registry();
        let s = ConfigService::new(registry);

        s.handle("config/save", Some(http_config(3000))).await.unwrap();

        let result = s.handle("config/delete", Some(json!({"port": 3000}))).await.unwrap();
        assert_eq!(result, json!({"success": true}));
        let result = s.handle("config/delete", Some(json!({"port": 3000}))).await.unwrap();
        assert_eq!(result, json!({"success": true}));

        let loaded = s.handle("config/load", None).await.unwrap();
        assert_eq!(loaded, json!({}));
    }

    #[tokio::test]
    async fn load_with_no_store_file() {
        let (_dir, registry) = registry();
        let s = ConfigService::new(registry);

        s.init().await.unwrap();
        let loaded = s.handle("config/load", None).await.unwrap();
        assert_eq!(loaded, json!({}));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Control router
// ─────────────────────────────────────────────────────────────────────────────

mod control {
    use super::*;
    use mockd_control::ControlServer;
    use mockd_protocol::{ControlError, HandlerResult};
    use mockd_transport::RequestHandler;

    struct EchoService;

    impl Service for EchoService {
        fn namespace(&self) -> &str {
            "echo"
        }

        async fn handle(&self, method: &str, params: Option<Value>) -> HandlerResult {
            match method {
                "echo/say" => Ok(params.unwrap_or(Value::Null)),
                _ => Err(ControlError::method_not_found(method)),
            }
        }
    }

    fn server() -> ControlServer {
        let mut server = ControlServer::new();
        server.register_service(EchoService);
        server
    }

    #[tokio::test]
    async fn rejects_requests_before_initialize() {
        let server = server();
        let err = server.handle_request("echo/say", None).await.unwrap_err();
        assert!(err.is(ControlErrorCode::NotInitialized));
    }

    #[tokio::test]
    async fn routes_by_namespace() {
        let server = server();
        server.initialize().await.unwrap();

        let result = server
            .handle_request("echo/say", Some(json!({"hello": "world"})))
            .await
            .unwrap();
        assert_eq!(result["hello"], "world");

        let err = server.handle_request("bogus/thing", None).await.unwrap_err();
        assert!(err.is(ControlErrorCode::MethodNotFound));
    }

    #[tokio::test]
    async fn namespace_must_match_exactly() {
        let server = server();
        server.initialize().await.unwrap();

        let err = server.handle_request("echo", None).await.unwrap_err();
        assert!(err.is(ControlErrorCode::MethodNotFound));
        let err = server.handle_request("echoes/say", None).await.unwrap_err();
        assert!(err.is(ControlErrorCode::MethodNotFound));
    }

    #[tokio::test]
    async fn rejects_requests_after_shutdown() {
        let server = server();
        server.initialize().await.unwrap();
        server.shutdown().await;
        server.shutdown().await;

        let err = server.handle_request("echo/say", None).await.unwrap_err();
        assert!(err.is(ControlErrorCode::ShuttingDown));
    }

    #[tokio::test]
    async fn shutdown_stops_mock_servers_but_keeps_saved_configs() {
        let (_dir, registry) = registry();
        let mut server = ControlServer::new();
        server.register_service(ServerService::new(registry.clone()));
        server.register_service(ConfigService::new(registry.clone()));
        server.initialize().await.unwrap();

        let created = server
            .handle_request("server/createHttp", Some(json!({"port": 0})))
            .await
            .unwrap();
        let port = created["port"].clone();
        let mut saved = json!({"port": port, "type": "http"});
        saved["name"] = json!("keep me");
        server.handle_request("config/save", Some(saved)).await.unwrap();

        server.shutdown().await;

        let port = port.as_u64().unwrap() as u16;
        assert!(!registry.is_running(port));
        assert!(registry.load_configurations().await.contains_key(&port));
    }
}
