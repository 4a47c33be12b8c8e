//! Protocol layer tests: JSON-RPC envelopes, errors, server configs, log entries.

#[cfg(test)]
mod tests {
    use serde_json::json;
    use mockd_protocol::*;

    // ─────────────────────────────────────────────────────────────────────
    // JSON-RPC
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn request_id_accepts_numbers_and_strings() {
        let id: RequestId = serde_json::from_value(json!(99)).unwrap();
        assert_eq!(id, RequestId::Number(99));
        let id: RequestId = serde_json::from_value(json!("req-1")).unwrap();
        assert_eq!(id, RequestId::String("req-1".into()));
    }

    #[test]
    fn request_parses_with_and_without_id() {
        let req: ControlRequest = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "server/list",
        }))
        .unwrap();
        assert_eq!(req.id, Some(RequestId::Number(1)));
        assert_eq!(req.method, "server/list");
        assert!(req.params.is_none());

        let req: ControlRequest =
            serde_json::from_value(json!({"jsonrpc": "2.0", "method": "server/list"})).unwrap();
        assert!(req.id.is_none());
    }

    #[test]
    fn request_rejects_other_versions() {
        let err = serde_json::from_value::<ControlRequest>(json!({
            "jsonrpc": "1.0",
            "id": 1,
            "method": "server/list",
        }));
        assert!(err.is_err());
        assert!(serde_json::from_value::<ControlRequest>(json!({"id": 1, "method": "x"})).is_err());
    }

    #[test]
    fn response_carries_result_or_error() {
        let ok = ControlResponse::new(Some(RequestId::String("a".into())), Ok(json!({"success": true})));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"jsonrpc": "2.0", "id": "a", "result": {"success": true}})
        );

        let failed = ControlResponse::new(None, Err(ControlError::method_not_found("x/y")));
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["id"], serde_json::Value::Null);
        assert_eq!(json["error"]["code"], -32601);
        assert!(json.get("result").is_none());
        assert!(json["error"].get("data").is_none());

        let back: ControlResponse = serde_json::from_value(json).unwrap();
        assert_eq!(back, failed);
    }

    #[test]
    fn notification_has_no_id() {
        let n = Notification::new(Notifications::SERVER_DID_STOP, json!({"port": 3000}));
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["method"], "server/didStop");
        assert!(json.get("id").is_none());
    }

    // ─────────────────────────────────────────────────────────────────────
    // Errors
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn lifecycle_error_codes() {
        assert_eq!(ControlErrorCode::PortInUse.code(), -32020);
        assert_eq!(ControlErrorCode::NoServerOnPort.code(), -32021);
        assert_eq!(ControlErrorCode::BindFailure.code(), -32022);
        assert_eq!(ControlErrorCode::PersistenceFailure.code(), -32023);
        assert_eq!(ControlErrorCode::InvalidParams.code(), -32602);
    }

    #[test]
    fn port_errors_carry_the_port() {
        let err = ControlError::for_port(ControlErrorCode::PortInUse, 3000, "busy");
        assert!(err.is(ControlErrorCode::PortInUse));
        assert_eq!(err.data, Some(json!({"port": 3000})));
        assert_eq!(err.to_string(), "busy (-32020)");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Server configs
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn http_config_from_ui_shape() {
        let config: ServerConfig = serde_json::from_value(json!({
            "id": 1718000000000u64,
            "name": "Users API",
            "port": 3000,
            "type": "http",
            "routes": [
                {"method": "GET", "path": "/users", "statusCode": 200, "response": [{"id": 1}]},
                {"method": "post", "path": "/users"}
            ]
        }))
        .unwrap();

        assert_eq!(config.id, "1718000000000");
        assert_eq!(config.server_type(), ServerType::Http);
        let ServerKind::Http { routes } = &config.kind else {
            panic!("expected http config");
        };
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[1].status_code, 200);
        assert!(routes[1].response.is_none());
    }

    #[test]
    fn websocket_config_keeps_flat_shape() {
        let config = ServerConfig {
            id: "ws-1".into(),
            name: "Chat".into(),
            port: 8080,
            kind: ServerKind::WebSocket {
                message_handlers: vec![MessageHandler {
                    message_type: "ping".into(),
                    response: Some(json!({"pong": true})),
                }],
            },
            extra: Default::default(),
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["type"], "websocket");
        assert_eq!(json["port"], 8080);
        assert_eq!(json["messageHandlers"][0]["type"], "ping");
        assert_eq!(json["messageHandlers"][0]["response"]["pong"], true);

        let back: ServerConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn config_defaults_and_unknown_type() {
        let config: ServerConfig = serde_json::from_value(json!({"port": 4000, "type": "websocket"})).unwrap();
        assert_eq!(config.id, "");
        assert_eq!(config.name, "");
        assert_eq!(config.kind, ServerKind::WebSocket { message_handlers: vec![] });

        assert!(serde_json::from_value::<ServerConfig>(json!({"port": 1, "type": "grpc"})).is_err());
        assert!(serde_json::from_value::<ServerConfig>(json!({"port": 1})).is_err());
    }

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let raw = json!({
            "id": "c1",
            "name": "Tagged",
            "port": 3002,
            "type": "http",
            "routes": [],
            "color": "teal",
            "meta": {"createdBy": "ui"},
        });
        let config: ServerConfig = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(config.extra["color"], "teal");
        assert!(!config.extra.contains_key("routes"));
        assert_eq!(serde_json::to_value(&config).unwrap(), raw);

        let record = PersistedConfig {
            config,
            saved_at: "2024-06-01T12:00:00Z".parse().unwrap(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["meta"]["createdBy"], "ui");
        let back: PersistedConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
        assert!(!back.config.extra.contains_key("savedAt"));
    }

    #[test]
    fn persisted_config_adds_saved_at() {
        let record: PersistedConfig = serde_json::from_value(json!({
            "id": "a",
            "name": "Saved",
            "port": 3001,
            "type": "http",
            "routes": [],
            "savedAt": "2024-06-01T12:00:00Z",
        }))
        .unwrap();
        assert_eq!(record.config.port, 3001);
        assert_eq!(record.saved_at.to_rfc3339(), "2024-06-01T12:00:00+00:00");

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "http");
        assert!(json["savedAt"].is_string());
    }

    #[test]
    fn route_method_parse() {
        assert_eq!("get".parse::<RouteMethod>().unwrap(), RouteMethod::Get);
        assert_eq!("PATCH".parse::<RouteMethod>().unwrap(), RouteMethod::Patch);
        let err = "FETCH".parse::<RouteMethod>().unwrap_err();
        assert_eq!(err, UnsupportedMethod("FETCH".into()));
        assert_eq!(RouteMethod::Delete.to_string(), "DELETE");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Log entries
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn log_entry_is_flat_and_camel_case() {
        let entry = LogEntry::new(
            "log-1",
            LogKind::Response {
                method: "GET".into(),
                path: "/users".into(),
                status_code: 200,
            },
        );
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["id"], "log-1");
        assert_eq!(json["type"], "response");
        assert_eq!(json["statusCode"], 200);
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn request_log_skips_absent_fields() {
        let entry = LogEntry::new(
            "log-2",
            LogKind::Request {
                method: "GET".into(),
                path: "/".into(),
                query: None,
                ip: Some("127.0.0.1".into()),
                body: None,
            },
        );
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "request");
        assert_eq!(json["ip"], "127.0.0.1");
        assert!(json.get("query").is_none());
        assert!(json.get("body").is_none());
    }

    #[test]
    fn connection_log_round_trip() {
        let entry = LogEntry::new(
            "log-3",
            LogKind::Connection {
                connection_id: "c1".into(),
                message: "Client connected".into(),
            },
        );
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["connectionId"], "c1");
        assert_eq!(entry.kind.name(), "connection");

        let back: LogEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }
}
