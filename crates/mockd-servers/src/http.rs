//! HTTP server factory.
//!
//! Request pipeline, outermost first: permissive CORS, JSON body parsing,
//! request logging, then dispatch to the user's routes with a built-in
//! `/health` route behind them.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{Method, StatusCode, Uri, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use mockd_protocol::{LogKind, RouteConfig};
use serde_json::{Value, json};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::handle::{BoundServer, bind_localhost};
use crate::registry::LogSink;
use crate::routes::RouteTable;

/// Largest request body accepted, in bytes.
pub const BODY_LIMIT: usize = 1024 * 1024;

struct HttpState {
    name: String,
    port: u16,
    routes: RouteTable,
    log: LogSink,
}

/// Request body as parsed by [`parse_json_body`]; `None` when the request
/// carried no JSON.
#[derive(Debug, Clone)]
struct ParsedBody(Option<Value>);

/// Bind `127.0.0.1:<port>` and build the pipeline for `routes`.
///
/// Routes with an unsupported method or status code are skipped with a
/// warning; the server still starts with the rest.
pub async fn bind(
    name: &str,
    port: u16,
    routes: &[RouteConfig],
    log: LogSink,
) -> std::io::Result<BoundServer> {
    let listener = bind_localhost(port).await?;
    let port = listener.local_addr()?.port();

    let table = RouteTable::build(routes, name);
    for route in table.iter() {
        info!("[{name}] Registered route {} {} -> {}", route.method, route.path, route.status);
    }

    let state = Arc::new(HttpState {
        name: name.to_string(),
        port,
        routes: table,
        log,
    });

    BoundServer::new(listener, None, |_| router(state))
}

fn router(state: Arc<HttpState>) -> Router {
    Router::new()
        .fallback(dispatch)
        .layer(
            ServiceBuilder::new()
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(parse_json_body))
                .layer(middleware::from_fn_with_state(state.clone(), log_request)),
        )
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Middleware
// ─────────────────────────────────────────────────────────────────────────────

async fn parse_json_body(request: Request, next: Next) -> Response {
    let declared_len = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared_len.is_some_and(|len| len > BODY_LIMIT) {
        return error_response(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large");
    }

    let is_json = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("json"));

    let (parts, body) = request.into_parts();
    // Chunked bodies carry no length up front, so the limit is enforced
    // again while reading.
    let bytes = match Limited::new(body, BODY_LIMIT).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.is::<LengthLimitError>() => {
            return error_response(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large");
        }
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "Failed to read request body"),
    };

    let parsed = if is_json && !bytes.is_empty() {
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(value) => Some(value),
            Err(_) => return error_response(StatusCode::BAD_REQUEST, "Invalid JSON body"),
        }
    } else {
        None
    };

    let mut request = Request::from_parts(parts, Body::from(bytes));
    request.extensions_mut().insert(ParsedBody(parsed));
    next.run(request).await
}

async fn log_request(State(state): State<Arc<HttpState>>, request: Request, next: Next) -> Response {
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    let body = request
        .extensions()
        .get::<ParsedBody>()
        .and_then(|parsed| parsed.0.clone());

    state.log.append(
        state.port,
        LogKind::Request {
            method: request.method().to_string(),
            path: request.uri().path().to_string(),
            query: request.uri().query().map(str::to_string),
            ip,
            body,
        },
    );

    next.run(request).await
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn dispatch(State(state): State<Arc<HttpState>>, method: Method, uri: Uri) -> Response {
    let path = uri.path();

    if let Some(route) = state.routes.find(&method, path) {
        state.log.append(
            state.port,
            LogKind::Response {
                method: method.to_string(),
                path: path.to_string(),
                status_code: route.status.as_u16(),
            },
        );
        return match &route.response {
            Some(body) => (route.status, Json(body.clone())).into_response(),
            None => route.status.into_response(),
        };
    }

    let is_health = path.trim_end_matches('/').eq_ignore_ascii_case("/health");
    if is_health && (method == Method::GET || method == Method::HEAD) {
        return Json(json!({
            "status": "ok",
            "server": state.name,
            "port": state.port,
            "timestamp": Utc::now(),
        }))
        .into_response();
    }

    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Not Found",
            "method": method.as_str(),
            "path": path,
        })),
    )
        .into_response()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
