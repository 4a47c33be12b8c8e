//! Route table for HTTP mock servers.
//!
//! Routes are matched in declaration order and the first match wins. Path
//! patterns follow the conventions UI users already know from Express:
//! `:name` matches one segment, a `*` segment matches the rest of the path,
//! literal segments compare case-insensitively, and trailing slashes are
//! ignored.

use axum::http::{Method, StatusCode};
use mockd_protocol::{RouteConfig, RouteMethod};
use serde_json::Value;
use tracing::warn;

/// A validated, matchable route.
#[derive(Debug, Clone)]
pub struct Route {
    pub method: RouteMethod,
    pub path: String,
    pub status: StatusCode,
    pub response: Option<Value>,
    pattern: PathPattern,
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PathPattern {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param,
    Wildcard,
}

impl RouteTable {
    /// Build the table from user routes, skipping (with a warning) any route
    /// whose method or status code is unusable.
    pub fn build(routes: &[RouteConfig], server_name: &str) -> Self {
        let mut table = Vec::with_capacity(routes.len());

        for route in routes {
            let method = match route.method.parse::<RouteMethod>() {
                Ok(method) => method,
                Err(e) => {
                    warn!("[{server_name}] Skipping route {} {}: {e}", route.method, route.path);
                    continue;
                }
            };
            let Ok(status) = StatusCode::from_u16(route.status_code) else {
                warn!(
                    "[{server_name}] Skipping route {method} {}: invalid status code {}",
                    route.path, route.status_code
                );
                continue;
            };

            table.push(Route {
                method,
                path: route.path.clone(),
                status,
                response: route.response.clone(),
                pattern: PathPattern::parse(&route.path),
            });
        }

        Self { routes: table }
    }

    /// First route matching the request. HEAD requests fall through to GET routes.
    pub fn find(&self, method: &Method, path: &str) -> Option<&Route> {
        let wanted = if method == Method::HEAD { &Method::GET } else { method };
        self.routes
            .iter()
            .find(|route| to_http_method(route.method) == wanted && route.pattern.matches(path))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }
}

impl PathPattern {
    fn parse(path: &str) -> Self {
        let segments = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s == "*" {
                    Segment::Wildcard
                } else if s.starts_with(':') && s.len() > 1 {
                    Segment::Param
                } else {
                    Segment::Literal(s.to_ascii_lowercase())
                }
            })
            .collect();
        Self { segments }
    }

    fn matches(&self, path: &str) -> bool {
        let mut parts = path.split('/').filter(|s| !s.is_empty());
        for segment in &self.segments {
            match segment {
                Segment::Wildcard => return true,
                Segment::Param => {
                    if parts.next().is_none() {
                        return false;
                    }
                }
                Segment::Literal(literal) => match parts.next() {
                    Some(part) if part.eq_ignore_ascii_case(literal) => {}
                    _ => return false,
                },
            }
        }
        parts.next().is_none()
    }
}

fn to_http_method(method: RouteMethod) -> &'static Method {
    match method {
        RouteMethod::Get => &Method::GET,
        RouteMethod::Post => &Method::POST,
        RouteMethod::Put => &Method::PUT,
        RouteMethod::Delete => &Method::DELETE,
        RouteMethod::Patch => &Method::PATCH,
    }
}
