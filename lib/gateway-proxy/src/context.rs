//! Per-request context passed through the filter chain

use gateway_core::RouteDefinition;
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::Method;
use std::sync::Arc;
use std::time::Instant;

/// Context for a single in-flight request.
///
/// The inbound snapshot (method, path, query, headers, body) is fixed at
/// ingress; filters communicate through the overlay headers and the
/// principal/correlation fields. Owned exclusively by the one request task.
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,

    /// Headers added by filters for the downstream call.
    pub overlay: HeaderMap,
    /// Authenticated principal, set by the authentication filter.
    pub principal: Option<String>,
    /// Correlation id, set by the correlation filter.
    pub correlation_id: Option<String>,
    /// Route resolved before the chain runs; `None` falls through to 404.
    pub route: Option<Arc<RouteDefinition>>,
    /// Ingress instant, for latency accounting.
    pub started_at: Instant,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers,
            body,
            overlay: HeaderMap::new(),
            principal: None,
            correlation_id: None,
            route: None,
            started_at: Instant::now(),
        }
    }

    /// Build a context from request parts, splitting path and query.
    pub fn from_parts(parts: &hyper::http::request::Parts, body: Bytes) -> Self {
        let mut ctx = Self::new(
            parts.method.clone(),
            parts.uri.path().to_string(),
            parts.headers.clone(),
            body,
        );
        ctx.query = parts.uri.query().map(|q| q.to_string());
        ctx
    }

    /// First value of an inbound header, if it is valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Add a header to the downstream overlay. Invalid names/values are
    /// dropped; inbound data is already validated by hyper.
    pub fn set_overlay_header(&mut self, name: &str, value: &str) {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name),
            HeaderValue::try_from(value),
        ) {
            self.overlay.insert(name, value);
        }
    }

    /// Route id when a route was resolved for this request.
    pub fn route_id(&self) -> Option<&str> {
        self.route.as_deref().map(|r| r.id.as_str())
    }

    /// Milliseconds elapsed since ingress.
    pub fn elapsed_ms(&self) -> u128 {
        self.started_at.elapsed().as_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> RequestContext {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        RequestContext::new(Method::POST, "/api/auth/login", headers, Bytes::new())
    }

    #[test]
    fn test_header_lookup() {
        let ctx = context();
        assert_eq!(ctx.header("content-type"), Some("application/json"));
        assert_eq!(ctx.header("Content-Type"), Some("application/json"));
        assert_eq!(ctx.header("x-missing"), None);
    }

    #[test]
    fn test_overlay_headers() {
        let mut ctx = context();
        ctx.set_overlay_header("X-Auth-User", "alice");
        assert_eq!(
            ctx.overlay.get("X-Auth-User").unwrap().to_str().unwrap(),
            "alice"
        );
        // The inbound snapshot is untouched.
        assert!(ctx.headers.get("X-Auth-User").is_none());
    }

    #[test]
    fn test_invalid_overlay_header_dropped() {
        let mut ctx = context();
        ctx.set_overlay_header("bad header name", "value");
        assert!(ctx.overlay.is_empty());
    }
}
