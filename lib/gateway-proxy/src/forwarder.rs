//! Downstream request forwarding with connection pooling
//!
//! The terminal handler of the filter chain. Builds the downstream request
//! from the route's target, the rewritten path, and the inbound headers
//! minus hop-by-hop fields, then layers on the filter overlay and the
//! gateway marker before dispatching over a pooled hyper client.

use crate::chain::{GatewayResponse, ProxyHandler};
use crate::context::RequestContext;
use anyhow::Context as _;
use gateway_core::config::DownstreamSettings;
use gateway_core::route::{rewrite_path, RouteFilterConfig};
use gateway_core::{GatewayError, RouteDefinition, GATEWAY_MARKER_HEADER, GATEWAY_MARKER_VALUE};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, HOST};
use hyper::{Request, Response, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::tokio::TokioExecutor;
use std::time::Duration;
use tokio::time::timeout as tokio_timeout;
use tracing::{debug, warn};

pub struct RequestForwarder {
    client: Client<HttpConnector, Full<Bytes>>,
    request_timeout: Duration,
}

impl RequestForwarder {
    /// Create a forwarder with connection pooling and the configured
    /// connect/request timeouts.
    pub fn new(settings: &DownstreamSettings) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(settings.connect_timeout()));
        connector.set_keepalive(Some(Duration::from_secs(30)));

        let client = Client::builder(TokioExecutor::new()).build::<_, Full<Bytes>>(connector);

        Self {
            client,
            request_timeout: settings.request_timeout(),
        }
    }

    /// Target URI: route base plus the rewritten path and original query.
    fn target_uri(route: &RouteDefinition, path: &str, query: Option<&str>) -> Result<Uri, GatewayError> {
        let rewritten = rewrite_path(route, path);
        let base = route.uri.trim_end_matches('/');
        let target = match query {
            Some(q) => format!("{}{}?{}", base, rewritten, q),
            None => format!("{}{}", base, rewritten),
        };
        let uri = target
            .parse::<Uri>()
            .with_context(|| format!("invalid downstream target: {}", target))?;
        Ok(uri)
    }

    /// Headers for the downstream request: the inbound set minus hop-by-hop
    /// fields and the host, then the filter overlay, the route's header
    /// filters, and finally the gateway marker.
    fn downstream_headers(ctx: &RequestContext, route: &RouteDefinition) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in ctx.headers.iter() {
            if name == HOST || is_hop_by_hop(name.as_str()) {
                continue;
            }
            headers.insert(name.clone(), value.clone());
        }
        for (name, value) in ctx.overlay.iter() {
            headers.insert(name.clone(), value.clone());
        }
        for filter in &route.filters {
            if let RouteFilterConfig::AddRequestHeader { name, value } = filter {
                if let (Ok(name), Ok(value)) = (
                    HeaderName::try_from(name.as_str()),
                    HeaderValue::try_from(value.as_str()),
                ) {
                    headers.insert(name, value);
                }
            }
        }
        headers.insert(
            GATEWAY_MARKER_HEADER,
            HeaderValue::from_static(GATEWAY_MARKER_VALUE),
        );
        headers
    }
}

#[async_trait::async_trait]
impl ProxyHandler for RequestForwarder {
    async fn proxy(&self, ctx: &mut RequestContext) -> Result<GatewayResponse, GatewayError> {
        let route = ctx
            .route
            .clone()
            .ok_or_else(|| GatewayError::RouteNotFound(ctx.path.clone()))?;

        let uri = Self::target_uri(&route, &ctx.path, ctx.query.as_deref())?;
        debug!(route = %route.id, target = %uri, "forwarding request");

        let mut request = Request::builder()
            .method(ctx.method.clone())
            .uri(uri)
            .body(Full::new(ctx.body.clone()))
            .context("building downstream request")?;
        *request.headers_mut() = Self::downstream_headers(ctx, &route);

        match tokio_timeout(self.request_timeout, self.client.request(request)).await {
            Ok(Ok(response)) => {
                debug!(route = %route.id, status = %response.status(), "downstream responded");
                let (parts, body) = response.into_parts();
                let bytes = body
                    .collect()
                    .await
                    .context("reading downstream response body")?
                    .to_bytes();
                Ok(Response::from_parts(parts, bytes))
            }
            Ok(Err(err)) => {
                warn!(route = %route.id, error = %err, "downstream request failed");
                Err(GatewayError::DownstreamUnavailable(route.id.clone()))
            }
            Err(_elapsed) => {
                warn!(
                    route = %route.id,
                    timeout_secs = self.request_timeout.as_secs(),
                    "downstream request timed out"
                );
                Err(GatewayError::DownstreamTimeout(route.id.clone()))
            }
        }
    }
}

/// Hop-by-hop headers are connection-scoped and never forwarded.
fn is_hop_by_hop(name: &str) -> bool {
    matches!(
        name,
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
    )
}
