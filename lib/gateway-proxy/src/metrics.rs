//! Prometheus metrics for the gateway pipeline

use crate::chain::{GatewayFilter, GatewayResponse, Next};
use crate::context::RequestContext;
use gateway_core::GatewayError;
use prometheus::{CounterVec, Encoder, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use anyhow::Result;

/// Metrics collector for requests flowing through the gateway.
pub struct MetricsCollector {
    /// Total requests received
    pub requests_total: CounterVec,
    /// Request latency in seconds
    pub request_duration_seconds: HistogramVec,
    /// Responses by status code
    pub responses_total: CounterVec,
    /// Errors by error kind
    pub errors_total: CounterVec,
    /// Fallback responses served, by route
    pub fallback_total: CounterVec,
    /// Registry backing the collector
    pub registry: Arc<Registry>,
}

impl MetricsCollector {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let requests_total = CounterVec::new(
            Opts::new("gateway_requests_total", "Total requests received"),
            &["method", "path"],
        )?;

        let request_duration_seconds = HistogramVec::new(
            Opts::new(
                "gateway_request_duration_seconds",
                "Request latency in seconds",
            )
            .into(),
            &["method", "path"],
        )?;

        let responses_total = CounterVec::new(
            Opts::new("gateway_responses_total", "Responses by status code"),
            &["status"],
        )?;

        let errors_total = CounterVec::new(
            Opts::new("gateway_errors_total", "Errors by kind"),
            &["kind"],
        )?;

        let fallback_total = CounterVec::new(
            Opts::new("gateway_fallback_total", "Fallback responses by route"),
            &["route"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_duration_seconds.clone()))?;
        registry.register(Box::new(responses_total.clone()))?;
        registry.register(Box::new(errors_total.clone()))?;
        registry.register(Box::new(fallback_total.clone()))?;

        Ok(Self {
            requests_total,
            request_duration_seconds,
            responses_total,
            errors_total,
            fallback_total,
            registry,
        })
    }

    /// All metrics in Prometheus text format.
    pub fn gather(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Record a fallback response for a route.
    pub fn record_fallback(&self, route: &str) {
        self.fallback_total.with_label_values(&[route]).inc();
    }

    fn error_kind(err: &GatewayError) -> &'static str {
        match err {
            GatewayError::Auth(_) => "auth",
            GatewayError::Validation(_) => "validation",
            GatewayError::DownstreamTimeout(_) => "downstream_timeout",
            GatewayError::DownstreamUnavailable(_) => "downstream_unavailable",
            GatewayError::RouteNotFound(_) => "route_not_found",
            GatewayError::Internal(_) => "internal",
        }
    }
}

impl Clone for MetricsCollector {
    fn clone(&self) -> Self {
        // Clones share the same registry and underlying metrics.
        Self {
            requests_total: self.requests_total.clone(),
            request_duration_seconds: self.request_duration_seconds.clone(),
            responses_total: self.responses_total.clone(),
            errors_total: self.errors_total.clone(),
            fallback_total: self.fallback_total.clone(),
            registry: self.registry.clone(),
        }
    }
}

/// Filter recording request counts, latency, status, and error kinds.
pub struct MetricsFilter {
    pub collector: MetricsCollector,
}

impl MetricsFilter {
    pub fn new(collector: MetricsCollector) -> Self {
        Self { collector }
    }
}

#[async_trait::async_trait]
impl GatewayFilter for MetricsFilter {
    fn name(&self) -> &'static str {
        "MetricsFilter"
    }

    async fn handle(
        &self,
        ctx: &mut RequestContext,
        next: Next<'_>,
    ) -> Result<GatewayResponse, GatewayError> {
        let method = ctx.method.to_string();
        let path = ctx.path.clone();

        self.collector
            .requests_total
            .with_label_values(&[&method, &path])
            .inc();

        let timer = self
            .collector
            .request_duration_seconds
            .with_label_values(&[&method, &path])
            .start_timer();

        let result = next.run(ctx).await;
        timer.observe_duration();

        match &result {
            Ok(response) => {
                self.collector
                    .responses_total
                    .with_label_values(&[response.status().as_str()])
                    .inc();
            }
            Err(err) => {
                self.collector
                    .errors_total
                    .with_label_values(&[MetricsCollector::error_kind(err)])
                    .inc();
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{json_response, FilterChain, ProxyHandler};
    use gateway_core::{AuthError, RouteRegistry};
    use hyper::body::Bytes;
    use hyper::header::HeaderMap;
    use hyper::{Method, StatusCode};

    struct OkTerminal;

    #[async_trait::async_trait]
    impl ProxyHandler for OkTerminal {
        async fn proxy(&self, _ctx: &mut RequestContext) -> Result<GatewayResponse, GatewayError> {
            Ok(json_response(StatusCode::OK, "{}".to_string()))
        }
    }

    #[test]
    fn test_collector_gathers_registered_metrics() {
        let collector = MetricsCollector::new().unwrap();
        collector
            .requests_total
            .with_label_values(&["GET", "/x"])
            .inc();
        let text = collector.gather().unwrap();
        assert!(text.contains("# HELP"));
        assert!(text.contains("gateway_requests_total"));
    }

    #[test]
    fn test_clone_shares_registry() {
        let a = MetricsCollector::new().unwrap();
        let b = a.clone();
        b.requests_total.with_label_values(&["GET", "/x"]).inc();
        assert!(a.gather().unwrap().contains("gateway_requests_total"));
    }

    #[tokio::test]
    async fn test_filter_records_request_and_response() {
        let collector = MetricsCollector::new().unwrap();
        let chain = FilterChain::new(Arc::new(RouteRegistry::new()), Arc::new(OkTerminal))
            .add(MetricsFilter::new(collector.clone()));

        let ctx = RequestContext::new(Method::GET, "/api/x", HeaderMap::new(), Bytes::new());
        chain.process(ctx).await;

        let text = collector.gather().unwrap();
        assert!(text.contains("gateway_requests_total"));
        assert!(text.contains("gateway_responses_total"));
        assert!(text.contains("status=\"200\""));
    }

    #[tokio::test]
    async fn test_filter_records_error_kind() {
        struct FailingTerminal;

        #[async_trait::async_trait]
        impl ProxyHandler for FailingTerminal {
            async fn proxy(
                &self,
                _ctx: &mut RequestContext,
            ) -> Result<GatewayResponse, GatewayError> {
                Err(GatewayError::Auth(AuthError::ExpiredToken))
            }
        }

        let collector = MetricsCollector::new().unwrap();
        let chain = FilterChain::new(Arc::new(RouteRegistry::new()), Arc::new(FailingTerminal))
            .add(MetricsFilter::new(collector.clone()));

        let ctx = RequestContext::new(Method::GET, "/api/x", HeaderMap::new(), Bytes::new());
        let response = chain.process(ctx).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let text = collector.gather().unwrap();
        assert!(text.contains("kind=\"auth\""));
    }
}
