//! Structured request/response logging
//!
//! Logs every request with its correlation id and latency. Sensitive
//! headers are masked before they reach the logs.

use crate::chain::{GatewayFilter, GatewayResponse, Next};
use crate::context::RequestContext;
use gateway_core::GatewayError;
use tracing::{error, info};

pub struct LoggingFilter;

impl LoggingFilter {
    /// Render inbound headers with credentials masked.
    fn sanitized_headers(ctx: &RequestContext) -> String {
        let mut rendered = Vec::new();
        for (name, value) in ctx.headers.iter() {
            let shown = if name.as_str().eq_ignore_ascii_case("authorization") {
                "Bearer [MASKED]"
            } else if name.as_str().eq_ignore_ascii_case("cookie")
                || name.as_str().eq_ignore_ascii_case("set-cookie")
            {
                "[MASKED]"
            } else {
                value.to_str().unwrap_or("[non-ascii]")
            };
            rendered.push(format!("{}={}", name, shown));
        }
        rendered.join(", ")
    }
}

#[async_trait::async_trait]
impl GatewayFilter for LoggingFilter {
    fn name(&self) -> &'static str {
        "LoggingFilter"
    }

    async fn handle(
        &self,
        ctx: &mut RequestContext,
        next: Next<'_>,
    ) -> Result<GatewayResponse, GatewayError> {
        let correlation_id = ctx.correlation_id.clone().unwrap_or_default();

        info!(
            correlation_id = %correlation_id,
            method = %ctx.method,
            path = %ctx.path,
            headers = %Self::sanitized_headers(ctx),
            "request received"
        );

        let result = next.run(ctx).await;

        match &result {
            Ok(response) => {
                info!(
                    correlation_id = %correlation_id,
                    method = %ctx.method,
                    path = %ctx.path,
                    status = response.status().as_u16(),
                    duration_ms = ctx.elapsed_ms() as u64,
                    "request completed"
                );
            }
            Err(err) => {
                error!(
                    correlation_id = %correlation_id,
                    method = %ctx.method,
                    path = %ctx.path,
                    status = err.status(),
                    duration_ms = ctx.elapsed_ms() as u64,
                    error = %err,
                    "request failed"
                );
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::body::Bytes;
    use hyper::header::{HeaderMap, HeaderValue};
    use hyper::Method;

    #[test]
    fn test_authorization_masked() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_static("Bearer very-secret-token"),
        );
        headers.insert("cookie", HeaderValue::from_static("session=abc"));
        headers.insert("accept", HeaderValue::from_static("application/json"));

        let ctx = RequestContext::new(Method::GET, "/x", headers, Bytes::new());
        let rendered = LoggingFilter::sanitized_headers(&ctx);

        assert!(!rendered.contains("very-secret-token"));
        assert!(!rendered.contains("session=abc"));
        assert!(rendered.contains("authorization=Bearer [MASKED]"));
        assert!(rendered.contains("cookie=[MASKED]"));
        assert!(rendered.contains("accept=application/json"));
    }
}
