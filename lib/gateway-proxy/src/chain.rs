//! Filter chain engine
//!
//! An ordered list of filters, each receiving the request context and a
//! continuation over the remaining chain. A filter may short-circuit with
//! its own response, mutate the context and delegate, or post-process the
//! delegated result. The chain boundary converts every error into the
//! structured JSON envelope; raw error detail never reaches the client.

use crate::context::RequestContext;
use gateway_core::{ErrorResponse, GatewayError, RouteRegistry, CORRELATION_ID_HEADER};
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use std::sync::Arc;
use tracing::{debug, error};

pub type GatewayResponse = Response<Bytes>;

/// One unit of the pipeline: given the context and the rest of the chain,
/// produce a response.
#[async_trait::async_trait]
pub trait GatewayFilter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(
        &self,
        ctx: &mut RequestContext,
        next: Next<'_>,
    ) -> Result<GatewayResponse, GatewayError>;
}

/// Innermost handler: performs the actual downstream call.
#[async_trait::async_trait]
pub trait ProxyHandler: Send + Sync {
    async fn proxy(&self, ctx: &mut RequestContext) -> Result<GatewayResponse, GatewayError>;
}

/// Continuation over the remaining filters plus the terminal handler.
pub struct Next<'a> {
    rest: &'a [Arc<dyn GatewayFilter>],
    terminal: &'a dyn ProxyHandler,
}

impl<'a> Next<'a> {
    pub async fn run(self, ctx: &mut RequestContext) -> Result<GatewayResponse, GatewayError> {
        match self.rest.split_first() {
            Some((head, rest)) => {
                debug!(filter = head.name(), "entering filter");
                head.handle(
                    ctx,
                    Next {
                        rest,
                        terminal: self.terminal,
                    },
                )
                .await
            }
            None => self.terminal.proxy(ctx).await,
        }
    }
}

/// The assembled pipeline: route resolution, ordered filters, terminal
/// proxy, and boundary error conversion.
pub struct FilterChain {
    filters: Vec<Arc<dyn GatewayFilter>>,
    terminal: Arc<dyn ProxyHandler>,
    registry: Arc<RouteRegistry>,
}

impl FilterChain {
    pub fn new(registry: Arc<RouteRegistry>, terminal: Arc<dyn ProxyHandler>) -> Self {
        Self {
            filters: Vec::new(),
            terminal,
            registry,
        }
    }

    /// Append a filter. Order is significant: the first filter added runs
    /// outermost.
    pub fn add<F: GatewayFilter + 'static>(mut self, filter: F) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Run a request through the chain and produce the final response.
    pub async fn process(&self, mut ctx: RequestContext) -> GatewayResponse {
        ctx.route = self
            .registry
            .resolve(&ctx.path, ctx.method.as_str())
            .await;

        let next = Next {
            rest: &self.filters,
            terminal: self.terminal.as_ref(),
        };

        let mut response = match next.run(&mut ctx).await {
            Ok(response) => response,
            Err(err) => {
                // The full error is logged here, once; the client gets the
                // sanitized envelope.
                error!(
                    method = %ctx.method,
                    path = %ctx.path,
                    status = err.status(),
                    error = %err,
                    "request failed"
                );
                error_response(&err, &ctx.path)
            }
        };

        if let Some(correlation_id) = &ctx.correlation_id {
            if let Ok(value) = HeaderValue::try_from(correlation_id.as_str()) {
                response
                    .headers_mut()
                    .insert(CORRELATION_ID_HEADER, value);
            }
        }

        response
    }
}

/// Build the structured error envelope for a failed request.
pub fn error_response(err: &GatewayError, path: &str) -> GatewayResponse {
    let envelope = ErrorResponse::from_error(err, path);
    json_response(
        StatusCode::from_u16(envelope.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        envelope.to_json(),
    )
}

/// Build a JSON response with the given status.
pub fn json_response(status: StatusCode, body: String) -> GatewayResponse {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Bytes::from(body))
        .unwrap_or_else(|_| {
            let mut fallback = Response::new(Bytes::new());
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
}
