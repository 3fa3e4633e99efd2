//! Correlation id filter
//!
//! Outermost filter: reuses an upstream-supplied `X-Correlation-ID` (or
//! `X-Request-ID`), otherwise generates a fresh UUID. The id flows into the
//! downstream overlay and is stamped onto the response at the chain
//! boundary.

use crate::chain::{GatewayFilter, GatewayResponse, Next};
use crate::context::RequestContext;
use gateway_core::{GatewayError, CORRELATION_ID_HEADER, REQUEST_ID_HEADER};
use tracing::debug;
use uuid::Uuid;

pub struct CorrelationFilter;

impl CorrelationFilter {
    fn correlation_id_for(ctx: &RequestContext) -> String {
        ctx.header(CORRELATION_ID_HEADER)
            .or_else(|| ctx.header(REQUEST_ID_HEADER))
            .map(|id| id.to_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    }
}

#[async_trait::async_trait]
impl GatewayFilter for CorrelationFilter {
    fn name(&self) -> &'static str {
        "CorrelationFilter"
    }

    async fn handle(
        &self,
        ctx: &mut RequestContext,
        next: Next<'_>,
    ) -> Result<GatewayResponse, GatewayError> {
        let correlation_id = Self::correlation_id_for(ctx);
        debug!(correlation_id = %correlation_id, "correlation id assigned");

        ctx.set_overlay_header(CORRELATION_ID_HEADER, &correlation_id);
        ctx.correlation_id = Some(correlation_id);

        next.run(ctx).await
    }
}
