//! JWT authentication filter
//!
//! Validates the bearer token on every request whose path is not excluded,
//! then injects the authenticated principal as `X-Auth-User` for the
//! downstream service. Only the gateway sets that header; the marker header
//! asserting gateway traversal is attached by the forwarder on every
//! request, excluded paths included.

use crate::chain::{GatewayFilter, GatewayResponse, Next};
use crate::context::RequestContext;
use gateway_auth::{JwtValidator, PathExclusions};
use gateway_core::{GatewayError, AUTH_USER_HEADER};
use hyper::header::AUTHORIZATION;
use std::sync::Arc;
use tracing::debug;

pub struct AuthenticationFilter {
    validator: Arc<JwtValidator>,
    exclusions: PathExclusions,
}

impl AuthenticationFilter {
    pub fn new(validator: Arc<JwtValidator>, exclusions: PathExclusions) -> Self {
        Self {
            validator,
            exclusions,
        }
    }
}

#[async_trait::async_trait]
impl GatewayFilter for AuthenticationFilter {
    fn name(&self) -> &'static str {
        "AuthenticationFilter"
    }

    async fn handle(
        &self,
        ctx: &mut RequestContext,
        next: Next<'_>,
    ) -> Result<GatewayResponse, GatewayError> {
        if self.exclusions.is_excluded(&ctx.path) {
            debug!(path = %ctx.path, "path excluded from authentication");
            return next.run(ctx).await;
        }

        let claims = self
            .validator
            .authenticate_header(ctx.header(AUTHORIZATION.as_str()))?;

        debug!(principal = %claims.sub, path = %ctx.path, "request authenticated");
        ctx.set_overlay_header(AUTH_USER_HEADER, &claims.sub);
        ctx.principal = Some(claims.sub);

        next.run(ctx).await
    }
}
