//! Path/method-scoped request validation
//!
//! Validators declare which requests they apply to via `supports`; the
//! validation filter runs every supporting validator in registration order
//! and aborts on the first failure with a 400. GET and OPTIONS requests
//! bypass validation.

use crate::chain::{GatewayFilter, GatewayResponse, Next};
use crate::context::RequestContext;
use gateway_core::GatewayError;
use hyper::header::CONTENT_TYPE;
use hyper::Method;
use std::sync::Arc;
use tracing::{debug, warn};

/// A body/header validator scoped to particular paths and methods.
pub trait RequestValidator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this validator applies to the given path and method.
    fn supports(&self, path: &str, method: &Method) -> bool;

    /// Validate the request; an `Err` aborts the chain with a 400.
    fn validate(&self, ctx: &RequestContext) -> Result<(), GatewayError>;
}

/// Ordered collection of validators.
#[derive(Default)]
pub struct ValidatorRegistry {
    validators: Vec<Arc<dyn RequestValidator>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<V: RequestValidator + 'static>(mut self, validator: V) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Validators applying to the given request.
    pub fn matching(&self, path: &str, method: &Method) -> Vec<Arc<dyn RequestValidator>> {
        self.validators
            .iter()
            .filter(|v| v.supports(path, method))
            .cloned()
            .collect()
    }
}

/// Validator for authentication endpoints: POST bodies must be JSON.
pub struct AuthRequestValidator;

impl RequestValidator for AuthRequestValidator {
    fn name(&self) -> &'static str {
        "AuthRequestValidator"
    }

    fn supports(&self, path: &str, method: &Method) -> bool {
        (path.ends_with("/auth/login") || path.ends_with("/auth/register"))
            && *method == Method::POST
    }

    fn validate(&self, ctx: &RequestContext) -> Result<(), GatewayError> {
        let content_type = ctx.header(CONTENT_TYPE.as_str()).unwrap_or("");
        if !content_type.contains("application/json") {
            warn!(path = %ctx.path, content_type = %content_type, "invalid content type");
            return Err(GatewayError::Validation(
                "Content-Type must be application/json".to_string(),
            ));
        }

        if ctx.body.is_empty() {
            return Err(GatewayError::Validation(
                "request body must not be empty".to_string(),
            ));
        }

        if serde_json::from_slice::<serde_json::Value>(&ctx.body).is_err() {
            return Err(GatewayError::Validation(
                "request body is not valid JSON".to_string(),
            ));
        }

        debug!(path = %ctx.path, "request validation passed");
        Ok(())
    }
}

/// Filter running the matching validators before the request is proxied.
pub struct ValidationFilter {
    registry: Arc<ValidatorRegistry>,
}

impl ValidationFilter {
    pub fn new(registry: Arc<ValidatorRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait::async_trait]
impl GatewayFilter for ValidationFilter {
    fn name(&self) -> &'static str {
        "ValidationFilter"
    }

    async fn handle(
        &self,
        ctx: &mut RequestContext,
        next: Next<'_>,
    ) -> Result<GatewayResponse, GatewayError> {
        // Idempotent reads are assumed safe.
        if ctx.method == Method::GET || ctx.method == Method::OPTIONS {
            return next.run(ctx).await;
        }

        for validator in self.registry.matching(&ctx.path, &ctx.method) {
            debug!(validator = validator.name(), path = %ctx.path, "running validator");
            validator.validate(ctx)?;
        }

        next.run(ctx).await
    }
}
