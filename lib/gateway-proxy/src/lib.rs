//! Request-processing pipeline for the edge gateway
//!
//! An ordered chain of filters wraps every proxied request: correlation
//! tracking, structured logging, metrics, JWT authentication, request
//! validation, and circuit breaking with fallback, innermost around the
//! downstream forwarder.

pub mod auth;
pub mod breaker;
pub mod chain;
pub mod context;
pub mod correlation;
pub mod fallback;
pub mod forwarder;
pub mod logging;
pub mod metrics;
pub mod validation;

pub use auth::AuthenticationFilter;
pub use breaker::{
    BreakerRegistry, CallPermit, CircuitBreaker, CircuitBreakerFilter, CircuitState, Outcome,
};
pub use chain::{FilterChain, GatewayFilter, GatewayResponse, Next, ProxyHandler};
pub use context::RequestContext;
pub use correlation::CorrelationFilter;
pub use fallback::{FallbackResponse, FallbackRouter};
pub use forwarder::RequestForwarder;
pub use logging::LoggingFilter;
pub use metrics::{MetricsCollector, MetricsFilter};
pub use validation::{AuthRequestValidator, RequestValidator, ValidationFilter, ValidatorRegistry};
