//! Core types for the edge gateway: error taxonomy, route definitions,
//! the shared route registry, and configuration.

pub mod config;
pub mod error;
pub mod registry;
pub mod route;

pub use config::{BreakerConfig, BreakerSettings, ConfigError, GatewayConfig};
pub use error::{AuthError, ErrorResponse, GatewayError, Result};
pub use registry::RouteRegistry;
pub use route::{RouteDefinition, RouteFilterConfig, RoutePredicate};

/// Correlation id attached to every request flowing through the gateway.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Alternate upstream-supplied request id, accepted in place of a
/// correlation id.
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Authenticated principal header, set only by the gateway.
pub const AUTH_USER_HEADER: &str = "X-Auth-User";

/// Marker header asserting the request traversed the gateway. Downstream
/// services refuse requests that lack it.
pub const GATEWAY_MARKER_HEADER: &str = "X-Gateway-Auth";

/// Value of the gateway marker header.
pub const GATEWAY_MARKER_VALUE: &str = "true";
