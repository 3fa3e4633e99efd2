//! Fallback responses for unavailable downstream services
//!
//! Served when a circuit is open or a downstream call times out, and also
//! mounted at `/fallback/**` for routes configured to redirect there.

use crate::chain::{json_response, GatewayResponse};
use chrono::Utc;
use hyper::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Stable envelope for fallback responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackResponse {
    pub status: u16,
    pub error: String,
    pub message: String,
    pub timestamp: String,
}

impl FallbackResponse {
    fn new(message: String) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE.as_u16(),
            error: "Service Unavailable".to_string(),
            message,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Maps an unavailable route to a canned 503 response.
#[derive(Debug, Clone, Default)]
pub struct FallbackRouter;

impl FallbackRouter {
    pub fn new() -> Self {
        Self
    }

    /// Fallback response for a short-circuited or failed call.
    pub fn short_circuit(&self, method: &Method, route_id: Option<&str>) -> GatewayResponse {
        if let Some(route) = route_id {
            warn!(route = %route, method = %method, "serving fallback response");
        }
        let envelope = FallbackResponse::new(self.message_for(method, route_id));
        json_response(
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::to_string(&envelope).unwrap_or_default(),
        )
    }

    /// Handle a request to the `/fallback/**` surface. The path segment
    /// after `/fallback` names the route, when present.
    pub fn handle(&self, method: &Method, path: &str) -> GatewayResponse {
        let route = path
            .strip_prefix("/fallback")
            .map(|rest| rest.trim_matches('/'))
            .filter(|rest| !rest.is_empty());
        self.short_circuit(method, route)
    }

    fn message_for(&self, method: &Method, route_id: Option<&str>) -> String {
        if let Some(route) = route_id {
            return format!(
                "{} service is temporarily unavailable. Please try again later.",
                route
            );
        }
        match *method {
            Method::POST => {
                "Service is temporarily unavailable. Your request could not be processed."
            }
            Method::PUT => {
                "Service is temporarily unavailable. Your update could not be processed."
            }
            Method::DELETE => {
                "Service is temporarily unavailable. Your delete request could not be processed."
            }
            _ => "Service is temporarily unavailable. Please try again later.",
        }
        .to_string()
    }
}
