use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Authentication failures, in the order the validator checks them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing or malformed bearer token")]
    MissingOrMalformedToken,

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("malformed token")]
    MalformedToken,

    #[error("token expired")]
    ExpiredToken,

    #[error("wrong token type: expected {expected}, got {actual}")]
    WrongTokenType { expected: String, actual: String },
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("request validation failed: {0}")]
    Validation(String),

    #[error("downstream timeout for route: {0}")]
    DownstreamTimeout(String),

    #[error("downstream unavailable: {0}")]
    DownstreamUnavailable(String),

    #[error("route not found: {0}")]
    RouteNotFound(String),

    #[error("internal gateway error")]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    /// HTTP status code for this error.
    pub fn status(&self) -> u16 {
        match self {
            GatewayError::Auth(_) => 401,
            GatewayError::Validation(_) => 400,
            GatewayError::DownstreamTimeout(_)
            | GatewayError::DownstreamUnavailable(_) => 503,
            GatewayError::RouteNotFound(_) => 404,
            GatewayError::Internal(_) => 500,
        }
    }

    /// Reason phrase used in the error envelope.
    pub fn reason(&self) -> &'static str {
        match self.status() {
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            503 => "Service Unavailable",
            _ => "Internal Server Error",
        }
    }

    /// Message safe to return to the client. Internal causes are replaced
    /// with a generic message; the real cause goes to the logs only.
    pub fn public_message(&self) -> String {
        match self {
            GatewayError::Internal(_) => "Internal Server Error".to_string(),
            other => other.to_string(),
        }
    }
}

/// Structured error envelope returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub error: String,
    pub message: String,
    pub path: String,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn from_error(err: &GatewayError, path: &str) -> Self {
        Self {
            status: err.status(),
            error: err.reason().to_string(),
            message: err.public_message(),
            path: path.to_string(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!("{{\"status\":{},\"error\":\"{}\"}}", self.status, self.error)
        })
    }
}
