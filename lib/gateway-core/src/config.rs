//! Gateway configuration
//!
//! Loaded from a YAML file (path in `GATEWAY_CONFIG`), with field-wise
//! defaults so partial files work.

use crate::route::RouteDefinition;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub listen_addr: String,
    pub jwt: JwtSettings,
    pub auth: AuthSettings,
    pub downstream: DownstreamSettings,
    pub breaker: BreakerConfig,
    /// Routes published at startup.
    pub routes: Vec<RouteDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtSettings {
    /// Base64-encoded HMAC-SHA256 shared secret.
    pub secret: String,
    /// When set, tokens must carry this `token_type` claim ("access").
    pub expected_token_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Paths that bypass JWT validation. Exact, literal-prefix, or `/**`.
    pub exclude_paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownstreamSettings {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

/// Circuit breaker defaults plus per-route overrides. An override replaces
/// the whole parameter set for that route.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub default: BreakerSettings,
    pub routes: HashMap<String, BreakerSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    /// Number of call outcomes kept in the sliding window.
    pub window_size: usize,
    /// Failure rate (percent) over a full window that opens the circuit.
    pub failure_rate_threshold: f32,
    /// Slow-call rate (percent) over a full window that opens the circuit.
    pub slow_call_rate_threshold: f32,
    /// Calls slower than this are counted as slow.
    pub slow_call_duration_ms: u64,
    /// How long the circuit stays open before admitting trial calls.
    pub wait_duration_ms: u64,
    /// Trial calls admitted while half-open.
    pub half_open_permitted_calls: u32,
    /// Absolute downstream call timeout; expiry counts as a failure.
    pub call_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            jwt: JwtSettings::default(),
            auth: AuthSettings::default(),
            downstream: DownstreamSettings::default(),
            breaker: BreakerConfig::default(),
            routes: Vec::new(),
        }
    }
}

impl Default for JwtSettings {
    fn default() -> Self {
        Self {
            secret: String::new(),
            expected_token_type: None,
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            exclude_paths: vec![
                "/api/auth/login".to_string(),
                "/api/auth/register".to_string(),
                "/api/auth/refresh-token".to_string(),
                "/actuator/**".to_string(),
                "/fallback/**".to_string(),
            ],
        }
    }
}

impl Default for DownstreamSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5,
            request_timeout_secs: 10,
        }
    }
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            window_size: 10,
            failure_rate_threshold: 50.0,
            slow_call_rate_threshold: 50.0,
            slow_call_duration_ms: 2_000,
            wait_duration_ms: 10_000,
            half_open_permitted_calls: 5,
            call_timeout_ms: 3_000,
        }
    }
}

impl GatewayConfig {
    /// Load from the file named by `GATEWAY_CONFIG`, or fall back to
    /// defaults when the variable is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var("GATEWAY_CONFIG") {
            Ok(path) => Self::from_file(&path),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().display().to_string();
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path_str.clone(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path_str,
            source,
        })
    }
}

impl DownstreamSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl BreakerConfig {
    /// Settings for a route: its override if present, the defaults
    /// otherwise.
    pub fn for_route(&self, route_id: &str) -> &BreakerSettings {
        self.routes.get(route_id).unwrap_or(&self.default)
    }
}

impl BreakerSettings {
    pub fn slow_call_duration(&self) -> Duration {
        Duration::from_millis(self.slow_call_duration_ms)
    }

    pub fn wait_duration(&self) -> Duration {
        Duration::from_millis(self.wait_duration_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}
