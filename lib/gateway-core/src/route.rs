//! Route definitions and request matching

use serde::{Deserialize, Serialize};

/// A route published to the gateway: a request predicate, a target service
/// address, and an ordered list of filters applied to the forwarded request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDefinition {
    pub id: String,
    pub predicate: RoutePredicate,
    /// Base URI of the downstream service, e.g. `http://lab-1-service:8081`.
    pub uri: String,
    #[serde(default)]
    pub filters: Vec<RouteFilterConfig>,
}

/// Predicate matching a route against an inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePredicate {
    /// Path pattern: exact, literal prefix, or `/**` subtree suffix.
    pub path: String,
    /// Allowed methods; empty means any.
    #[serde(default)]
    pub methods: Vec<String>,
}

/// Filters applied when building the downstream request, in order.
/// Wire form: `{ "name": "StripPrefix", "args": { "parts": 1 } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "args")]
pub enum RouteFilterConfig {
    /// Drop the first `parts` path segments before forwarding.
    StripPrefix { parts: usize },
    /// Add a fixed header to the forwarded request.
    AddRequestHeader { name: String, value: String },
}

impl RouteDefinition {
    /// Whether this route matches the given path and method.
    pub fn matches(&self, path: &str, method: &str) -> bool {
        self.predicate.matches_path(path) && self.predicate.matches_method(method)
    }
}

impl RoutePredicate {
    /// Match a request path against the pattern.
    ///
    /// A pattern ending in `/**` matches the base path and everything under
    /// it. Any other pattern matches by exact equality or literal prefix.
    pub fn matches_path(&self, path: &str) -> bool {
        let pattern = self.path.as_str();

        if let Some(base) = pattern.strip_suffix("/**") {
            return path == base || path.starts_with(&format!("{}/", base));
        }

        path == pattern || path.starts_with(pattern)
    }

    /// Match an HTTP method. An empty method list matches everything.
    pub fn matches_method(&self, method: &str) -> bool {
        if self.methods.is_empty() {
            return true;
        }
        self.methods.iter().any(|m| m.eq_ignore_ascii_case(method))
    }
}

/// Apply the route's path filters to an inbound path, producing the path
/// sent downstream.
pub fn rewrite_path(route: &RouteDefinition, path: &str) -> String {
    let mut result = path.to_string();
    for filter in &route.filters {
        if let RouteFilterConfig::StripPrefix { parts } = filter {
            let segments: Vec<&str> = result.split('/').filter(|s| !s.is_empty()).collect();
            let kept = segments.into_iter().skip(*parts).collect::<Vec<_>>();
            result = format!("/{}", kept.join("/"));
        }
    }
    result
}
