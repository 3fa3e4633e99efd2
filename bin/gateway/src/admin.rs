//! Route administration API
//!
//! CRUD over the live route table, under `/admin/routes`. Every call needs
//! a valid bearer token carrying the ADMIN role; changes take effect on the
//! next request with no restart.

use gateway_auth::{Claims, JwtValidator};
use gateway_core::{ErrorResponse, GatewayError, RouteDefinition, RouteRegistry};
use gateway_proxy::chain::{error_response, json_response};
use gateway_proxy::GatewayResponse;
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderValue, AUTHORIZATION, LOCATION};
use hyper::{Method, StatusCode};
use std::sync::Arc;
use tracing::{info, warn};

pub struct AdminApi {
    registry: Arc<RouteRegistry>,
    validator: Arc<JwtValidator>,
}

impl AdminApi {
    pub fn new(registry: Arc<RouteRegistry>, validator: Arc<JwtValidator>) -> Self {
        Self {
            registry,
            validator,
        }
    }

    pub async fn handle(
        &self,
        method: &Method,
        path: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> GatewayResponse {
        let claims = match self.authorize(headers, path) {
            Ok(claims) => claims,
            Err(response) => return response,
        };

        let result = match (method, path.strip_prefix("/admin/routes")) {
            (&Method::GET, Some("")) => self.list().await,
            (&Method::POST, Some("")) => self.create(&claims, body).await,
            (&Method::GET, Some(rest)) => match rest.strip_prefix('/') {
                Some(id) if !id.is_empty() => self.get(id).await,
                _ => Err(GatewayError::RouteNotFound(path.to_string())),
            },
            (&Method::PUT, Some(rest)) => match rest.strip_prefix('/') {
                Some(id) if !id.is_empty() => self.update(&claims, id, body).await,
                _ => Err(GatewayError::RouteNotFound(path.to_string())),
            },
            (&Method::DELETE, Some(rest)) => match rest.strip_prefix('/') {
                Some(id) if !id.is_empty() => self.delete(&claims, id).await,
                _ => Err(GatewayError::RouteNotFound(path.to_string())),
            },
            _ => Err(GatewayError::RouteNotFound(path.to_string())),
        };

        result.unwrap_or_else(|err| error_response(&err, path))
    }

    /// Admin calls require a valid token with the ADMIN role: 401 when the
    /// token is missing or invalid, 403 when the role is absent.
    fn authorize(&self, headers: &HeaderMap, path: &str) -> Result<Claims, GatewayResponse> {
        let header = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        let claims = self.validator.authenticate_header(header).map_err(|err| {
            warn!(path, error = %err, "admin call rejected");
            error_response(&GatewayError::Auth(err), path)
        })?;

        if !claims.has_role("ADMIN") {
            warn!(path, sub = %claims.sub, "admin call without ADMIN role");
            let envelope = ErrorResponse {
                status: 403,
                error: "Forbidden".to_string(),
                message: "ADMIN role required".to_string(),
                path: path.to_string(),
                timestamp: chrono_now(),
            };
            return Err(json_response(StatusCode::FORBIDDEN, envelope.to_json()));
        }

        Ok(claims)
    }

    async fn list(&self) -> Result<GatewayResponse, GatewayError> {
        let routes = self.registry.list().await;
        let refs: Vec<&RouteDefinition> = routes.iter().map(|r| r.as_ref()).collect();
        Ok(json_response(StatusCode::OK, encode(&refs)?))
    }

    async fn get(&self, id: &str) -> Result<GatewayResponse, GatewayError> {
        let route = self.registry.get(id).await?;
        Ok(json_response(StatusCode::OK, encode(route.as_ref())?))
    }

    async fn create(&self, claims: &Claims, body: Bytes) -> Result<GatewayResponse, GatewayError> {
        let route = parse_route(&body)?;
        let id = route.id.clone();
        self.registry.add(route.clone()).await?;
        info!(route = %id, by = %claims.sub, "route added");

        let mut response = json_response(StatusCode::CREATED, encode(&route)?);
        if let Ok(location) = HeaderValue::try_from(format!("/admin/routes/{}", id)) {
            response.headers_mut().insert(LOCATION, location);
        }
        Ok(response)
    }

    async fn update(
        &self,
        claims: &Claims,
        id: &str,
        body: Bytes,
    ) -> Result<GatewayResponse, GatewayError> {
        let route = parse_route(&body)?;
        // Reject mismatched ids before touching the table.
        if route.id != id {
            return Err(GatewayError::Validation(format!(
                "route id in body ({}) does not match path ({})",
                route.id, id
            )));
        }
        self.registry.update(route.clone()).await?;
        info!(route = %id, by = %claims.sub, "route updated");
        Ok(json_response(StatusCode::OK, encode(&route)?))
    }

    async fn delete(&self, claims: &Claims, id: &str) -> Result<GatewayResponse, GatewayError> {
        self.registry.delete(id).await?;
        info!(route = %id, by = %claims.sub, "route deleted");
        Ok(json_response(
            StatusCode::OK,
            format!("{{\"deleted\":\"{}\"}}", id),
        ))
    }
}

fn parse_route(body: &Bytes) -> Result<RouteDefinition, GatewayError> {
    serde_json::from_slice(body)
        .map_err(|e| GatewayError::Validation(format!("invalid route definition: {}", e)))
}

fn encode<T: serde::Serialize>(value: &T) -> Result<String, GatewayError> {
    serde_json::to_string(value).map_err(|e| GatewayError::Internal(e.into()))
}

fn chrono_now() -> String {
    chrono::Utc::now().to_rfc3339()
}
