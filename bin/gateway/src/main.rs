use anyhow::{Context, Result};
use gateway_auth::{JwtValidator, PathExclusions, TokenType};
use gateway_core::{GatewayConfig, RouteRegistry};
use gateway_proxy::{
    AuthRequestValidator, AuthenticationFilter, BreakerRegistry, CircuitBreakerFilter,
    CorrelationFilter, FallbackRouter, FilterChain, LoggingFilter, MetricsCollector,
    MetricsFilter, RequestContext, RequestForwarder, ValidationFilter, ValidatorRegistry,
};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::tokio::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

mod admin;

use admin::AdminApi;

/// Shared per-process state handed to every connection task.
struct Gateway {
    chain: FilterChain,
    admin: AdminApi,
    fallback: FallbackRouter,
    metrics: MetricsCollector,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = GatewayConfig::from_env().context("loading gateway configuration")?;
    info!(listen = %config.listen_addr, routes = config.routes.len(), "starting gateway");

    let registry = Arc::new(RouteRegistry::with_routes(config.routes.clone()));

    // Log route table refreshes as the admin API publishes them.
    let mut route_changes = registry.subscribe();
    tokio::spawn(async move {
        while route_changes.changed().await.is_ok() {
            info!(version = *route_changes.borrow(), "route table updated");
        }
    });

    let secret = std::env::var("GATEWAY_JWT_SECRET").unwrap_or_else(|_| config.jwt.secret.clone());
    let expected_type = match config.jwt.expected_token_type.as_deref() {
        Some(raw) => Some(
            raw.parse::<TokenType>()
                .map_err(|e| anyhow::anyhow!(e))
                .context("jwt.expected_token_type")?,
        ),
        None => None,
    };
    let validator =
        Arc::new(JwtValidator::new(&secret, expected_type).context("building JWT validator")?);
    let exclusions = PathExclusions::new(config.auth.exclude_paths.clone());

    let metrics = MetricsCollector::new().context("building metrics collector")?;
    let breakers = Arc::new(BreakerRegistry::new(config.breaker.clone()));
    let fallback = FallbackRouter::new();
    let validators = Arc::new(ValidatorRegistry::new().register(AuthRequestValidator));
    let forwarder = Arc::new(RequestForwarder::new(&config.downstream));

    let chain = FilterChain::new(registry.clone(), forwarder)
        .add(CorrelationFilter)
        .add(LoggingFilter)
        .add(MetricsFilter::new(metrics.clone()))
        .add(AuthenticationFilter::new(validator.clone(), exclusions))
        .add(ValidationFilter::new(validators))
        .add(
            CircuitBreakerFilter::new(breakers, Arc::new(FallbackRouter::new()))
                .with_metrics(metrics.clone()),
        );

    let gateway = Arc::new(Gateway {
        chain,
        admin: AdminApi::new(registry, validator),
        fallback,
        metrics,
    });

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .with_context(|| format!("invalid listen address: {}", config.listen_addr))?;
    let listener = TcpListener::bind(&addr).await?;
    info!("listening on {}", addr);

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let gateway = gateway.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req| {
                let gateway = gateway.clone();
                async move { handle_request(gateway, req).await }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!("error serving connection from {}: {}", peer_addr, e);
            }
        });
    }
}

async fn handle_request(
    gateway: Arc<Gateway>,
    req: Request<hyper::body::Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let (parts, body) = req.into_parts();
    let body = body.collect().await?.to_bytes();

    let method = parts.method.clone();
    let path = parts.uri.path().to_string();
    debug!(%method, %path, "inbound request");

    // Local endpoints served by the gateway itself.
    if path == "/metrics" && method == Method::GET {
        let text = gateway.metrics.gather().unwrap_or_else(|e| {
            warn!(error = %e, "failed to gather metrics");
            String::new()
        });
        return Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "text/plain; version=0.0.4")
            .body(Full::new(Bytes::from(text)))
            .unwrap_or_else(|_| Response::new(Full::new(Bytes::new()))));
    }

    if path == "/healthz" || path == "/actuator/health" {
        return Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "application/json")
            .body(Full::new(Bytes::from("{\"status\":\"UP\"}")))
            .unwrap_or_else(|_| Response::new(Full::new(Bytes::new()))));
    }

    let response = if path == "/fallback" || path.starts_with("/fallback/") {
        gateway.fallback.handle(&method, &path)
    } else if path == "/admin/routes" || path.starts_with("/admin/routes/") {
        gateway.admin.handle(&method, &path, &parts.headers, body).await
    } else {
        let ctx = RequestContext::from_parts(&parts, body);
        gateway.chain.process(ctx).await
    };

    let (parts, bytes) = response.into_parts();
    Ok(Response::from_parts(parts, Full::new(bytes)))
}
