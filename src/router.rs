use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use http::{HeaderValue, Method, header};
use std::sync::Arc;
use std::time::Duration;
use tower_governor::governor::GovernorConfigBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{
    error::{AppError, Result},
    handlers, middleware_layer,
    middleware_layer::client_ip::ClientIpKeyExtractor,
    state::AppState,
};

/// Request bodies here are a few hundred bytes at most.
const MAX_BODY_BYTES: usize = 64 * 1024;

fn cors_layer(allowed_origins: &[String]) -> Result<CorsLayer> {
    let origins = if allowed_origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let parsed = allowed_origins
            .iter()
            .map(|origin| {
                origin
                    .parse::<HeaderValue>()
                    .map_err(|_| AppError::Internal(format!("invalid CORS origin: {}", origin)))
            })
            .collect::<Result<Vec<_>>>()?;
        AllowOrigin::list(parsed)
    };

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(86400)))
}

/// Builds the full application router.
///
/// The governor layer on the webhook keys on the client address, falling
/// back to the peer, so the router must be served with
/// `ConnectInfo<SocketAddr>`.
pub fn build_router(state: AppState) -> Result<Router> {
    let webhook_governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .key_extractor(ClientIpKeyExtractor {
                trust_proxy_headers: state.config.trust_proxy_headers,
            })
            .per_second(1)
            .burst_size(30)
            .finish()
            .ok_or_else(|| AppError::Internal("invalid governor configuration".to_string()))?,
    );

    let client_routes = Router::new()
        .route("/validate", post(handlers::license::validate))
        .route("/api/validate", post(handlers::license::validate))
        .route("/heartbeat", post(handlers::license::heartbeat))
        .route("/api/heartbeat", post(handlers::license::heartbeat))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::rate_limit::rate_limit_clients,
        ))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route("/api/webhook", post(handlers::webhook::telegram_webhook))
        .layer(tower_governor::GovernorLayer::new(webhook_governor_conf))
        .with_state(state.clone());

    let status_routes = Router::new()
        .route("/", get(handlers::license::root))
        .route("/health", get(handlers::license::health))
        .with_state(state.clone());

    let app = Router::new()
        .merge(client_routes)
        .merge(admin_routes)
        .merge(status_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default())
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors_layer(&state.config.cors_allowed_origins)?);

    Ok(app)
}
