use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, Result, ValidationFailure},
    middleware_layer::client_ip::ClientIp,
    services::session as session_service,
    state::AppState,
    validation::license::validate_license_key,
};

/// The request payload shared by validate and heartbeat.
#[derive(Deserialize, Debug)]
pub struct LicenseKeyRequest {
    #[serde(rename = "licenseKey", default)]
    pub license_key: Option<String>,
}

#[derive(Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
}

#[derive(Serialize)]
pub struct HeartbeatResponse {
    pub success: bool,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub store: &'static str,
}

fn license_key(
    payload: &std::result::Result<Json<LicenseKeyRequest>, JsonRejection>,
) -> Result<&str> {
    let key = match payload {
        Ok(Json(request)) => request.license_key.as_deref(),
        Err(rejection) => {
            tracing::debug!("Unreadable request body: {}", rejection);
            None
        }
    };
    validate_license_key(key)
}

/// Validates a license key and binds its session to the caller's address.
#[axum::debug_handler(state = AppState)]
pub async fn validate(
    State(state): State<AppState>,
    ClientIp(address): ClientIp,
    payload: std::result::Result<Json<LicenseKeyRequest>, JsonRejection>,
) -> std::result::Result<Json<ValidateResponse>, ValidationFailure> {
    let key = license_key(&payload).map_err(|e| match e {
        AppError::Validation(msg) => ValidationFailure::InvalidRequest(msg),
        other => ValidationFailure::InvalidRequest(other.to_string()),
    })?;

    session_service::validate(
        state.store.as_ref(),
        &state.policy,
        key,
        address,
        Utc::now(),
    )
    .await?;

    Ok(Json(ValidateResponse { valid: true }))
}

/// Refreshes session recency. Accepted even for unknown keys.
#[axum::debug_handler(state = AppState)]
pub async fn heartbeat(
    State(state): State<AppState>,
    payload: std::result::Result<Json<LicenseKeyRequest>, JsonRejection>,
) -> Result<Json<HeartbeatResponse>> {
    let key = license_key(&payload)?;

    session_service::heartbeat(state.store.as_ref(), key, Utc::now()).await;

    Ok(Json(HeartbeatResponse { success: true }))
}

/// Plain-text liveness check.
pub async fn root() -> &'static str {
    "License Server is running."
}

/// Reports whether the record store is reachable.
pub async fn health(State(state): State<AppState>) -> Response {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy",
                version: env!("CARGO_PKG_VERSION"),
                store: "ok",
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("❌ Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded",
                    version: env!("CARGO_PKG_VERSION"),
                    store: "unreachable",
                }),
            )
                .into_response()
        }
    }
}
