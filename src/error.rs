use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::models::license::LicenseStatus;

/// Faults raised by a license record store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A connection could not be checked out of the pool.
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// The pool could not be built from the configuration.
    #[error("Pool creation error: {0}")]
    CreatePool(#[from] deadpool_postgres::CreatePoolError),

    /// A query failed.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// A row was missing an expected column.
    #[error("Missing column data: {0}")]
    MissingData(String),

    /// The key already exists or was issued before and deleted.
    #[error("License key already issued: {0}")]
    Duplicate(String),
}

/// A `Result` type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A record store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The Telegram Bot API call failed.
    #[error("Telegram error: {0}")]
    Telegram(#[from] reqwest::Error),

    /// An authentication error.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The caller is not the configured administrator.
    #[error("You are not authorized.")]
    Unauthorized,

    /// A validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),

    /// A rate limit exceeded error.
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

fn json_response(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Store(ref e) => {
                tracing::error!("Store error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }

            AppError::Redis(ref e) => {
                tracing::error!("Redis error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Cache error".to_string())
            }

            AppError::Telegram(ref e) => {
                tracing::error!("Telegram error: {}", e);
                (StatusCode::BAD_GATEWAY, "Upstream error".to_string())
            }

            AppError::Authentication(ref msg) => {
                tracing::warn!("Authentication failed: {}", msg);
                (StatusCode::UNAUTHORIZED, msg.clone())
            }

            AppError::Unauthorized => {
                tracing::warn!("Authorization failed");
                (StatusCode::FORBIDDEN, "Forbidden".to_string())
            }

            AppError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }

            AppError::RateLimitExceeded(ref msg) => {
                tracing::warn!("Rate limit exceeded: {}", msg);
                (StatusCode::TOO_MANY_REQUESTS, msg.clone())
            }
        };

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "error": message
        }))
        .unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string());

        json_response(status, body)
    }
}

/// Why a validation request was not granted.
///
/// The display strings are the messages returned to the client verbatim.
#[derive(Error, Debug)]
pub enum ValidationFailure {
    /// The request did not carry a usable license key.
    #[error("{0}")]
    InvalidRequest(String),

    /// No record exists for the key.
    #[error("License key not found.")]
    NotFound,

    /// The key exists but its status is not `active`.
    #[error("License key is inactive (status: {0}).")]
    Inactive(LicenseStatus),

    /// A live session for the key is bound to a different address.
    #[error("License key is already in use on another network.")]
    SessionConflict,

    /// The store failed while reading or writing the record.
    #[error("An internal server error occurred.")]
    Persistence(#[source] StoreError),
}

impl ValidationFailure {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ValidationFailure::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ValidationFailure::NotFound => StatusCode::NOT_FOUND,
            ValidationFailure::Inactive(_) | ValidationFailure::SessionConflict => {
                StatusCode::FORBIDDEN
            }
            ValidationFailure::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ValidationFailure {
    fn into_response(self) -> Response {
        if let ValidationFailure::Persistence(ref e) = self {
            tracing::error!("Persistence error during validation: {}", e);
        }

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "valid": false,
            "message": self.to_string()
        }))
        .unwrap_or_else(|_| r#"{"valid":false}"#.to_string());

        json_response(self.status_code(), body)
    }
}
