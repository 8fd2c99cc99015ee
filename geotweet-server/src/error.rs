//! API error types with IntoResponse
//!
//! Errors are converted to JSON responses with appropriate status codes.
//! Pool and database failures are logged and reported as a generic 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use geotweet_pool::{PoolError, SessionError};
use serde_json::json;

use crate::models::ValidationError;

/// API error type with automatic HTTP status mapping
#[derive(Debug)]
pub enum ApiError {
    /// Query parameters rejected (400)
    Validation(ValidationError),

    /// Nothing to report yet (404)
    NotFound { resource: &'static str },

    /// Session pool failure (500, logged)
    Pool(PoolError),

    /// Database error (500, logged)
    Database(SessionError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::Validation(e) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "validation_error",
                    "message": e.to_string()
                }),
            ),
            Self::NotFound { resource } => (
                StatusCode::NOT_FOUND,
                json!({
                    "error": "not_found",
                    "message": format!("no {} available", resource)
                }),
            ),
            Self::Pool(e) => {
                tracing::error!(error = %e, "Session pool error");
                internal()
            }
            Self::Database(e) => {
                tracing::error!(error = %e, "Database error");
                internal()
            }
        };

        (status, Json(body)).into_response()
    }
}

fn internal() -> (StatusCode, serde_json::Value) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({
            "error": "internal_error",
            "message": "an internal error occurred"
        }),
    )
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<PoolError> for ApiError {
    fn from(e: PoolError) -> Self {
        Self::Pool(e)
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        Self::Database(e)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(SessionError::Query(e))
    }
}
