//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{DomainError, ProductError};
use idempotency::IdempotencyError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Domain logic error.
    Domain(DomainError),
    /// Idempotency-key handling error.
    Idempotency(IdempotencyError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Domain(err) => domain_error_to_response(err),
            ApiError::Idempotency(err) => idempotency_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, String) {
    match &err {
        DomainError::Product(product_err) => match product_err {
            ProductError::Discontinued | ProductError::AlreadyCreated => {
                (StatusCode::CONFLICT, err.to_string())
            }
            ProductError::NameRequired
            | ProductError::InvalidPrice { .. }
            | ProductError::NotCreated => (StatusCode::BAD_REQUEST, err.to_string()),
        },
        DomainError::AggregateNotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

fn idempotency_error_to_response(err: IdempotencyError) -> (StatusCode, String) {
    match &err {
        IdempotencyError::InvalidKey(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        // The key is known but the payload differs; neither replaying nor
        // re-executing is safe.
        IdempotencyError::Conflict => (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
        IdempotencyError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<IdempotencyError> for ApiError {
    fn from(err: IdempotencyError) -> Self {
        ApiError::Idempotency(err)
    }
}
