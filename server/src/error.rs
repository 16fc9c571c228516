// server/src/error.rs
//! Maps every domain error this edge can surface onto the HTTP status
//! conventions spec.md §6 mandates, including the machine-readable
//! `BILLING_REQUIRED` body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("billing required")]
    BillingRequired,

    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ledger::Error> for ApiError {
    fn from(err: ledger::Error) -> Self {
        match err {
            ledger::Error::Validation(msg) => ApiError::Validation(msg),
            ledger::Error::NotFound => ApiError::NotFound,
            ledger::Error::BillingRequired => ApiError::BillingRequired,
            ledger::Error::Internal(msg) => ApiError::Internal(msg),
            ledger::Error::Db(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, json!({ "detail": msg })),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, json!({ "detail": "unauthorized" })),
            ApiError::BillingRequired => (
                StatusCode::FORBIDDEN,
                json!({ "detail": { "code": "BILLING_REQUIRED", "message": "a paid plan is required to create trades" } }),
            ),
            ApiError::NotFound => (StatusCode::NOT_FOUND, json!({ "detail": "not found" })),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, json!({ "detail": msg })),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, json!({ "detail": msg })),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
