use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gridmatch_types::{ErrorClass, GridmatchError};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Error type of every API handler.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Domain(#[from] GridmatchError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, code) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, "BAD_REQUEST"),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg, "NOT_FOUND"),
            Self::Domain(e @ GridmatchError::OrderNotFound(_)) => {
                (StatusCode::NOT_FOUND, e.to_string(), "ORDER_NOT_FOUND")
            }
            Self::Domain(e) => match e.class() {
                ErrorClass::InvalidInput => (StatusCode::BAD_REQUEST, e.to_string(), "INVALID_INPUT"),
                ErrorClass::Conflict => (StatusCode::CONFLICT, e.to_string(), "CONFLICT"),
                ErrorClass::Transient | ErrorClass::Fatal => {
                    error!(error = %e, class = %e.class(), "Request failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal server error".to_string(),
                        "INTERNAL_ERROR",
                    )
                }
            },
        };

        let body = Json(json!({
            "error": code,
            "message": message,
        }));
        (status, body).into_response()
    }
}
