//! Error-to-HTTP response conversion.
//!
//! Handlers return `Result<T, AppError>`; failures render as
//! `{"detail": "..."}` with the status mapped from [`earsiv_common::Error`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Wrapper so we can implement `IntoResponse` for an external type.
#[derive(Debug)]
pub struct AppError(pub earsiv_common::Error);

impl From<earsiv_common::Error> for AppError {
    fn from(e: earsiv_common::Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(status = %status, error = %self.0, "Request failed");
        } else {
            tracing::debug!(status = %status, error = %self.0, "Request rejected");
        }

        (status, axum::Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}
