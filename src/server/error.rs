//! Error-to-HTTP response conversion.
//!
//! Handlers return `Result<T, ApiError>`; any [`ifilm_common::Error`] converts
//! with `?` and is rendered as `{ "message": ..., "error": ... }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ifilm_common::Error;
use serde_json::json;

/// Wrapper so we can implement `IntoResponse` for an external type.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(status = %status, error = %self.0, "Server error in API handler");
        }

        let message = match &self.0 {
            Error::NotConfigured(_) | Error::NotInitialized => format!(
                "{}. Add and activate a Jellyfin server under /api/admin/jellyfin.",
                self.0
            ),
            other => other.to_string(),
        };

        let body = json!({
            "message": message,
            "error": self.0.code(),
        });

        (status, axum::Json(body)).into_response()
    }
}
