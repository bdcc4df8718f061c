//! HTTP mapping for ingestion errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use proxvoice_core::error::ProxVoiceError;

/// Error returned by ingestion handlers.
#[derive(Debug)]
pub struct ApiError(pub ProxVoiceError);

impl From<ProxVoiceError> for ApiError {
    fn from(e: ProxVoiceError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self.0 {
            ProxVoiceError::BadRequest(details) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "invalid_request", "details": details }),
            ),
            ProxVoiceError::UnsupportedVersion => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "invalid_request", "details": self.0.to_string() }),
            ),
            ProxVoiceError::AuthFailed => (StatusCode::UNAUTHORIZED, json!({ "error": "unauthorized" })),
            ProxVoiceError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, json!({ "error": "rate_limited" })),
            ProxVoiceError::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "internal_error" }))
            }
        };
        (status, Json(body)).into_response()
    }
}
