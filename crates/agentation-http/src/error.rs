use agentation_core::CoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Maps `CoreError` onto the wire-level signal described in SPEC_FULL.md §7.
pub struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(error: CoreError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            CoreError::Validation(reason) => (StatusCode::BAD_REQUEST, reason.clone()),
            CoreError::NotFound { kind, id } => {
                (StatusCode::NOT_FOUND, format!("{kind} not found: {id}"))
            }
            CoreError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            CoreError::Transient(reason) => {
                tracing::warn!(reason, "transient store failure");
                (StatusCode::INTERNAL_SERVER_ERROR, reason.clone())
            }
            CoreError::Fatal(reason) => {
                tracing::error!(reason, "fatal error");
                (StatusCode::INTERNAL_SERVER_ERROR, reason.clone())
            }
        };

        match &self.0 {
            CoreError::Validation(_) | CoreError::NotFound { .. } => {
                tracing::debug!(error = %self.0, "request rejected");
            }
            _ => {}
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}
