use agentation_core::CoreError;
use axum::extract::{Query, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ApiKeyQuery {
    api_key: Option<String>,
}

/// Thin bearer-credential gate, not a full auth stack: a single shared secret,
/// checked only when `AGENTATION_API_KEY` was configured at startup.
pub async fn require_api_key(
    State(state): State<AppState>,
    Query(query): Query<ApiKeyQuery>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = &state.api_key else {
        return Ok(next.run(request).await);
    };

    let header_token = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    let presented = header_token.or(query.api_key.as_deref());

    match presented {
        Some(token) if token == expected.as_ref() => Ok(next.run(request).await),
        _ => Err(ApiError::from(CoreError::Unauthorized)),
    }
}
