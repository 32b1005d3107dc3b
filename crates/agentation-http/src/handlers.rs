use agentation_core::{
    AnnotationPatch, CoreError, NewAnnotation, NewSession, NewThreadMessage, SessionPatch,
};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct Health {
    status: &'static str,
}

pub async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

pub async fn list_sessions(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let sessions = state.store.list_sessions().await?;
    Ok(Json(sessions))
}

pub async fn create_session(
    State(state): State<AppState>,
    Json(new_session): Json<NewSession>,
) -> Result<impl IntoResponse, ApiError> {
    if new_session.url.trim().is_empty() {
        return Err(ApiError::from(CoreError::validation("url is required")));
    }
    let session = state.store.create_session(new_session).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state
        .store
        .get_session_with_annotations(&id)
        .await?
        .ok_or_else(|| CoreError::not_found("session", id))?;
    Ok(Json(detail))
}

pub async fn update_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<SessionPatch>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .store
        .update_session(&id, patch)
        .await?
        .ok_or_else(|| CoreError::not_found("session", id))?;
    Ok(Json(session))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.store.delete_session(&id).await?;
    match session {
        Some(_) => Ok(Json(json!({ "deleted": true, "sessionId": id }))),
        None => Err(ApiError::from(CoreError::not_found("session", id))),
    }
}

pub async fn add_annotation(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(new_annotation): Json<NewAnnotation>,
) -> Result<impl IntoResponse, ApiError> {
    if new_annotation.comment.trim().is_empty() {
        return Err(ApiError::from(CoreError::validation("comment is required")));
    }
    if new_annotation.element.trim().is_empty() {
        return Err(ApiError::from(CoreError::validation("element is required")));
    }
    if new_annotation.element_path.trim().is_empty() {
        return Err(ApiError::from(CoreError::validation(
            "elementPath is required",
        )));
    }

    let annotation = state
        .store
        .add_annotation(&session_id, new_annotation)
        .await?
        .ok_or_else(|| CoreError::not_found("session", session_id))?;
    Ok((StatusCode::CREATED, Json(annotation)))
}

pub async fn session_pending(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let annotations = state.store.pending_annotations(&session_id).await?;
    Ok(Json(json!({ "count": annotations.len(), "annotations": annotations })))
}

pub async fn get_annotation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let annotation = state
        .store
        .get_annotation(&id)
        .await?
        .ok_or_else(|| CoreError::not_found("annotation", id))?;
    Ok(Json(annotation))
}

pub async fn update_annotation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<AnnotationPatch>,
) -> Result<impl IntoResponse, ApiError> {
    let annotation = state.store.update_annotation(&id, patch).await?;
    match annotation {
        Some(annotation) => Ok(Json(annotation)),
        None => Err(ApiError::from(CoreError::not_found("annotation", id))),
    }
}

pub async fn delete_annotation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let annotation = state.store.delete_annotation(&id).await?;
    match annotation {
        Some(_) => Ok(Json(json!({ "deleted": true, "annotationId": id }))),
        None => Err(ApiError::from(CoreError::not_found("annotation", id))),
    }
}

pub async fn add_thread_message(
    State(state): State<AppState>,
    Path(annotation_id): Path<String>,
    Json(message): Json<NewThreadMessage>,
) -> Result<impl IntoResponse, ApiError> {
    if message.content.trim().is_empty() {
        return Err(ApiError::from(CoreError::validation("content is required")));
    }
    let annotation = state
        .store
        .add_thread_message(&annotation_id, message.role, message.content)
        .await?
        .ok_or_else(|| CoreError::not_found("annotation", annotation_id))?;
    Ok((StatusCode::CREATED, Json(annotation)))
}

pub async fn all_pending(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let annotations = state.store.all_pending_annotations().await?;
    Ok(Json(json!({ "count": annotations.len(), "annotations": annotations })))
}
