use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationStatus {
    Pending,
    Acknowledged,
    Resolved,
    Dismissed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Fix,
    Change,
    Question,
    Approve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Blocking,
    Important,
    Suggestion,
}

/// Shared by `Annotation::resolved_by` and `ThreadMessage::role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Human,
    Agent,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub url: String,
    pub project_id: Option<String>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: Session,
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadMessage {
    pub id: String,
    pub annotation_id: String,
    pub role: Actor,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub id: String,
    pub session_id: String,
    pub comment: String,
    pub element: String,
    pub element_path: String,
    pub url: Option<String>,
    pub bbox: Option<BoundingBox>,
    pub intent: Option<Intent>,
    pub severity: Option<Severity>,
    pub status: AnnotationStatus,
    pub resolved_by: Option<Actor>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Unrecognized fields from the submitting client (computed styles, nearby
    /// text, component tree, ...), stored and returned verbatim.
    #[serde(flatten)]
    pub context: HashMap<String, String>,
    pub thread: Vec<ThreadMessage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    pub url: String,
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPatch {
    pub status: Option<SessionStatus>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAnnotation {
    pub comment: String,
    pub element: String,
    pub element_path: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
    #[serde(default)]
    pub intent: Option<Intent>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default, flatten)]
    pub context: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationPatch {
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub element: Option<String>,
    #[serde(default)]
    pub element_path: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
    #[serde(default)]
    pub intent: Option<Intent>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub status: Option<AnnotationStatus>,
    #[serde(default)]
    pub resolved_by: Option<Actor>,
    #[serde(default, flatten)]
    pub context: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewThreadMessage {
    pub role: Actor,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "annotation.created")]
    AnnotationCreated,
    #[serde(rename = "annotation.updated")]
    AnnotationUpdated,
    #[serde(rename = "annotation.deleted")]
    AnnotationDeleted,
    #[serde(rename = "session.created")]
    SessionCreated,
    #[serde(rename = "session.updated")]
    SessionUpdated,
    #[serde(rename = "session.closed")]
    SessionClosed,
    #[serde(rename = "thread.message")]
    ThreadMessage,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AnnotationCreated => "annotation.created",
            Self::AnnotationUpdated => "annotation.updated",
            Self::AnnotationDeleted => "annotation.deleted",
            Self::SessionCreated => "session.created",
            Self::SessionUpdated => "session.updated",
            Self::SessionClosed => "session.closed",
            Self::ThreadMessage => "thread.message",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventPayload {
    Session(Session),
    Annotation(Annotation),
}

/// A durable record of a single mutation; also the wire envelope shape sent over SSE.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub sequence: u64,
    pub payload: EventPayload,
}

/// Legal edges of the annotation status lattice (see SPEC_FULL.md §3).
/// A same-valued transition (e.g. `pending -> pending`) is always legal and is a no-op
/// on the status field, but the caller still bumps `updated_at`.
pub fn validate_transition(
    current: AnnotationStatus,
    next: AnnotationStatus,
) -> Result<(), CoreError> {
    use AnnotationStatus::*;

    if current == next {
        return Ok(());
    }

    let legal = matches!(
        (current, next),
        (Pending, Acknowledged)
            | (Pending, Dismissed)
            | (Acknowledged, Resolved)
            | (Acknowledged, Dismissed)
            | (Resolved, Pending)
            | (Dismissed, Pending)
    );

    if legal {
        Ok(())
    } else {
        Err(CoreError::validation(format!(
            "illegal status transition: {current:?} -> {next:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AnnotationStatus::*;

    #[test]
    fn same_status_is_a_legal_noop() {
        assert!(validate_transition(Pending, Pending).is_ok());
        assert!(validate_transition(Resolved, Resolved).is_ok());
    }

    #[test]
    fn all_six_listed_edges_are_legal() {
        assert!(validate_transition(Pending, Acknowledged).is_ok());
        assert!(validate_transition(Pending, Dismissed).is_ok());
        assert!(validate_transition(Acknowledged, Resolved).is_ok());
        assert!(validate_transition(Acknowledged, Dismissed).is_ok());
        assert!(validate_transition(Resolved, Pending).is_ok());
        assert!(validate_transition(Dismissed, Pending).is_ok());
    }

    #[test]
    fn pending_to_resolved_is_illegal() {
        assert!(validate_transition(Pending, Resolved).is_err());
    }

    #[test]
    fn dismissed_to_resolved_is_illegal() {
        assert!(validate_transition(Dismissed, Resolved).is_err());
    }

    #[test]
    fn resolved_to_dismissed_is_illegal() {
        assert!(validate_transition(Resolved, Dismissed).is_err());
    }

    #[test]
    fn event_type_wire_names_match_spec() {
        assert_eq!(EventType::AnnotationCreated.as_str(), "annotation.created");
        assert_eq!(EventType::ThreadMessage.as_str(), "thread.message");
    }
}
