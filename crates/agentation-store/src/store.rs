use std::sync::Arc;

use agentation_bus::EventBus;
use agentation_core::{
    new_id, Actor, Annotation, AnnotationPatch, AnnotationStatus, CoreError, EventPayload,
    EventType, NewAnnotation, NewSession, Session, SessionDetail, SessionPatch, SessionStatus,
    ThreadMessage,
};
use chrono::Utc;

use crate::backing::Backing;

/// Owns entity storage and is the sole caller of `EventBus::publish` — every
/// mutation here is durably written and fanned out before the method returns,
/// so callers never observe a stored change without its matching event.
pub struct Store {
    backing: Arc<dyn Backing>,
    bus: Arc<EventBus>,
    /// Serializes mutations so a fetch-then-replace sequence (the patch methods
    /// below) appears atomic to every reader, on both backings. Readers never
    /// take this lock.
    write_lock: tokio::sync::Mutex<()>,
}

impl Store {
    pub fn new(backing: Arc<dyn Backing>, bus: Arc<EventBus>) -> Self {
        Self {
            backing,
            bus,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub async fn create_session(&self, new_session: NewSession) -> Result<Session, CoreError> {
        let _guard = self.write_lock.lock().await;
        let session = Session {
            id: new_id(),
            url: new_session.url,
            project_id: new_session.project_id,
            status: SessionStatus::Active,
            created_at: Utc::now(),
        };
        self.backing.insert_session(&session).await?;
        self.bus
            .publish(
                EventType::SessionCreated,
                session.id.clone(),
                EventPayload::Session(session.clone()),
            )
            .await?;
        Ok(session)
    }

    pub async fn list_sessions(&self) -> Result<Vec<Session>, CoreError> {
        self.backing.list_sessions().await
    }

    pub async fn get_session(&self, id: &str) -> Result<Option<Session>, CoreError> {
        self.backing.get_session(id).await
    }

    pub async fn get_session_with_annotations(
        &self,
        id: &str,
    ) -> Result<Option<SessionDetail>, CoreError> {
        let Some(session) = self.backing.get_session(id).await? else {
            return Ok(None);
        };
        let annotations = self.backing.list_annotations_by_session(id).await?;
        Ok(Some(SessionDetail {
            session,
            annotations,
        }))
    }

    pub async fn update_session(
        &self,
        id: &str,
        patch: SessionPatch,
    ) -> Result<Option<Session>, CoreError> {
        let _guard = self.write_lock.lock().await;
        let Some(mut session) = self.backing.get_session(id).await? else {
            return Ok(None);
        };
        if let Some(status) = patch.status {
            session.status = status;
        }
        self.backing.replace_session(&session).await?;
        let event_type = match session.status {
            SessionStatus::Closed => EventType::SessionClosed,
            SessionStatus::Active => EventType::SessionUpdated,
        };
        self.bus
            .publish(event_type, session.id.clone(), EventPayload::Session(session.clone()))
            .await?;
        Ok(Some(session))
    }

    /// No event type is defined for session deletion (see the event catalog in
    /// SPEC_FULL.md §3); the row is simply removed.
    pub async fn delete_session(&self, id: &str) -> Result<Option<Session>, CoreError> {
        let _guard = self.write_lock.lock().await;
        self.backing.delete_session(id).await
    }

    pub async fn add_annotation(
        &self,
        session_id: &str,
        new_annotation: NewAnnotation,
    ) -> Result<Option<Annotation>, CoreError> {
        let _guard = self.write_lock.lock().await;
        if self.backing.get_session(session_id).await?.is_none() {
            return Ok(None);
        }
        let now = Utc::now();
        let annotation = Annotation {
            id: new_id(),
            session_id: session_id.to_string(),
            comment: new_annotation.comment,
            element: new_annotation.element,
            element_path: new_annotation.element_path,
            url: new_annotation.url,
            bbox: new_annotation.bbox,
            intent: new_annotation.intent,
            severity: new_annotation.severity,
            status: AnnotationStatus::Pending,
            resolved_by: None,
            resolved_at: None,
            created_at: now,
            updated_at: now,
            context: new_annotation.context,
            thread: Vec::new(),
        };
        self.backing.insert_annotation(&annotation).await?;
        self.bus
            .publish(
                EventType::AnnotationCreated,
                session_id.to_string(),
                EventPayload::Annotation(annotation.clone()),
            )
            .await?;
        Ok(Some(annotation))
    }

    pub async fn get_annotation(&self, id: &str) -> Result<Option<Annotation>, CoreError> {
        self.backing.get_annotation(id).await
    }

    /// Applies `patch`, validating any status change against the lattice in
    /// `agentation_core::validate_transition`. `resolved_at`/`resolved_by` are
    /// kept in sync with the resulting status: present iff resolved or dismissed.
    pub async fn update_annotation(
        &self,
        id: &str,
        patch: AnnotationPatch,
    ) -> Result<Option<Annotation>, CoreError> {
        let _guard = self.write_lock.lock().await;
        let Some(mut annotation) = self.backing.get_annotation(id).await? else {
            return Ok(None);
        };

        if let Some(status) = patch.status {
            agentation_core::validate_transition(annotation.status, status)?;
            annotation.status = status;
        }
        if let Some(comment) = patch.comment {
            annotation.comment = comment;
        }
        if let Some(element) = patch.element {
            annotation.element = element;
        }
        if let Some(element_path) = patch.element_path {
            annotation.element_path = element_path;
        }
        if patch.url.is_some() {
            annotation.url = patch.url;
        }
        if patch.bbox.is_some() {
            annotation.bbox = patch.bbox;
        }
        if patch.intent.is_some() {
            annotation.intent = patch.intent;
        }
        if patch.severity.is_some() {
            annotation.severity = patch.severity;
        }
        if let Some(resolved_by) = patch.resolved_by {
            annotation.resolved_by = Some(resolved_by);
        }
        for (key, value) in patch.context {
            annotation.context.insert(key, value);
        }

        match annotation.status {
            AnnotationStatus::Resolved | AnnotationStatus::Dismissed => {
                if annotation.resolved_at.is_none() {
                    annotation.resolved_at = Some(Utc::now());
                }
                if annotation.resolved_by.is_none() {
                    annotation.resolved_by = Some(Actor::Human);
                }
            }
            AnnotationStatus::Pending | AnnotationStatus::Acknowledged => {
                annotation.resolved_at = None;
                annotation.resolved_by = None;
            }
        }

        annotation.updated_at = Utc::now();
        self.backing.replace_annotation(&annotation).await?;
        self.bus
            .publish(
                EventType::AnnotationUpdated,
                annotation.session_id.clone(),
                EventPayload::Annotation(annotation.clone()),
            )
            .await?;
        Ok(Some(annotation))
    }

    pub async fn delete_annotation(&self, id: &str) -> Result<Option<Annotation>, CoreError> {
        let _guard = self.write_lock.lock().await;
        let Some(annotation) = self.backing.delete_annotation(id).await? else {
            return Ok(None);
        };
        self.bus
            .publish(
                EventType::AnnotationDeleted,
                annotation.session_id.clone(),
                EventPayload::Annotation(annotation.clone()),
            )
            .await?;
        Ok(Some(annotation))
    }

    pub async fn pending_annotations(
        &self,
        session_id: &str,
    ) -> Result<Vec<Annotation>, CoreError> {
        let mut annotations = self.backing.list_annotations_by_session(session_id).await?;
        annotations.retain(|a| a.status == AnnotationStatus::Pending);
        Ok(annotations)
    }

    pub async fn all_pending_annotations(&self) -> Result<Vec<Annotation>, CoreError> {
        self.backing.list_all_pending_annotations().await
    }

    pub async fn add_thread_message(
        &self,
        annotation_id: &str,
        role: Actor,
        content: String,
    ) -> Result<Option<Annotation>, CoreError> {
        let _guard = self.write_lock.lock().await;
        let Some(mut annotation) = self.backing.get_annotation(annotation_id).await? else {
            return Ok(None);
        };
        annotation.thread.push(ThreadMessage {
            id: new_id(),
            annotation_id: annotation_id.to_string(),
            role,
            content,
            created_at: Utc::now(),
        });
        annotation.updated_at = Utc::now();
        self.backing.replace_annotation(&annotation).await?;
        self.bus
            .publish(
                EventType::ThreadMessage,
                annotation.session_id.clone(),
                EventPayload::Annotation(annotation.clone()),
            )
            .await?;
        Ok(Some(annotation))
    }
}
