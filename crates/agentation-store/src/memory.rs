use std::collections::HashMap;

use agentation_core::{Annotation, AnnotationStatus, CoreError, Event, EventLog, Session};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::backing::Backing;

/// Volatile backing for local development and tests (`AGENTATION_STORE=memory`).
/// Everything is gone on process exit; no schema, no migrations.
#[derive(Default)]
pub struct MemoryBacking {
    sessions: RwLock<HashMap<String, Session>>,
    annotations: RwLock<HashMap<String, Annotation>>,
    events: RwLock<Vec<Event>>,
}

impl MemoryBacking {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sort_by_created_then_id<T>(items: &mut [T], created_at: impl Fn(&T) -> DateTime<Utc>, id: impl Fn(&T) -> &str) {
    items.sort_by(|a, b| created_at(a).cmp(&created_at(b)).then_with(|| id(a).cmp(id(b))));
}

#[async_trait]
impl Backing for MemoryBacking {
    async fn insert_session(&self, session: &Session) -> Result<(), CoreError> {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, CoreError> {
        let mut sessions: Vec<Session> = self.sessions.read().await.values().cloned().collect();
        sort_by_created_then_id(&mut sessions, |s| s.created_at, |s| &s.id);
        Ok(sessions)
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, CoreError> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn replace_session(&self, session: &Session) -> Result<(), CoreError> {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn delete_session(&self, id: &str) -> Result<Option<Session>, CoreError> {
        Ok(self.sessions.write().await.remove(id))
    }

    async fn insert_annotation(&self, annotation: &Annotation) -> Result<(), CoreError> {
        self.annotations
            .write()
            .await
            .insert(annotation.id.clone(), annotation.clone());
        Ok(())
    }

    async fn get_annotation(&self, id: &str) -> Result<Option<Annotation>, CoreError> {
        Ok(self.annotations.read().await.get(id).cloned())
    }

    async fn list_annotations_by_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<Annotation>, CoreError> {
        let mut annotations: Vec<Annotation> = self
            .annotations
            .read()
            .await
            .values()
            .filter(|a| a.session_id == session_id)
            .cloned()
            .collect();
        sort_by_created_then_id(&mut annotations, |a| a.created_at, |a| &a.id);
        Ok(annotations)
    }

    async fn replace_annotation(&self, annotation: &Annotation) -> Result<(), CoreError> {
        self.annotations
            .write()
            .await
            .insert(annotation.id.clone(), annotation.clone());
        Ok(())
    }

    async fn delete_annotation(&self, id: &str) -> Result<Option<Annotation>, CoreError> {
        Ok(self.annotations.write().await.remove(id))
    }

    async fn list_all_pending_annotations(&self) -> Result<Vec<Annotation>, CoreError> {
        let mut annotations: Vec<Annotation> = self
            .annotations
            .read()
            .await
            .values()
            .filter(|a| a.status == AnnotationStatus::Pending)
            .cloned()
            .collect();
        sort_by_created_then_id(&mut annotations, |a| a.created_at, |a| &a.id);
        Ok(annotations)
    }
}

#[async_trait]
impl EventLog for MemoryBacking {
    async fn append_event(&self, event: &Event) -> Result<(), CoreError> {
        self.events.write().await.push(event.clone());
        Ok(())
    }

    async fn events_since(
        &self,
        session_id: &str,
        last_sequence: u64,
        limit: usize,
    ) -> Result<Vec<Event>, CoreError> {
        Ok(self
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.session_id == session_id && e.sequence > last_sequence)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn delete_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64, CoreError> {
        let mut events = self.events.write().await;
        let before = events.len();
        events.retain(|e| e.timestamp >= cutoff);
        Ok((before - events.len()) as u64)
    }
}
