//! Entity custody for the annotation broker: sessions, annotations, and their
//! thread messages, backed by either sqlite or an in-memory map, composed with
//! the event bus behind a single `Store` façade.

pub mod backing;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use backing::Backing;
pub use memory::MemoryBacking;
pub use sqlite::SqliteBacking;
pub use store::Store;

use std::sync::Arc;

use agentation_bus::EventBus;
use agentation_core::{CoreError, EventLog};

/// Builds a `Store` from a backing selector, matching the `AGENTATION_STORE`
/// convention used by the supervisor binary: `memory`, or a sqlite connection
/// string (e.g. `sqlite://annotations.db` or `sqlite::memory:`).
pub async fn open_store(selector: &str, retention_days: i64) -> Result<Store, CoreError> {
    let backing: Arc<dyn Backing> = if selector.eq_ignore_ascii_case("memory") {
        Arc::new(MemoryBacking::new())
    } else {
        Arc::new(SqliteBacking::connect(selector).await?)
    };
    let log: Arc<dyn EventLog> = backing.clone();
    let bus = EventBus::new(log, retention_days);
    Ok(Store::new(backing, bus))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentation_core::{
        Actor, AnnotationPatch, AnnotationStatus, NewAnnotation, NewSession, SessionPatch,
        SessionStatus,
    };

    async fn memory_store() -> Store {
        open_store("memory", 7).await.unwrap()
    }

    #[tokio::test]
    async fn creating_a_session_publishes_and_persists() {
        let store = memory_store().await;
        let (_handle, mut rx) = store.bus().subscribe();

        let session = store
            .create_session(NewSession {
                url: "http://localhost:5173/".to_string(),
                project_id: Some("proj-1".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(session.status, SessionStatus::Active);
        let fetched = store.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, session.id);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.sequence, 1);
        assert_eq!(event.session_id, session.id);
    }

    #[tokio::test]
    async fn add_annotation_requires_an_existing_session() {
        let store = memory_store().await;
        let result = store
            .add_annotation(
                "does-not-exist",
                NewAnnotation {
                    comment: "broken".to_string(),
                    element: "button".to_string(),
                    element_path: "body > button".to_string(),
                    url: None,
                    bbox: None,
                    intent: None,
                    severity: None,
                    context: Default::default(),
                },
            )
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn annotation_starts_pending_and_rejects_illegal_transition() {
        let store = memory_store().await;
        let session = store
            .create_session(NewSession {
                url: "http://localhost:5173/".to_string(),
                project_id: None,
            })
            .await
            .unwrap();

        let annotation = store
            .add_annotation(
                &session.id,
                NewAnnotation {
                    comment: "button too small".to_string(),
                    element: "button.submit".to_string(),
                    element_path: "body > form > button.submit".to_string(),
                    url: None,
                    bbox: None,
                    intent: None,
                    severity: None,
                    context: Default::default(),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(annotation.status, AnnotationStatus::Pending);

        let rejected = store
            .update_annotation(
                &annotation.id,
                AnnotationPatch {
                    status: Some(AnnotationStatus::Resolved),
                    ..Default::default()
                },
            )
            .await;
        assert!(rejected.is_err());
    }

    #[tokio::test]
    async fn resolving_sets_and_reopening_clears_resolution_fields() {
        let store = memory_store().await;
        let session = store
            .create_session(NewSession {
                url: "http://localhost:5173/".to_string(),
                project_id: None,
            })
            .await
            .unwrap();
        let annotation = store
            .add_annotation(
                &session.id,
                NewAnnotation {
                    comment: "text unreadable".to_string(),
                    element: "p.caption".to_string(),
                    element_path: "body > p.caption".to_string(),
                    url: None,
                    bbox: None,
                    intent: None,
                    severity: None,
                    context: Default::default(),
                },
            )
            .await
            .unwrap()
            .unwrap();

        let acknowledged = store
            .update_annotation(
                &annotation.id,
                AnnotationPatch {
                    status: Some(AnnotationStatus::Acknowledged),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert!(acknowledged.resolved_at.is_none());

        let resolved = store
            .update_annotation(
                &annotation.id,
                AnnotationPatch {
                    status: Some(AnnotationStatus::Resolved),
                    resolved_by: Some(Actor::Agent),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert!(resolved.resolved_at.is_some());
        assert_eq!(resolved.resolved_by, Some(Actor::Agent));

        let reopened = store
            .update_annotation(
                &annotation.id,
                AnnotationPatch {
                    status: Some(AnnotationStatus::Pending),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert!(reopened.resolved_at.is_none());
        assert!(reopened.resolved_by.is_none());
    }

    #[tokio::test]
    async fn deleting_an_annotation_removes_it_from_pending() {
        let store = memory_store().await;
        let session = store
            .create_session(NewSession {
                url: "http://localhost:5173/".to_string(),
                project_id: None,
            })
            .await
            .unwrap();
        let annotation = store
            .add_annotation(
                &session.id,
                NewAnnotation {
                    comment: "spacing".to_string(),
                    element: "div.card".to_string(),
                    element_path: "body > div.card".to_string(),
                    url: None,
                    bbox: None,
                    intent: None,
                    severity: None,
                    context: Default::default(),
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(store.pending_annotations(&session.id).await.unwrap().len(), 1);
        let deleted = store.delete_annotation(&annotation.id).await.unwrap();
        assert!(deleted.is_some());
        assert_eq!(store.pending_annotations(&session.id).await.unwrap().len(), 0);
        assert!(store.get_annotation(&annotation.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn thread_messages_append_in_order() {
        let store = memory_store().await;
        let session = store
            .create_session(NewSession {
                url: "http://localhost:5173/".to_string(),
                project_id: None,
            })
            .await
            .unwrap();
        let annotation = store
            .add_annotation(
                &session.id,
                NewAnnotation {
                    comment: "confusing copy".to_string(),
                    element: "h1".to_string(),
                    element_path: "body > h1".to_string(),
                    url: None,
                    bbox: None,
                    intent: None,
                    severity: None,
                    context: Default::default(),
                },
            )
            .await
            .unwrap()
            .unwrap();

        store
            .add_thread_message(&annotation.id, Actor::Human, "please simplify".to_string())
            .await
            .unwrap();
        let updated = store
            .add_thread_message(&annotation.id, Actor::Agent, "done".to_string())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.thread.len(), 2);
        assert_eq!(updated.thread[0].content, "please simplify");
        assert_eq!(updated.thread[1].content, "done");
    }

    #[tokio::test]
    async fn closing_a_session_publishes_session_closed() {
        let store = memory_store().await;
        let session = store
            .create_session(NewSession {
                url: "http://localhost:5173/".to_string(),
                project_id: None,
            })
            .await
            .unwrap();
        let (_handle, mut rx) = store.bus().subscribe_session(session.id.clone());
        // drain the session.created event from the subscription above being
        // registered after creation publishes — nothing queued yet, so skip.

        let closed = store
            .update_session(
                &session.id,
                SessionPatch {
                    status: Some(SessionStatus::Closed),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(closed.status, SessionStatus::Closed);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, agentation_core::EventType::SessionClosed);
    }
}
