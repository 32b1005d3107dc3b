use agentation_core::{Annotation, CoreError, EventLog, Session};
use async_trait::async_trait;

/// Low-level entity custody: plain CRUD with no sequencing, validation, or
/// event publication. `Store` is the only thing that knows about those; a
/// `Backing` just has to remember what it was told and give it back.
///
/// A `Backing` is also an `EventLog`, since the event rows live in the same
/// place as everything else (the same sqlite file, or the same in-memory map).
#[async_trait]
pub trait Backing: EventLog + Send + Sync {
    async fn insert_session(&self, session: &Session) -> Result<(), CoreError>;

    /// Creation-time order.
    async fn list_sessions(&self) -> Result<Vec<Session>, CoreError>;

    async fn get_session(&self, id: &str) -> Result<Option<Session>, CoreError>;

    /// Overwrites a session already known to exist; callers fetch-then-mutate.
    async fn replace_session(&self, session: &Session) -> Result<(), CoreError>;

    async fn delete_session(&self, id: &str) -> Result<Option<Session>, CoreError>;

    async fn insert_annotation(&self, annotation: &Annotation) -> Result<(), CoreError>;

    async fn get_annotation(&self, id: &str) -> Result<Option<Annotation>, CoreError>;

    /// Creation-time order, ties broken by id.
    async fn list_annotations_by_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<Annotation>, CoreError>;

    async fn replace_annotation(&self, annotation: &Annotation) -> Result<(), CoreError>;

    async fn delete_annotation(&self, id: &str) -> Result<Option<Annotation>, CoreError>;

    /// Pending annotations across every session, creation-time order.
    async fn list_all_pending_annotations(&self) -> Result<Vec<Annotation>, CoreError>;
}
