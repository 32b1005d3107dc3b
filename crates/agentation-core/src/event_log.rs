use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CoreError;
use crate::model::Event;

/// Durable persistence of the event log, implemented by a Store backing.
/// The Event Bus owns sequence assignment and retention *policy*; it delegates
/// the actual reads/writes/deletes of event rows to whichever backing is active.
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn append_event(&self, event: &Event) -> Result<(), CoreError>;

    /// Events for `session_id` with `sequence > last_sequence`, in sequence order,
    /// capped at `limit`.
    async fn events_since(
        &self,
        session_id: &str,
        last_sequence: u64,
        limit: usize,
    ) -> Result<Vec<Event>, CoreError>;

    /// Deletes events older than `cutoff`; returns the number of rows removed.
    async fn delete_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64, CoreError>;
}
