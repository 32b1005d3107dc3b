use agentation_core::{
    Actor, Annotation, AnnotationStatus, BoundingBox, CoreError, Event, EventLog, EventPayload,
    EventType, Intent, Session, SessionStatus, Severity, ThreadMessage,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::backing::Backing;

/// Durable backing over a single sqlite file (`AGENTATION_STORE=sqlite:<path>`).
/// Nested structures (`context`, `thread`, event payloads) are stored as JSON
/// text columns rather than normalized tables — there is exactly one reader
/// of each, so the extra joins would buy nothing.
pub struct SqliteBacking {
    pool: SqlitePool,
}

impl SqliteBacking {
    pub async fn connect(url: &str) -> Result<Self, CoreError> {
        let pool = SqlitePool::connect(url)
            .await
            .map_err(|e| CoreError::transient(format!("failed to open sqlite database: {e}")))?;
        let backing = Self { pool };
        backing.ensure_schema().await?;
        Ok(backing)
    }

    pub async fn ensure_schema(&self) -> Result<(), CoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                url TEXT NOT NULL,
                project_id TEXT,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::transient(format!("failed to create sessions table: {e}")))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS annotations (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                comment TEXT NOT NULL,
                element TEXT NOT NULL,
                element_path TEXT NOT NULL,
                url TEXT,
                bbox_json TEXT,
                intent TEXT,
                severity TEXT,
                status TEXT NOT NULL,
                resolved_by TEXT,
                resolved_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                context_json TEXT NOT NULL,
                thread_json TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::transient(format!("failed to create annotations table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_annotations_session ON annotations(session_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::transient(format!("failed to index annotations: {e}")))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS events (
                sequence INTEGER PRIMARY KEY,
                event_type TEXT NOT NULL,
                session_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                payload_json TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::transient(format!("failed to create events table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_session ON events(session_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::transient(format!("failed to index events: {e}")))?;

        Ok(())
    }
}

fn session_status_str(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Active => "active",
        SessionStatus::Closed => "closed",
    }
}

fn session_status_from_str(value: &str) -> Result<SessionStatus, CoreError> {
    match value {
        "active" => Ok(SessionStatus::Active),
        "closed" => Ok(SessionStatus::Closed),
        other => Err(CoreError::Fatal(format!("unknown session status in row: {other}"))),
    }
}

fn annotation_status_str(status: AnnotationStatus) -> &'static str {
    match status {
        AnnotationStatus::Pending => "pending",
        AnnotationStatus::Acknowledged => "acknowledged",
        AnnotationStatus::Resolved => "resolved",
        AnnotationStatus::Dismissed => "dismissed",
    }
}

fn annotation_status_from_str(value: &str) -> Result<AnnotationStatus, CoreError> {
    match value {
        "pending" => Ok(AnnotationStatus::Pending),
        "acknowledged" => Ok(AnnotationStatus::Acknowledged),
        "resolved" => Ok(AnnotationStatus::Resolved),
        "dismissed" => Ok(AnnotationStatus::Dismissed),
        other => Err(CoreError::Fatal(format!("unknown annotation status in row: {other}"))),
    }
}

fn actor_str(actor: Actor) -> &'static str {
    match actor {
        Actor::Human => "human",
        Actor::Agent => "agent",
    }
}

fn actor_from_str(value: &str) -> Result<Actor, CoreError> {
    match value {
        "human" => Ok(Actor::Human),
        "agent" => Ok(Actor::Agent),
        other => Err(CoreError::Fatal(format!("unknown actor in row: {other}"))),
    }
}

fn intent_str(intent: Intent) -> &'static str {
    match intent {
        Intent::Fix => "fix",
        Intent::Change => "change",
        Intent::Question => "question",
        Intent::Approve => "approve",
    }
}

fn intent_from_str(value: &str) -> Result<Intent, CoreError> {
    match value {
        "fix" => Ok(Intent::Fix),
        "change" => Ok(Intent::Change),
        "question" => Ok(Intent::Question),
        "approve" => Ok(Intent::Approve),
        other => Err(CoreError::Fatal(format!("unknown intent in row: {other}"))),
    }
}

fn severity_str(severity: Severity) -> &'static str {
    match severity {
        Severity::Blocking => "blocking",
        Severity::Important => "important",
        Severity::Suggestion => "suggestion",
    }
}

fn severity_from_str(value: &str) -> Result<Severity, CoreError> {
    match value {
        "blocking" => Ok(Severity::Blocking),
        "important" => Ok(Severity::Important),
        "suggestion" => Ok(Severity::Suggestion),
        other => Err(CoreError::Fatal(format!("unknown severity in row: {other}"))),
    }
}

fn session_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Session, CoreError> {
    Ok(Session {
        id: row.try_get("id").map_err(row_error)?,
        url: row.try_get("url").map_err(row_error)?,
        project_id: row.try_get("project_id").map_err(row_error)?,
        status: session_status_from_str(&row.try_get::<String, _>("status").map_err(row_error)?)?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at").map_err(row_error)?)?,
    })
}

fn annotation_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Annotation, CoreError> {
    let bbox_json: Option<String> = row.try_get("bbox_json").map_err(row_error)?;
    let intent: Option<String> = row.try_get("intent").map_err(row_error)?;
    let severity: Option<String> = row.try_get("severity").map_err(row_error)?;
    let resolved_by: Option<String> = row.try_get("resolved_by").map_err(row_error)?;
    let resolved_at: Option<String> = row.try_get("resolved_at").map_err(row_error)?;
    let context_json: String = row.try_get("context_json").map_err(row_error)?;
    let thread_json: String = row.try_get("thread_json").map_err(row_error)?;

    Ok(Annotation {
        id: row.try_get("id").map_err(row_error)?,
        session_id: row.try_get("session_id").map_err(row_error)?,
        comment: row.try_get("comment").map_err(row_error)?,
        element: row.try_get("element").map_err(row_error)?,
        element_path: row.try_get("element_path").map_err(row_error)?,
        url: row.try_get("url").map_err(row_error)?,
        bbox: bbox_json
            .map(|json| serde_json::from_str::<BoundingBox>(&json))
            .transpose()
            .map_err(json_error)?,
        intent: intent.map(|s| intent_from_str(&s)).transpose()?,
        severity: severity.map(|s| severity_from_str(&s)).transpose()?,
        status: annotation_status_from_str(&row.try_get::<String, _>("status").map_err(row_error)?)?,
        resolved_by: resolved_by.map(|s| actor_from_str(&s)).transpose()?,
        resolved_at: resolved_at.map(|s| parse_timestamp(&s)).transpose()?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at").map_err(row_error)?)?,
        updated_at: parse_timestamp(&row.try_get::<String, _>("updated_at").map_err(row_error)?)?,
        context: serde_json::from_str::<HashMap<String, String>>(&context_json)
            .map_err(json_error)?,
        thread: serde_json::from_str::<Vec<ThreadMessage>>(&thread_json).map_err(json_error)?,
    })
}

fn row_error(e: sqlx::Error) -> CoreError {
    CoreError::Fatal(format!("malformed row: {e}"))
}

fn json_error(e: serde_json::Error) -> CoreError {
    CoreError::Fatal(format!("malformed json column: {e}"))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, CoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CoreError::Fatal(format!("malformed timestamp {value}: {e}")))
}

#[async_trait]
impl Backing for SqliteBacking {
    async fn insert_session(&self, session: &Session) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO sessions (id, url, project_id, status, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(&session.url)
        .bind(&session.project_id)
        .bind(session_status_str(session.status))
        .bind(session.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::transient(format!("failed to insert session: {e}")))?;
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, CoreError> {
        let rows = sqlx::query("SELECT * FROM sessions ORDER BY created_at ASC, id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CoreError::transient(format!("failed to list sessions: {e}")))?;
        rows.iter().map(session_from_row).collect()
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, CoreError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CoreError::transient(format!("failed to fetch session: {e}")))?;
        row.as_ref().map(session_from_row).transpose()
    }

    async fn replace_session(&self, session: &Session) -> Result<(), CoreError> {
        sqlx::query("UPDATE sessions SET url = ?, project_id = ?, status = ? WHERE id = ?")
            .bind(&session.url)
            .bind(&session.project_id)
            .bind(session_status_str(session.status))
            .bind(&session.id)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::transient(format!("failed to update session: {e}")))?;
        Ok(())
    }

    async fn delete_session(&self, id: &str) -> Result<Option<Session>, CoreError> {
        let existing = self.get_session(id).await?;
        if existing.is_some() {
            sqlx::query("DELETE FROM sessions WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| CoreError::transient(format!("failed to delete session: {e}")))?;
        }
        Ok(existing)
    }

    async fn insert_annotation(&self, annotation: &Annotation) -> Result<(), CoreError> {
        let bbox_json = annotation
            .bbox
            .map(|b| serde_json::to_string(&b))
            .transpose()
            .map_err(json_error)?;
        let context_json = serde_json::to_string(&annotation.context).map_err(json_error)?;
        let thread_json = serde_json::to_string(&annotation.thread).map_err(json_error)?;

        sqlx::query(
            "INSERT INTO annotations (
                id, session_id, comment, element, element_path, url, bbox_json, intent,
                severity, status, resolved_by, resolved_at, created_at, updated_at,
                context_json, thread_json
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&annotation.id)
        .bind(&annotation.session_id)
        .bind(&annotation.comment)
        .bind(&annotation.element)
        .bind(&annotation.element_path)
        .bind(&annotation.url)
        .bind(bbox_json)
        .bind(annotation.intent.map(intent_str))
        .bind(annotation.severity.map(severity_str))
        .bind(annotation_status_str(annotation.status))
        .bind(annotation.resolved_by.map(actor_str))
        .bind(annotation.resolved_at.map(|t| t.to_rfc3339()))
        .bind(annotation.created_at.to_rfc3339())
        .bind(annotation.updated_at.to_rfc3339())
        .bind(context_json)
        .bind(thread_json)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::transient(format!("failed to insert annotation: {e}")))?;
        Ok(())
    }

    async fn get_annotation(&self, id: &str) -> Result<Option<Annotation>, CoreError> {
        let row = sqlx::query("SELECT * FROM annotations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CoreError::transient(format!("failed to fetch annotation: {e}")))?;
        row.as_ref().map(annotation_from_row).transpose()
    }

    async fn list_annotations_by_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<Annotation>, CoreError> {
        let rows = sqlx::query(
            "SELECT * FROM annotations WHERE session_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::transient(format!("failed to list annotations: {e}")))?;
        rows.iter().map(annotation_from_row).collect()
    }

    async fn replace_annotation(&self, annotation: &Annotation) -> Result<(), CoreError> {
        let bbox_json = annotation
            .bbox
            .map(|b| serde_json::to_string(&b))
            .transpose()
            .map_err(json_error)?;
        let context_json = serde_json::to_string(&annotation.context).map_err(json_error)?;
        let thread_json = serde_json::to_string(&annotation.thread).map_err(json_error)?;

        sqlx::query(
            "UPDATE annotations SET
                comment = ?, element = ?, element_path = ?, url = ?, bbox_json = ?,
                intent = ?, severity = ?, status = ?, resolved_by = ?, resolved_at = ?,
                updated_at = ?, context_json = ?, thread_json = ?
             WHERE id = ?",
        )
        .bind(&annotation.comment)
        .bind(&annotation.element)
        .bind(&annotation.element_path)
        .bind(&annotation.url)
        .bind(bbox_json)
        .bind(annotation.intent.map(intent_str))
        .bind(annotation.severity.map(severity_str))
        .bind(annotation_status_str(annotation.status))
        .bind(annotation.resolved_by.map(actor_str))
        .bind(annotation.resolved_at.map(|t| t.to_rfc3339()))
        .bind(annotation.updated_at.to_rfc3339())
        .bind(context_json)
        .bind(thread_json)
        .bind(&annotation.id)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::transient(format!("failed to update annotation: {e}")))?;
        Ok(())
    }

    async fn delete_annotation(&self, id: &str) -> Result<Option<Annotation>, CoreError> {
        let existing = self.get_annotation(id).await?;
        if existing.is_some() {
            sqlx::query("DELETE FROM annotations WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| CoreError::transient(format!("failed to delete annotation: {e}")))?;
        }
        Ok(existing)
    }

    async fn list_all_pending_annotations(&self) -> Result<Vec<Annotation>, CoreError> {
        let rows = sqlx::query(
            "SELECT * FROM annotations WHERE status = 'pending' ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::transient(format!("failed to list pending annotations: {e}")))?;
        rows.iter().map(annotation_from_row).collect()
    }
}

#[async_trait]
impl EventLog for SqliteBacking {
    async fn append_event(&self, event: &Event) -> Result<(), CoreError> {
        let payload_json = serde_json::to_string(&event.payload).map_err(json_error)?;
        sqlx::query(
            "INSERT INTO events (sequence, event_type, session_id, timestamp, payload_json)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(event.sequence as i64)
        .bind(event.event_type.as_str())
        .bind(&event.session_id)
        .bind(event.timestamp.to_rfc3339())
        .bind(payload_json)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::transient(format!("failed to append event: {e}")))?;
        Ok(())
    }

    async fn events_since(
        &self,
        session_id: &str,
        last_sequence: u64,
        limit: usize,
    ) -> Result<Vec<Event>, CoreError> {
        let rows = sqlx::query(
            "SELECT * FROM events WHERE session_id = ? AND sequence > ?
             ORDER BY sequence ASC LIMIT ?",
        )
        .bind(session_id)
        .bind(last_sequence as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::transient(format!("failed to replay events: {e}")))?;

        rows.iter()
            .map(|row| {
                let event_type_str: String = row.try_get("event_type").map_err(row_error)?;
                let event_type = event_type_from_str(&event_type_str)?;
                let payload_json: String = row.try_get("payload_json").map_err(row_error)?;
                Ok(Event {
                    event_type,
                    timestamp: parse_timestamp(&row.try_get::<String, _>("timestamp").map_err(row_error)?)?,
                    session_id: row.try_get("session_id").map_err(row_error)?,
                    sequence: row.try_get::<i64, _>("sequence").map_err(row_error)? as u64,
                    payload: serde_json::from_str::<EventPayload>(&payload_json).map_err(json_error)?,
                })
            })
            .collect()
    }

    async fn delete_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64, CoreError> {
        let result = sqlx::query("DELETE FROM events WHERE timestamp < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::transient(format!("failed to sweep events: {e}")))?;
        Ok(result.rows_affected())
    }
}

fn event_type_from_str(value: &str) -> Result<EventType, CoreError> {
    match value {
        "annotation.created" => Ok(EventType::AnnotationCreated),
        "annotation.updated" => Ok(EventType::AnnotationUpdated),
        "annotation.deleted" => Ok(EventType::AnnotationDeleted),
        "session.created" => Ok(EventType::SessionCreated),
        "session.updated" => Ok(EventType::SessionUpdated),
        "session.closed" => Ok(EventType::SessionClosed),
        "thread.message" => Ok(EventType::ThreadMessage),
        other => Err(CoreError::Fatal(format!("unknown event type in row: {other}"))),
    }
}
