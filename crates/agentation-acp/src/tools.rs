use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::Instant;

use crate::client::{as_error, HttpClient};
use crate::error::AcpError;

const WATCH_DEFAULT_TIMEOUT_MS: u64 = 30_000;
const WATCH_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// The fixed tool catalog from SPEC_FULL.md §4.4, in the shape `tools/list`
/// returns. Kept as plain JSON rather than a generated schema — nine tools
/// is small enough that a `schemars`-derived schema would buy little over
/// writing the shape directly, and it keeps this crate's dependency list
/// free of a second JSON-schema layer on top of `serde_json`.
pub fn catalog() -> Value {
    json!([
        {
            "name": "list_sessions",
            "description": "Returns all sessions (id, url, status, createdAt).",
            "inputSchema": {"type": "object", "properties": {}},
        },
        {
            "name": "get_session",
            "description": "Returns session detail with annotations.",
            "inputSchema": {
                "type": "object",
                "properties": {"sessionId": {"type": "string"}},
                "required": ["sessionId"],
            },
        },
        {
            "name": "get_pending",
            "description": "Returns pending annotations for a session.",
            "inputSchema": {
                "type": "object",
                "properties": {"sessionId": {"type": "string"}},
                "required": ["sessionId"],
            },
        },
        {
            "name": "get_all_pending",
            "description": "Returns pending annotations across all sessions.",
            "inputSchema": {"type": "object", "properties": {}},
        },
        {
            "name": "acknowledge",
            "description": "Transitions pending -> acknowledged.",
            "inputSchema": {
                "type": "object",
                "properties": {"annotationId": {"type": "string"}},
                "required": ["annotationId"],
            },
        },
        {
            "name": "resolve",
            "description": "Transitions to resolved, resolver=agent. If summary is given, appends a thread message.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "annotationId": {"type": "string"},
                    "summary": {"type": "string"},
                },
                "required": ["annotationId"],
            },
        },
        {
            "name": "dismiss",
            "description": "Transitions to dismissed, resolver=agent, appends a thread message with the reason.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "annotationId": {"type": "string"},
                    "reason": {"type": "string"},
                },
                "required": ["annotationId", "reason"],
            },
        },
        {
            "name": "reply",
            "description": "Appends a thread message with role agent.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "annotationId": {"type": "string"},
                    "message": {"type": "string"},
                },
                "required": ["annotationId", "message"],
            },
        },
        {
            "name": "watch_annotations",
            "description": "Blocks until one or more new pending annotations appear, or the timeout elapses.",
            "inputSchema": {
                "type": "object",
                "properties": {"timeout": {"type": "number"}},
            },
        },
    ])
}

fn required_str(arguments: &Value, field: &str) -> Result<String, AcpError> {
    arguments
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AcpError::InvalidArguments(format!("{field} is required")))
}

fn optional_str(arguments: &Value, field: &str) -> Result<Option<String>, AcpError> {
    match arguments.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(AcpError::InvalidArguments(format!(
            "{field} must be a string"
        ))),
    }
}

fn optional_timeout_ms(arguments: &Value) -> Result<u64, AcpError> {
    match arguments.get("timeout") {
        None | Some(Value::Null) => Ok(WATCH_DEFAULT_TIMEOUT_MS),
        Some(value) => value
            .as_u64()
            .ok_or_else(|| AcpError::InvalidArguments("timeout must be a non-negative number".to_string())),
    }
}

/// Dispatches a validated tool call to the HTTP Surface and returns the
/// tool's JSON result payload (the caller wraps it in the ACP envelope).
pub struct Dispatcher {
    client: HttpClient,
}

impl Dispatcher {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    pub async fn call(&self, name: &str, arguments: &Value) -> Result<Value, AcpError> {
        match name {
            "list_sessions" => self.list_sessions().await,
            "get_session" => self.get_session(arguments).await,
            "get_pending" => self.get_pending(arguments).await,
            "get_all_pending" => self.get_all_pending().await,
            "acknowledge" => self.acknowledge(arguments).await,
            "resolve" => self.resolve(arguments).await,
            "dismiss" => self.dismiss(arguments).await,
            "reply" => self.reply(arguments).await,
            "watch_annotations" => self.watch_annotations(arguments).await,
            other => Err(AcpError::UnknownTool(other.to_string())),
        }
    }

    async fn list_sessions(&self) -> Result<Value, AcpError> {
        let (status, body) = self.client.get("/sessions").await?;
        if status != 200 {
            return Err(as_error(status, &body));
        }
        Ok(body)
    }

    async fn get_session(&self, arguments: &Value) -> Result<Value, AcpError> {
        let session_id = required_str(arguments, "sessionId")?;
        let (status, body) = self.client.get(&format!("/sessions/{session_id}")).await?;
        if status != 200 {
            return Err(as_error(status, &body));
        }
        Ok(body)
    }

    async fn get_pending(&self, arguments: &Value) -> Result<Value, AcpError> {
        let session_id = required_str(arguments, "sessionId")?;
        let (status, body) = self
            .client
            .get(&format!("/sessions/{session_id}/pending"))
            .await?;
        if status != 200 {
            return Err(as_error(status, &body));
        }
        Ok(body)
    }

    async fn get_all_pending(&self) -> Result<Value, AcpError> {
        let (status, body) = self.client.get("/pending").await?;
        if status != 200 {
            return Err(as_error(status, &body));
        }
        Ok(body)
    }

    async fn acknowledge(&self, arguments: &Value) -> Result<Value, AcpError> {
        let annotation_id = required_str(arguments, "annotationId")?;
        let (status, body) = self
            .client
            .patch(
                &format!("/annotations/{annotation_id}"),
                &json!({ "status": "acknowledged" }),
            )
            .await?;
        if status != 200 {
            return Err(as_error(status, &body));
        }
        Ok(body)
    }

    async fn resolve(&self, arguments: &Value) -> Result<Value, AcpError> {
        let annotation_id = required_str(arguments, "annotationId")?;
        let summary = optional_str(arguments, "summary")?;

        let body = self
            .advance_to(&annotation_id, path_to_resolved, "resolved")
            .await?;

        if let Some(summary) = summary {
            let (status, thread_body) = self
                .client
                .post(
                    &format!("/annotations/{annotation_id}/thread"),
                    &json!({ "role": "agent", "content": format!("Resolved: {summary}") }),
                )
                .await?;
            if status != 201 {
                return Err(as_error(status, &thread_body));
            }
            return Ok(thread_body);
        }

        Ok(body)
    }

    async fn dismiss(&self, arguments: &Value) -> Result<Value, AcpError> {
        let annotation_id = required_str(arguments, "annotationId")?;
        let reason = required_str(arguments, "reason")?;

        self.advance_to(&annotation_id, path_to_dismissed, "dismissed")
            .await?;

        let (status, thread_body) = self
            .client
            .post(
                &format!("/annotations/{annotation_id}/thread"),
                &json!({ "role": "agent", "content": format!("Dismissed: {reason}") }),
            )
            .await?;
        if status != 201 {
            return Err(as_error(status, &thread_body));
        }
        Ok(thread_body)
    }

    /// Walks the annotation status lattice from its current status to
    /// `target` via `path_fn`, one legal-edge PATCH per hop, so a tool
    /// documented as `* -> target` holds even though the store only accepts
    /// the six direct lattice edges (e.g. resolving a `pending` annotation
    /// goes `pending -> acknowledged -> resolved`). The final hop carries
    /// `resolvedBy: "agent"`; a current status already at `target` issues no
    /// PATCH at all.
    async fn advance_to(
        &self,
        annotation_id: &str,
        path_fn: fn(&str) -> &'static [&'static str],
        target: &'static str,
    ) -> Result<Value, AcpError> {
        let (status, mut body) = self.client.get(&format!("/annotations/{annotation_id}")).await?;
        if status != 200 {
            return Err(as_error(status, &body));
        }
        let current = body
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or(target)
            .to_string();

        for step in path_fn(&current) {
            let patch = if *step == target {
                json!({ "status": step, "resolvedBy": "agent" })
            } else {
                json!({ "status": step })
            };
            let (status, resp) = self
                .client
                .patch(&format!("/annotations/{annotation_id}"), &patch)
                .await?;
            if status != 200 {
                return Err(as_error(status, &resp));
            }
            body = resp;
        }
        Ok(body)
    }

    async fn reply(&self, arguments: &Value) -> Result<Value, AcpError> {
        let annotation_id = required_str(arguments, "annotationId")?;
        let message = required_str(arguments, "message")?;

        let (status, body) = self
            .client
            .post(
                &format!("/annotations/{annotation_id}/thread"),
                &json!({ "role": "agent", "content": message }),
            )
            .await?;
        if status != 201 {
            return Err(as_error(status, &body));
        }
        Ok(body)
    }

    /// Polls `GET /pending` (the dispatcher has no direct bus subscription —
    /// it only speaks HTTP to the broker) until an annotation id appears that
    /// wasn't in the baseline snapshot taken when the call started, or the
    /// timeout elapses.
    async fn watch_annotations(&self, arguments: &Value) -> Result<Value, AcpError> {
        let timeout = Duration::from_millis(optional_timeout_ms(arguments)?);
        let deadline = Instant::now() + timeout;

        let baseline = self.pending_ids().await?;

        loop {
            if Instant::now() >= deadline {
                return Ok(json!({ "count": 0, "annotations": [] }));
            }

            tokio::time::sleep(WATCH_POLL_INTERVAL.min(deadline - Instant::now())).await;

            let (status, body) = self.client.get("/pending").await?;
            if status != 200 {
                return Err(as_error(status, &body));
            }
            let annotations = body
                .get("annotations")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            let fresh: Vec<Value> = annotations
                .into_iter()
                .filter(|a| {
                    a.get("id")
                        .and_then(Value::as_str)
                        .is_some_and(|id| !baseline.contains(id))
                })
                .collect();

            if !fresh.is_empty() {
                return Ok(json!({ "count": fresh.len(), "annotations": fresh }));
            }
        }
    }

    async fn pending_ids(&self) -> Result<std::collections::HashSet<String>, AcpError> {
        let (status, body) = self.client.get("/pending").await?;
        if status != 200 {
            return Err(as_error(status, &body));
        }
        Ok(body
            .get("annotations")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|a| a.get("id").and_then(Value::as_str).map(str::to_string))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_str_rejects_missing_and_empty() {
        assert!(required_str(&json!({}), "annotationId").is_err());
        assert!(required_str(&json!({ "annotationId": "" }), "annotationId").is_err());
        assert!(required_str(&json!({ "annotationId": "a1" }), "annotationId").is_ok());
    }

    #[test]
    fn optional_timeout_defaults_when_absent() {
        assert_eq!(optional_timeout_ms(&json!({})).unwrap(), WATCH_DEFAULT_TIMEOUT_MS);
        assert_eq!(optional_timeout_ms(&json!({ "timeout": 500 })).unwrap(), 500);
        assert!(optional_timeout_ms(&json!({ "timeout": "soon" })).is_err());
    }

    #[test]
    fn catalog_lists_all_nine_tools() {
        let tools = catalog();
        assert_eq!(tools.as_array().unwrap().len(), 9);
    }
}
