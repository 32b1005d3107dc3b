use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::tools::{catalog, Dispatcher};

#[derive(Deserialize)]
#[serde(tag = "method")]
enum Request {
    #[serde(rename = "tools/list")]
    ToolsList,
    #[serde(rename = "tools/call")]
    ToolsCall { params: CallParams },
}

#[derive(Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

fn error_response(message: impl Into<String>) -> Value {
    json!({
        "content": [{ "type": "text", "text": message.into() }],
        "isError": true,
    })
}

fn ok_response(payload: &Value) -> Value {
    json!({
        "content": [{ "type": "text", "text": payload.to_string() }],
    })
}

/// Reads one JSON message per line from `input`, dispatches it, and writes
/// one JSON response line to `output`. Runs until the input stream closes
/// (the agent's transport disconnecting), matching the newline-delimited-JSON
/// idiom used elsewhere in this codebase's reference material for daemon
/// wire protocols.
pub async fn run<R, W>(dispatcher: &Dispatcher, mut input: R, mut output: W)
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(&mut input).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(error) => {
                tracing::warn!(%error, "acp transport read failed");
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let response = handle_line(dispatcher, &line).await;

        let mut serialized = serde_json::to_string(&response).unwrap_or_else(|_| {
            error_response("failed to serialize response").to_string()
        });
        serialized.push('\n');

        if output.write_all(serialized.as_bytes()).await.is_err() {
            tracing::warn!("acp transport write failed");
            break;
        }
        if output.flush().await.is_err() {
            break;
        }
    }
}

async fn handle_line(dispatcher: &Dispatcher, line: &str) -> Value {
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(error) => return error_response(format!("malformed request: {error}")),
    };

    match request {
        Request::ToolsList => ok_response(&catalog()),
        Request::ToolsCall { params } => match dispatcher.call(&params.name, &params.arguments).await {
            Ok(payload) => ok_response(&payload),
            Err(error) => error_response(error.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::HttpClient;

    #[tokio::test]
    async fn tools_list_returns_catalog() {
        let dispatcher = Dispatcher::new(HttpClient::new("http://127.0.0.1:1", None));
        let response = handle_line(&dispatcher, r#"{"method":"tools/list"}"#).await;
        assert_eq!(response["isError"], Value::Null);
        let text = response["content"][0]["text"].as_str().unwrap();
        let tools: Value = serde_json::from_str(text).unwrap();
        assert_eq!(tools.as_array().unwrap().len(), 9);
    }

    #[tokio::test]
    async fn unknown_method_is_rejected() {
        let dispatcher = Dispatcher::new(HttpClient::new("http://127.0.0.1:1", None));
        let response = handle_line(&dispatcher, r#"{"method":"tools/frobnicate"}"#).await;
        assert_eq!(response["isError"], true);
    }

    #[tokio::test]
    async fn unknown_tool_name_is_rejected() {
        let dispatcher = Dispatcher::new(HttpClient::new("http://127.0.0.1:1", None));
        let response = handle_line(
            &dispatcher,
            r#"{"method":"tools/call","params":{"name":"nope","arguments":{}}}"#,
        )
        .await;
        assert_eq!(response["isError"], true);
        let text = response["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("unknown tool"));
    }

    #[tokio::test]
    async fn missing_required_argument_is_rejected_before_dispatch() {
        let dispatcher = Dispatcher::new(HttpClient::new("http://127.0.0.1:1", None));
        let response = handle_line(
            &dispatcher,
            r#"{"method":"tools/call","params":{"name":"acknowledge","arguments":{}}}"#,
        )
        .await;
        assert_eq!(response["isError"], true);
    }
}
