use serde_json::Value;

use crate::error::AcpError;

/// Thin wrapper over the HTTP Surface the dispatcher speaks to — the agent
/// reaches it on the loopback interface, same as any other client. The
/// dispatcher never touches the Store directly.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let base_url = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    pub async fn get(&self, path: &str) -> Result<(u16, Value), AcpError> {
        let response = self.authed(self.client.get(self.url(path))).send().await?;
        let status = response.status().as_u16();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        Ok((status, body))
    }

    pub async fn patch(&self, path: &str, body: &Value) -> Result<(u16, Value), AcpError> {
        let response = self
            .authed(self.client.patch(self.url(path)))
            .json(body)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        Ok((status, body))
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<(u16, Value), AcpError> {
        let response = self
            .authed(self.client.post(self.url(path)))
            .json(body)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        Ok((status, body))
    }
}

/// Turns a non-2xx response body (`{"error": "..."}`) into an `AcpError`,
/// following the same `{error: <reason>}` shape the HTTP Surface always uses.
pub fn as_error(status: u16, body: &Value) -> AcpError {
    let reason = body
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("request failed")
        .to_string();
    AcpError::Http(format!("http {status}: {reason}"))
}
